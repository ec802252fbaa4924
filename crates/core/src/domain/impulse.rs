//! Seeded noise generation for the reverb impulse and the crackle loop
//!
//! All randomness in the chain flows through this module so that a chain
//! built twice with the same seed produces the same output. Component seeds
//! are derived with BLAKE3, giving the reverb and the crackle independent
//! streams from one base seed.

use crate::domain::audio::Result;
use crate::domain::buffer::AudioBuffer;
use crate::domain::dsp::constants::CRACKLE_LOOP_SECS;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::trace;

/// Reverb tail length in seconds
pub const IMPULSE_SECS: f64 = 2.0;

/// Channels in the synthetic impulse
pub const IMPULSE_CHANNELS: usize = 2;

// Convolver normalization constants, as browsers apply them
const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;
const MIN_POWER: f64 = 0.000125;

/// Creates a PCG32 RNG from a 32-bit seed.
///
/// The seed is duplicated into both halves of the 64-bit state seed.
pub fn create_rng(seed: u32) -> Pcg32 {
    let seed64 = (seed as u64) | ((seed as u64) << 32);
    Pcg32::seed_from_u64(seed64)
}

/// Derives an independent seed for a named component
pub fn derive_component_seed(base_seed: u32, key: &str) -> u32 {
    let mut input = Vec::with_capacity(4 + key.len());
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(key.as_bytes());

    let hash = blake3::hash(&input);

    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&hash.as_bytes()[..4]);
    u32::from_le_bytes(bytes)
}

fn uniform(rng: &mut Pcg32) -> f32 {
    rng.gen::<f32>() * 2.0 - 1.0
}

/// Synthetic decaying-noise impulse at the given rate
///
/// Sample `i` of each channel is uniform noise scaled by `(1 - i/len)^2`.
pub fn generate_reverb_impulse(seed: u32, sample_rate: u32) -> Result<AudioBuffer> {
    let length = (IMPULSE_SECS * sample_rate as f64) as usize;
    let mut rng = create_rng(derive_component_seed(seed, "reverb"));

    let channels = (0..IMPULSE_CHANNELS)
        .map(|_| {
            (0..length)
                .map(|i| {
                    let decay = 1.0 - i as f32 / length as f32;
                    uniform(&mut rng) * decay * decay
                })
                .collect()
        })
        .collect();

    let impulse = AudioBuffer::from_channels(sample_rate, channels)?;
    trace!(seed, sample_rate, frames = length, "Generated reverb impulse");
    Ok(impulse)
}

/// Gain a convolver applies to an impulse before use
///
/// Scales by the inverse RMS power with a fixed calibration, so that noise
/// impulses of any length land at a similar loudness.
pub fn normalization_scale(impulse: &AudioBuffer) -> f32 {
    let channels = impulse.channel_count();
    let length = impulse.frames();

    let energy: f64 = impulse
        .channels()
        .iter()
        .flat_map(|ch| ch.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let mut power = (energy / (channels * length) as f64).sqrt();
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }

    let mut scale = (1.0 / power) * GAIN_CALIBRATION;
    scale *= GAIN_CALIBRATION_SAMPLE_RATE / impulse.sample_rate() as f64;
    if channels == 4 {
        scale *= 0.5;
    }
    scale as f32
}

/// Impulse with the convolver normalization already applied
pub fn normalized_reverb_impulse(seed: u32, sample_rate: u32) -> Result<AudioBuffer> {
    let raw = generate_reverb_impulse(seed, sample_rate)?;
    let scale = normalization_scale(&raw);
    let channels = raw
        .channels()
        .iter()
        .map(|ch| ch.iter().map(|&s| s * scale).collect())
        .collect();
    AudioBuffer::from_channels(sample_rate, channels)
}

/// One loop of mono crackle noise
pub fn generate_crackle_noise(seed: u32, sample_rate: u32) -> Vec<f32> {
    let length = ((CRACKLE_LOOP_SECS * sample_rate as f64).round() as usize).max(1);
    let mut rng = create_rng(derive_component_seed(seed, "crackle"));
    (0..length).map(|_| uniform(&mut rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_shape() {
        let impulse = generate_reverb_impulse(42, 8000).unwrap();
        assert_eq!(impulse.channel_count(), 2);
        assert_eq!(impulse.frames(), 16000);

        for ch in impulse.channels() {
            assert!(ch.iter().all(|s| s.abs() <= 1.0));
            // Tail has decayed to near silence
            assert!(ch[15990..].iter().all(|s| s.abs() < 1e-4));
        }
        assert_ne!(impulse.channel(0), impulse.channel(1));
    }

    #[test]
    fn test_impulse_deterministic() {
        let a = generate_reverb_impulse(7, 8000).unwrap();
        let b = generate_reverb_impulse(7, 8000).unwrap();
        let c = generate_reverb_impulse(8, 8000).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_component_seeds_differ() {
        assert_ne!(
            derive_component_seed(1, "reverb"),
            derive_component_seed(1, "crackle")
        );
        assert_eq!(
            derive_component_seed(1, "reverb"),
            derive_component_seed(1, "reverb")
        );
    }

    #[test]
    fn test_normalization_scale_constant_impulse() {
        // RMS of a constant 0.5 impulse is 0.5
        let impulse = AudioBuffer::from_channels(44100, vec![vec![0.5; 100], vec![0.5; 100]]).unwrap();
        let scale = normalization_scale(&impulse);
        assert!((scale - 0.0025).abs() < 1e-7);
    }

    #[test]
    fn test_normalization_scale_rate_and_floor() {
        let silent = AudioBuffer::silent(22050, 2, 10).unwrap();
        let scale = normalization_scale(&silent);
        // Floor power, doubled for half the calibration rate
        assert!((scale - 20.0).abs() < 1e-3);

        let empty = AudioBuffer::silent(44100, 2, 0).unwrap();
        assert!(normalization_scale(&empty).is_finite());
    }

    #[test]
    fn test_normalized_impulse_is_quiet() {
        let impulse = normalized_reverb_impulse(3, 44100).unwrap();
        let peak = impulse
            .channels()
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.05);
        assert!(peak > 0.0);
    }

    #[test]
    fn test_crackle_loop_length() {
        let noise = generate_crackle_noise(1, 44100);
        assert_eq!(noise.len(), 4410);
        assert!(noise.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(noise, generate_crackle_noise(1, 44100));
    }
}
