//! Digital signal processing stages for the LoFi chain
//!
//! This module provides the building blocks the signal chain is assembled
//! from:
//! - Biquad IIR filters (low shelf, peaking, low pass)
//! - Partitioned FFT convolution reverb
//! - Fixed single-tap delay
//! - Looping crackle noise source
//! - Gain
//!
//! Stages process planar [`AudioBlock`]s in place and do not allocate once
//! constructed. Biquad responses follow the browser audio filter definitions
//! so that gain and Q values mean what a web audio user expects.

use crate::domain::audio::AudioError;
use crate::domain::buffer::{AudioBlock, AudioBuffer};
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::Arc;
use tracing::trace;

pub type Result<T> = std::result::Result<T, AudioError>;

/// Core trait for all processing stages
///
/// Stages process blocks in place. Samples are nominally in [-1.0, 1.0] but
/// nothing is clamped before the encoder.
pub trait Effect: Send {
    /// Process a block in place
    fn process(&mut self, block: &mut AudioBlock) -> Result<()>;

    /// Reset internal state to silence
    fn reset(&mut self);

    /// Stage name for debugging/display
    fn name(&self) -> &str;
}

/// Fixed stage constants
pub mod constants {
    /// Bass low shelf corner
    pub const BASS_SHELF_HZ: f32 = 100.0;
    /// Tilt peaking band center
    pub const EQ_PEAK_HZ: f32 = 1000.0;
    /// Tilt peaking band Q
    pub const EQ_PEAK_Q: f32 = 1.0;
    /// Low-pass resonance, in dB
    pub const FILTER_Q_DB: f32 = 1.0;
    /// Cutoff with the filter fully open
    pub const FILTER_OPEN_HZ: f32 = 20000.0;
    /// Lowest cutoff the filter amount can reach
    pub const FILTER_FLOOR_HZ: f32 = 100.0;
    /// Hz removed per filter amount step
    pub const FILTER_HZ_PER_STEP: f32 = 180.0;
    /// Delay time in seconds
    pub const DELAY_SECS: f64 = 0.3;
    /// Crackle loop length in seconds
    pub const CRACKLE_LOOP_SECS: f64 = 0.1;
}

/// Low-pass cutoff for a filter amount
///
/// Higher amounts close the filter, bottoming out at 100 Hz.
pub fn filter_cutoff_hz(amount: f32) -> f32 {
    (constants::FILTER_OPEN_HZ - amount * constants::FILTER_HZ_PER_STEP)
        .max(constants::FILTER_FLOOR_HZ)
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    // Computed in f64: low corner frequencies lose precision in f32
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }

    fn angular(sample_rate: f32, freq: f32) -> (f64, f64) {
        let w0 = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
        (w0.cos(), w0.sin())
    }

    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency. The gain is
    /// used as given; a `q` of 1/sqrt(2) is a shelf slope of 1.
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let (cos_w0, sin_w0) = Self::angular(sample_rate, freq);
        let alpha = sin_w0 / (2.0 * q as f64);

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Calculate coefficients for a peaking EQ filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    #[must_use]
    pub fn peaking(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let (cos_w0, sin_w0) = Self::angular(sample_rate, freq);
        let alpha = sin_w0 / (2.0 * q as f64);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Calculate coefficients for a resonant low-pass filter
    ///
    /// `q_db` is the resonance peak in decibels. A cutoff at or above Nyquist
    /// yields a pass-through filter.
    #[must_use]
    pub fn low_pass(sample_rate: f32, freq: f32, q_db: f32) -> Self {
        let nyquist = sample_rate / 2.0;
        if freq >= nyquist {
            return Self::default();
        }

        let (cos_w0, sin_w0) = Self::angular(sample_rate, freq);
        let alpha = sin_w0 / (2.0 * 10.0_f64.powf(q_db as f64 / 20.0));

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Gain at DC (0 Hz)
    pub fn dc_gain(&self) -> f64 {
        let num = self.b0 as f64 + self.b1 as f64 + self.b2 as f64;
        let den = 1.0 + self.a1 as f64 + self.a2 as f64;
        num / den
    }
}

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I is chosen over Transposed Direct Form II for:
/// - Better numerical stability with low-frequency filters
/// - Easier coefficient updates without artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Update filter coefficients, keeping the signal history
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Filter response a [`BiquadStage`] computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    LowShelf,
    Peaking,
    LowPass,
}

/// Multichannel biquad stage with live-updatable parameters
#[derive(Debug, Clone)]
pub struct BiquadStage {
    kind: BiquadKind,
    sample_rate: f32,
    frequency: f32,
    gain_db: f32,
    q: f32,
    coeffs: BiquadCoeffs,
    filters: Vec<BiquadFilter>,
}

impl BiquadStage {
    fn new(kind: BiquadKind, sample_rate: u32, channels: usize, frequency: f32, gain_db: f32, q: f32) -> Self {
        let mut stage = Self {
            kind,
            sample_rate: sample_rate as f32,
            frequency,
            gain_db,
            q,
            coeffs: BiquadCoeffs::default(),
            filters: vec![BiquadFilter::bypass(); channels],
        };
        stage.update_coefficients();
        stage
    }

    /// Low shelf with a slope of 1
    pub fn low_shelf(sample_rate: u32, channels: usize, frequency: f32, gain_db: f32) -> Self {
        Self::new(BiquadKind::LowShelf, sample_rate, channels, frequency, gain_db, FRAC_1_SQRT_2)
    }

    pub fn peaking(sample_rate: u32, channels: usize, frequency: f32, gain_db: f32, q: f32) -> Self {
        Self::new(BiquadKind::Peaking, sample_rate, channels, frequency, gain_db, q)
    }

    pub fn low_pass(sample_rate: u32, channels: usize, frequency: f32, q_db: f32) -> Self {
        Self::new(BiquadKind::LowPass, sample_rate, channels, frequency, 0.0, q_db)
    }

    pub fn kind(&self) -> BiquadKind {
        self.kind
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn coeffs(&self) -> BiquadCoeffs {
        self.coeffs
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        if self.gain_db != gain_db {
            self.gain_db = gain_db;
            self.update_coefficients();
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        if self.frequency != frequency {
            self.frequency = frequency;
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        self.coeffs = match self.kind {
            BiquadKind::LowShelf => {
                BiquadCoeffs::low_shelf(self.sample_rate, self.frequency, self.gain_db, self.q)
            }
            BiquadKind::Peaking => {
                BiquadCoeffs::peaking(self.sample_rate, self.frequency, self.gain_db, self.q)
            }
            BiquadKind::LowPass => BiquadCoeffs::low_pass(self.sample_rate, self.frequency, self.q),
        };
        for filter in &mut self.filters {
            filter.set_coeffs(self.coeffs);
        }

        trace!(
            "{:?} updated: {:.1}Hz, {:.1}dB, q={:.3}",
            self.kind,
            self.frequency,
            self.gain_db,
            self.q
        );
    }
}

impl Effect for BiquadStage {
    fn process(&mut self, block: &mut AudioBlock) -> Result<()> {
        for (filter, channel) in self.filters.iter_mut().zip(block.channels_mut()) {
            filter.process(channel);
        }
        Ok(())
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn name(&self) -> &str {
        match self.kind {
            BiquadKind::LowShelf => "bass",
            BiquadKind::Peaking => "eq",
            BiquadKind::LowPass => "filter",
        }
    }
}

// ============================================================================
// CONVOLUTION REVERB
// ============================================================================

/// Uniformly partitioned overlap-save convolver
///
/// The impulse is split into partitions of one block each. Every input block
/// is transformed once and pushed into a frequency-domain delay line, so the
/// output for a block is available as soon as the block has been processed.
pub struct PartitionedConvolver {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    partitions: Vec<Vec<Complex32>>,
    history: Vec<Vec<Complex32>>,
    head: usize,
    window: Vec<f32>,
    spectrum: Vec<Complex32>,
    accum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    output: Vec<f32>,
}

impl PartitionedConvolver {
    pub fn new(impulse: &[f32], block_size: usize, planner: &mut FftPlanner<f32>) -> Self {
        let fft_size = block_size * 2;
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex32::default(); scratch_len];

        let partitions: Vec<Vec<Complex32>> = impulse
            .chunks(block_size.max(1))
            .map(|segment| {
                let mut spectrum = vec![Complex32::default(); fft_size];
                for (slot, &h) in spectrum.iter_mut().zip(segment) {
                    *slot = Complex32::new(h, 0.0);
                }
                fft.process_with_scratch(&mut spectrum, &mut scratch);
                spectrum
            })
            .collect();
        let history = vec![vec![Complex32::default(); fft_size]; partitions.len()];

        Self {
            block_size,
            fft,
            ifft,
            partitions,
            history,
            head: 0,
            window: vec![0.0; fft_size],
            spectrum: vec![Complex32::default(); fft_size],
            accum: vec![Complex32::default(); fft_size],
            scratch,
            output: vec![0.0; block_size],
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Convolve one block; the returned slice is the wet output
    pub fn process(&mut self, input: &[f32]) -> Result<&[f32]> {
        let b = self.block_size;
        if input.len() != b {
            return Err(AudioError::InvalidConfiguration(format!(
                "convolver expects {} frames per block, got {}",
                b,
                input.len()
            )));
        }

        self.window.copy_within(b.., 0);
        self.window[b..].copy_from_slice(input);

        let count = self.partitions.len();
        if count == 0 {
            self.output.fill(0.0);
            return Ok(&self.output);
        }

        for (slot, &x) in self.spectrum.iter_mut().zip(&self.window) {
            *slot = Complex32::new(x, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        self.head = (self.head + 1) % count;
        self.history[self.head].copy_from_slice(&self.spectrum);

        // Real input: only bins 0..=b are needed, the rest mirror them
        self.accum.fill(Complex32::default());
        for (k, partition) in self.partitions.iter().enumerate() {
            let delayed = &self.history[(self.head + count - k) % count];
            for bin in 0..=b {
                self.accum[bin] += delayed[bin] * partition[bin];
            }
        }
        for bin in 1..b {
            self.accum[2 * b - bin] = self.accum[bin].conj();
        }
        self.ifft
            .process_with_scratch(&mut self.accum, &mut self.scratch);

        let scale = 1.0 / (2 * b) as f32;
        for (out, y) in self.output.iter_mut().zip(&self.accum[b..]) {
            *out = y.re * scale;
        }
        Ok(&self.output)
    }

    pub fn reset(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex32::default());
        }
        self.window.fill(0.0);
        self.output.fill(0.0);
        self.head = 0;
    }
}

/// Wet/dry convolution reverb
///
/// Chain channel `c` convolves with impulse channel `c % impulse_channels`.
pub struct ConvolutionReverb {
    convolvers: Vec<PartitionedConvolver>,
    impulse_frames: usize,
    mix: f32,
}

impl ConvolutionReverb {
    pub fn new(impulse: &AudioBuffer, channels: usize, block_size: usize, mix: f32) -> Self {
        let mut planner = FftPlanner::new();
        let convolvers = (0..channels)
            .map(|c| {
                let ir = impulse.channel(c % impulse.channel_count());
                PartitionedConvolver::new(ir, block_size, &mut planner)
            })
            .collect();
        Self {
            convolvers,
            impulse_frames: impulse.frames(),
            mix: mix.clamp(0.0, 1.0),
        }
    }

    /// Frames the wet signal rings on after the input goes silent
    pub fn impulse_frames(&self) -> usize {
        self.impulse_frames
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    /// Wet fraction, 0 is fully dry
    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }
}

impl Effect for ConvolutionReverb {
    fn process(&mut self, block: &mut AudioBlock) -> Result<()> {
        let wet_gain = self.mix;
        let dry_gain = 1.0 - self.mix;
        for (convolver, channel) in self.convolvers.iter_mut().zip(block.channels_mut()) {
            let wet = convolver.process(channel)?;
            for (sample, &w) in channel.iter_mut().zip(wet) {
                *sample = *sample * dry_gain + w * wet_gain;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        for convolver in &mut self.convolvers {
            convolver.reset();
        }
    }

    fn name(&self) -> &str {
        "reverb"
    }
}

// ============================================================================
// DELAY
// ============================================================================

/// Pure single-tap delay, no feedback and no dry signal
#[derive(Debug, Clone)]
pub struct DelayStage {
    lines: Vec<Vec<f32>>,
    position: usize,
}

impl DelayStage {
    pub fn new(sample_rate: u32, channels: usize, delay_secs: f64) -> Self {
        let length = (delay_secs * sample_rate as f64).round() as usize;
        Self {
            lines: vec![vec![0.0; length]; channels],
            position: 0,
        }
    }

    /// Delay length in frames
    pub fn delay_frames(&self) -> usize {
        self.lines.first().map_or(0, Vec::len)
    }
}

impl Effect for DelayStage {
    fn process(&mut self, block: &mut AudioBlock) -> Result<()> {
        let length = self.delay_frames();
        if length == 0 {
            return Ok(());
        }

        let start = self.position;
        for (line, channel) in self.lines.iter_mut().zip(block.channels_mut()) {
            let mut pos = start;
            for sample in channel.iter_mut() {
                std::mem::swap(sample, &mut line[pos]);
                pos += 1;
                if pos == length {
                    pos = 0;
                }
            }
        }
        self.position = (start + block.frames()) % length;
        Ok(())
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.position = 0;
    }

    fn name(&self) -> &str {
        "delay"
    }
}

// ============================================================================
// CRACKLE
// ============================================================================

/// Looping mono noise added equally to every channel
#[derive(Debug, Clone)]
pub struct CrackleSource {
    noise: Vec<f32>,
    position: usize,
    amplitude: f32,
}

impl CrackleSource {
    pub fn new(noise: Vec<f32>, amplitude: f32) -> Self {
        Self {
            noise,
            position: 0,
            amplitude,
        }
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    /// Add the next stretch of the loop to the block
    pub fn mix_into(&mut self, block: &mut AudioBlock) {
        let length = self.noise.len();
        if length == 0 {
            return;
        }

        let frames = block.frames();
        let start = self.position;
        for channel in block.channels_mut() {
            let mut pos = start;
            for sample in channel.iter_mut() {
                *sample += self.noise[pos] * self.amplitude;
                pos += 1;
                if pos == length {
                    pos = 0;
                }
            }
        }
        self.position = (start + frames) % length;
    }
}

// ============================================================================
// GAIN
// ============================================================================

/// Linear gain
#[derive(Debug, Clone, Copy)]
pub struct GainStage {
    gain: f32,
}

impl GainStage {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }
}

impl Effect for GainStage {
    fn process(&mut self, block: &mut AudioBlock) -> Result<()> {
        if self.gain == 1.0 {
            return Ok(());
        }
        for channel in block.channels_mut() {
            for sample in channel.iter_mut() {
                *sample *= self.gain;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "master"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 48000;

    fn generate_test_signal(samples: usize, frequency: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn peak(signal: &[f32]) -> f32 {
        signal.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    fn block_from(channels: &[Vec<f32>]) -> AudioBlock {
        let mut block = AudioBlock::new(channels.len(), channels[0].len());
        for (c, data) in channels.iter().enumerate() {
            block.channel_mut(c).copy_from_slice(data);
        }
        block
    }

    // -------------------------------------------------------------------------
    // Biquad Filter Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_biquad_unity() {
        let mut filter = BiquadFilter::bypass();

        let input = vec![0.5, 0.3, 0.7];
        let mut output = input.clone();
        filter.process(&mut output);

        assert_eq!(input, output);
    }

    #[test]
    fn test_biquad_reset() {
        let coeffs = BiquadCoeffs::low_shelf(48000.0, 100.0, 6.0, FRAC_1_SQRT_2);
        let mut filter = BiquadFilter::new(coeffs);

        let mut buffer = vec![0.5; 100];
        filter.process(&mut buffer);

        filter.reset();
        let mut silence = vec![0.0; 10];
        filter.process(&mut silence);

        assert!(silence.iter().all(|&s| s.abs() < 0.01));
    }

    #[test]
    fn test_low_shelf_not_clamped() {
        // +24 dB shelf boosts DC by a factor of ~15.85
        let coeffs = BiquadCoeffs::low_shelf(48000.0, 100.0, 24.0, FRAC_1_SQRT_2);
        let actual_db = 20.0 * coeffs.dc_gain().log10();
        assert!((actual_db - 24.0).abs() < 0.25);
    }

    #[test]
    fn test_low_shelf_boosts_bass() {
        let mut stage = BiquadStage::low_shelf(SAMPLE_RATE, 1, 100.0, 6.0);
        let mut block = block_from(&[generate_test_signal(4096, 40.0)]);
        let before = peak(block.channel(0));
        stage.process(&mut block).unwrap();
        assert!(peak(&block.channel(0)[2048..]) > before * 1.4);
    }

    #[test]
    fn test_peaking_unity_at_zero_gain() {
        let coeffs = BiquadCoeffs::peaking(48000.0, 1000.0, 0.0, 1.0);
        assert!((coeffs.b0 - 1.0).abs() < 1e-6);
        assert!((coeffs.b1 - coeffs.a1).abs() < 1e-6);
        assert!((coeffs.b2 - coeffs.a2).abs() < 1e-6);
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let mut stage = BiquadStage::low_pass(SAMPLE_RATE, 1, 500.0, constants::FILTER_Q_DB);
        let mut block = block_from(&[generate_test_signal(4096, 8000.0)]);
        stage.process(&mut block).unwrap();
        assert!(peak(&block.channel(0)[1024..]) < 0.05);
    }

    #[test]
    fn test_low_pass_above_nyquist_passes_through() {
        assert_eq!(BiquadCoeffs::low_pass(32000.0, 20000.0, 1.0), BiquadCoeffs::default());
        assert_ne!(BiquadCoeffs::low_pass(44100.0, 20000.0, 1.0), BiquadCoeffs::default());
    }

    #[test]
    fn test_low_pass_unity_dc() {
        let coeffs = BiquadCoeffs::low_pass(44100.0, 2000.0, 1.0);
        assert!((coeffs.dc_gain() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_filter_cutoff_formula() {
        assert_eq!(filter_cutoff_hz(0.0), 20000.0);
        assert_eq!(filter_cutoff_hz(50.0), 11000.0);
        assert_eq!(filter_cutoff_hz(100.0), 2000.0);
        assert_eq!(filter_cutoff_hz(111.11), 100.0);
        assert_eq!(filter_cutoff_hz(150.0), 100.0);
    }

    #[test]
    fn test_stage_update_keeps_state() {
        let mut stage = BiquadStage::low_shelf(SAMPLE_RATE, 2, 100.0, 0.0);
        stage.set_gain_db(-12.0);
        assert_eq!(stage.gain_db(), -12.0);
        assert_eq!(stage.kind(), BiquadKind::LowShelf);
        let actual_db = 20.0 * stage.coeffs().dc_gain().log10();
        assert!((actual_db + 12.0).abs() < 0.25);
    }

    // -------------------------------------------------------------------------
    // Convolution Tests
    // -------------------------------------------------------------------------

    fn direct_convolution(input: &[f32], impulse: &[f32]) -> Vec<f32> {
        (0..input.len())
            .map(|n| {
                impulse
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j <= n)
                    .map(|(j, h)| h * input[n - j])
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_partitioned_matches_direct() {
        let block = 4;
        let impulse: Vec<f32> = (0..10).map(|i| ((i * 7 % 5) as f32 - 2.0) * 0.25).collect();
        let input: Vec<f32> = (0..24).map(|i| ((i * 13 % 11) as f32 - 5.0) * 0.1).collect();

        let mut planner = FftPlanner::new();
        let mut convolver = PartitionedConvolver::new(&impulse, block, &mut planner);
        assert_eq!(convolver.partition_count(), 3);

        let mut output = Vec::new();
        for chunk in input.chunks(block) {
            output.extend_from_slice(convolver.process(chunk).unwrap());
        }

        let expected = direct_convolution(&input, &impulse);
        for (got, want) in output.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-4, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_convolver_has_no_latency() {
        let mut planner = FftPlanner::new();
        let mut convolver = PartitionedConvolver::new(&[1.0], 8, &mut planner);
        let input = [0.5, -0.25, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let output = convolver.process(&input).unwrap();
        for (got, want) in output.iter().zip(&input) {
            assert!((got - want).abs() < 1e-5);
        }
    }

    #[test]
    fn test_convolver_rejects_wrong_block() {
        let mut planner = FftPlanner::new();
        let mut convolver = PartitionedConvolver::new(&[1.0], 8, &mut planner);
        assert!(convolver.process(&[0.0; 4]).is_err());
    }

    #[test]
    fn test_reverb_dry_at_zero_mix() {
        let impulse = AudioBuffer::from_channels(SAMPLE_RATE, vec![vec![0.3; 64], vec![0.2; 64]]).unwrap();
        let mut reverb = ConvolutionReverb::new(&impulse, 2, 16, 0.0);
        let data = vec![generate_test_signal(16, 1000.0), generate_test_signal(16, 500.0)];
        let mut block = block_from(&data);
        reverb.process(&mut block).unwrap();
        assert_eq!(block.channel(0), data[0].as_slice());
        assert_eq!(block.channel(1), data[1].as_slice());
    }

    #[test]
    fn test_reverb_full_wet_is_convolution() {
        let impulse = AudioBuffer::from_channels(SAMPLE_RATE, vec![vec![0.0, 0.5]]).unwrap();
        let mut reverb = ConvolutionReverb::new(&impulse, 1, 4, 1.0);
        let mut block = block_from(&[vec![1.0, 0.0, 0.0, 0.0]]);
        reverb.process(&mut block).unwrap();
        let out = block.channel(0);
        assert!(out[0].abs() < 1e-5);
        assert!((out[1] - 0.5).abs() < 1e-5);
    }

    // -------------------------------------------------------------------------
    // Delay / Crackle / Gain Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_delay_length() {
        let delay = DelayStage::new(44100, 2, constants::DELAY_SECS);
        assert_eq!(delay.delay_frames(), 13230);
    }

    #[test]
    fn test_delay_shifts_signal() {
        let mut delay = DelayStage::new(10, 1, 0.3);
        let mut first = block_from(&[vec![1.0, 2.0, 3.0, 4.0]]);
        delay.process(&mut first).unwrap();
        assert_eq!(first.channel(0), &[0.0, 0.0, 0.0, 1.0]);

        let mut second = block_from(&[vec![5.0, 6.0, 7.0, 8.0]]);
        delay.process(&mut second).unwrap();
        assert_eq!(second.channel(0), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_crackle_loops_on_every_channel() {
        let mut crackle = CrackleSource::new(vec![0.1, -0.2, 0.3], 1.0);
        let mut block = AudioBlock::new(2, 5);
        crackle.mix_into(&mut block);
        let expected = [0.1, -0.2, 0.3, 0.1, -0.2];
        assert_eq!(block.channel(0), &expected);
        assert_eq!(block.channel(1), &expected);

        let mut next = AudioBlock::new(2, 2);
        crackle.mix_into(&mut next);
        assert_eq!(next.channel(0), &[0.3, 0.1]);
    }

    #[test]
    fn test_gain_stage() {
        let mut gain = GainStage::new(0.5);
        let mut block = block_from(&[vec![1.0, -0.5]]);
        gain.process(&mut block).unwrap();
        assert_eq!(block.channel(0), &[0.5, -0.25]);
        assert_eq!(gain.name(), "master");
    }

    proptest! {
        #[test]
        fn prop_low_shelf_dc_gain_matches_db(gain_db in -24.0f32..=24.0) {
            let stage = BiquadStage::low_shelf(44100, 2, constants::BASS_SHELF_HZ, gain_db);
            prop_assert_eq!(stage.gain_db(), gain_db);
            let actual_db = 20.0 * stage.coeffs().dc_gain().log10();
            prop_assert!((actual_db - gain_db as f64).abs() < 0.25);
        }

        #[test]
        fn prop_cutoff_within_bounds(amount in -10.0f32..200.0) {
            let cutoff = filter_cutoff_hz(amount);
            prop_assert!(cutoff >= constants::FILTER_FLOOR_HZ);
            prop_assert!(cutoff <= constants::FILTER_OPEN_HZ + 1800.0);
        }
    }
}
