//! Spectrum analyser tap for live playback

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const FFT_SIZE: usize = 2048;
pub const BIN_COUNT: usize = FFT_SIZE / 2;
pub const SMOOTHING: f32 = 0.8;
pub const MIN_DB: f32 = -100.0;
pub const MAX_DB: f32 = -30.0;

/// Windowed FFT magnitude analyser with temporal smoothing
///
/// Keeps the most recent [`FFT_SIZE`] mono samples. Each call to
/// [`Analyser::byte_frequency_data`] takes one smoothed snapshot.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    history: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new() -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        let scratch = vec![Complex32::default(); fft.get_inplace_scratch_len()];
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / FFT_SIZE as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft,
            history: vec![0.0; FFT_SIZE],
            write_pos: 0,
            window,
            spectrum: vec![Complex32::default(); FFT_SIZE],
            scratch,
            smoothed: vec![0.0; BIN_COUNT],
        }
    }

    /// Append mono samples
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.history[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
        }
    }

    /// Smoothed magnitudes mapped from [-100, -30] dB to 0..=255
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        // Oldest sample first
        let ordered = self.history[self.write_pos..]
            .iter()
            .chain(&self.history[..self.write_pos]);
        for ((slot, &sample), &w) in self.spectrum.iter_mut().zip(ordered).zip(&self.window) {
            *slot = Complex32::new(sample * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / FFT_SIZE as f32;
        let range = MAX_DB - MIN_DB;
        self.smoothed
            .iter_mut()
            .zip(&self.spectrum)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() * scale;
                *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
                let db = 20.0 * smoothed.log10();
                let byte = (255.0 / range) * (db - MIN_DB);
                if byte.is_nan() {
                    0
                } else {
                    byte.clamp(0.0, 255.0) as u8
                }
            })
            .collect()
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}
