//! Planar sample buffers
//!
//! [`AudioBuffer`] holds whole decoded or rendered signals; [`AudioBlock`] is
//! the fixed-size scratch block the signal chain processes one at a time.

use crate::domain::audio::{AudioError, Result};
use std::sync::Arc;

/// Decoded, immutable PCM audio shared read-only between live and offline chains
pub type SourceBuffer = Arc<AudioBuffer>;

/// Output of an offline render, consumed by the encoder
pub type RenderedBuffer = AudioBuffer;

/// Planar floating-point audio with a sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build from per-channel sample arrays
    ///
    /// All channels must have the same length and the rate must be non-zero.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidConfiguration(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if channels.is_empty() {
            return Err(AudioError::InvalidConfiguration(
                "buffer needs at least one channel".to_string(),
            ));
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(AudioError::InvalidConfiguration(
                "channel lengths differ".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// Build from interleaved samples
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Result<Self> {
        if channel_count == 0 {
            return Err(AudioError::InvalidConfiguration(
                "buffer needs at least one channel".to_string(),
            ));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }
        Self::from_channels(sample_rate, channels)
    }

    /// Silent buffer
    pub fn silent(sample_rate: u32, channel_count: usize, frames: usize) -> Result<Self> {
        Self::from_channels(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }
}

/// Fixed-size planar processing block
#[derive(Debug, Clone)]
pub struct AudioBlock {
    channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Vec<f32>> {
        self.channels.iter_mut()
    }

    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved() {
        let buffer = AudioBuffer::from_interleaved(44100, 2, &[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0), &[0.1, 0.3]);
        assert_eq!(buffer.channel(1), &[0.2, 0.4]);
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let result = AudioBuffer::from_channels(44100, vec![vec![0.0; 3], vec![0.0; 2]]);
        assert!(matches!(result, Err(AudioError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(AudioBuffer::silent(0, 1, 10).is_err());
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::silent(48000, 1, 24000).unwrap();
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_block_clear() {
        let mut block = AudioBlock::new(2, 4);
        block.channel_mut(1)[2] = 0.5;
        block.clear();
        assert!(block.channel(1).iter().all(|&s| s == 0.0));
        assert_eq!(block.frames(), 4);
    }
}
