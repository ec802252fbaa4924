//! 16-bit PCM WAV container encoding
//!
//! Always writes the canonical 44-byte header (RIFF, `fmt ` with 16 bytes of
//! PCM format, `data`) followed by interleaved little-endian samples.

use crate::domain::audio::{AudioError, Result};
use crate::domain::buffer::AudioBuffer;

/// Size of the canonical PCM header
pub const HEADER_LEN: usize = 44;

/// Output format parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    pub fn pcm16(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    /// Bytes per frame
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Convert one float sample to signed 16-bit
///
/// Clamps to [-1, 1], scales negatives by 32768 and positives by 32767, and
/// truncates toward zero.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// RIFF and data chunk sizes for `data_bytes` of samples
///
/// Both fields are 32-bit, so past 4 GiB they saturate instead of wrapping.
pub fn chunk_sizes(data_bytes: usize) -> (u32, u32) {
    let data_size = u32::try_from(data_bytes)
        .unwrap_or(u32::MAX)
        .min(u32::MAX - 36);
    (data_size + 36, data_size)
}

/// Encode a rendered buffer as a 16-bit PCM WAV file
///
/// Files over 4 GiB keep all samples but carry saturated chunk sizes.
pub fn encode(buffer: &AudioBuffer) -> Vec<u8> {
    let format = WavFormat::pcm16(buffer.channel_count() as u16, buffer.sample_rate());
    let frames = buffer.frames();
    let data_bytes = frames.saturating_mul(format.block_align() as usize);
    let (file_size, data_size) = chunk_sizes(data_bytes);

    let mut out = Vec::with_capacity(HEADER_LEN.saturating_add(data_bytes));

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    for frame in 0..frames {
        for channel in buffer.channels() {
            out.extend_from_slice(&sample_to_i16(channel[frame]).to_le_bytes());
        }
    }

    out
}

/// Fields read back from a canonical header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: WavFormat,
    pub data_len: u32,
    pub file_size: u32,
}

impl WavHeader {
    /// Parse the 44-byte header this module writes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(AudioError::Decode(format!(
                "WAV header needs {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(AudioError::Decode("not a RIFF/WAVE file".to_string()));
        }
        if &bytes[12..16] != b"fmt " || u32_at(16) != 16 || u16_at(20) != 1 {
            return Err(AudioError::Decode("expected a 16-byte PCM fmt chunk".to_string()));
        }
        if &bytes[36..40] != b"data" {
            return Err(AudioError::Decode("expected data chunk at offset 36".to_string()));
        }

        Ok(Self {
            format: WavFormat {
                channels: u16_at(22),
                sample_rate: u32_at(24),
                bits_per_sample: u16_at(34),
            },
            data_len: u32_at(40),
            file_size: u32_at(4),
        })
    }

    /// Frames in the data chunk
    pub fn frames(&self) -> u32 {
        match self.format.block_align() {
            0 => 0,
            align => self.data_len / align as u32,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}
