//! Audio device abstractions and domain models
//!
//! This module defines the platform-agnostic interfaces the engine consumes:
//! a decoder turning file bytes into a [`SourceBuffer`] and an output device
//! that pulls rendered audio from a [`LiveRenderer`]. Implementations for real
//! platforms (Symphonia, CPAL) live in the `infra` crate.

use crate::domain::buffer::SourceBuffer;
use crate::domain::chain::LiveRenderer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Input file is malformed or in an unsupported format
    #[error("Decode error: {0}")]
    Decode(String),

    /// Operation needs a loaded source buffer
    #[error("No source loaded")]
    NoSourceLoaded,

    /// Trim selection is empty or reversed
    #[error("Invalid trim range: start {start:.3}s must be before end {end:.3}s")]
    InvalidTrimRange { start: f64, end: f64 },

    /// Offline rendering failed or was cancelled
    #[error("Render failure: {0}")]
    RenderFailure(String),

    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for a device or chain
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Audio sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz44100,
    Hz48000,
    Hz96000,
    Hz192000,
    Custom(u32),
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
            SampleRate::Hz192000 => 192000,
            SampleRate::Custom(hz) => *hz,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        match hz {
            44100 => SampleRate::Hz44100,
            48000 => SampleRate::Hz48000,
            96000 => SampleRate::Hz96000,
            192000 => SampleRate::Hz192000,
            hz => SampleRate::Custom(hz),
        }
    }
}

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
    Surround(u16),
}

impl ChannelCount {
    pub fn count(&self) -> u16 {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
            ChannelCount::Surround(n) => *n,
        }
    }

    pub fn from_count(count: u16) -> Self {
        match count {
            1 => ChannelCount::Mono,
            2 => ChannelCount::Stereo,
            n => ChannelCount::Surround(n),
        }
    }
}

/// Supported audio sample formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    I16,
    U16,
    I32,
    F32,
    F64,
}

/// Configuration of the live output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: SampleRate,
    pub channels: ChannelCount,
    pub format: SampleFormat,
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: ChannelCount::Stereo,
            format: SampleFormat::F32,
            buffer_size: 512,
        }
    }
}

/// Information about an output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<SampleRate>,
    pub channel_counts: Vec<ChannelCount>,
    pub default_sample_rate: Option<SampleRate>,
}

/// Turns raw file bytes into a decoded source buffer
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<SourceBuffer>;
}

/// Live output destination
///
/// The device reports its stream configuration so the live chain can be built
/// at the device rate, then pulls audio from the renderer on its own thread.
pub trait AudioOutput {
    /// Configuration the next stream will run with
    fn stream_config(&self) -> Result<StreamConfig>;

    /// Start streaming from the renderer
    fn start(&self, renderer: LiveRenderer) -> Result<Box<dyn PlaybackStream>>;
}

/// Handle to a running output stream; dropping it stops the stream
pub trait PlaybackStream {
    fn stop(&mut self);
}

/// Trait for enumerating available output devices
pub trait AudioEnumerator: Send + Sync {
    /// List all output devices
    fn output_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Get the default output device
    fn default_output_device(&self) -> Result<DeviceInfo>;
}
