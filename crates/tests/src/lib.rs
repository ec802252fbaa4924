//! Shared fixtures for the end-to-end tests
//!
//! [`MemoryOutput`] stands in for a sound card: it hands out the stream
//! configuration it was built with and keeps every renderer it is asked to
//! start, so tests can pull audio from the live chain by hand.

use lofi_core::domain::audio::{
    AudioOutput, ChannelCount, PlaybackStream, Result, SampleRate, StreamConfig,
};
use lofi_core::{encode, AudioBuffer, LiveRenderer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct MemoryOutput {
    config: StreamConfig,
    renderers: Arc<Mutex<Vec<LiveRenderer>>>,
    stops: Arc<AtomicUsize>,
}

impl MemoryOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            config: StreamConfig {
                sample_rate: SampleRate::from_hz(sample_rate),
                channels: ChannelCount::from_count(channels),
                ..Default::default()
            },
            renderers: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of streams started so far
    pub fn started(&self) -> usize {
        self.renderers.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn stopped(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Pull `frames` interleaved frames from the most recent stream
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let channels = self.config.channels.count() as usize;
        let mut out = vec![0.0; frames * channels];
        if let Ok(mut renderers) = self.renderers.lock() {
            if let Some(renderer) = renderers.last_mut() {
                renderer.render_interleaved(&mut out);
            }
        }
        out
    }

    /// Run `f` against the most recent renderer
    pub fn with_renderer<R>(&self, f: impl FnOnce(&LiveRenderer) -> R) -> Option<R> {
        let renderers = self.renderers.lock().ok()?;
        renderers.last().map(f)
    }
}

struct MemoryStream(Arc<AtomicUsize>);

impl PlaybackStream for MemoryStream {
    fn stop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioOutput for MemoryOutput {
    fn stream_config(&self) -> Result<StreamConfig> {
        Ok(self.config.clone())
    }

    fn start(&self, renderer: LiveRenderer) -> Result<Box<dyn PlaybackStream>> {
        if let Ok(mut renderers) = self.renderers.lock() {
            renderers.push(renderer);
        }
        Ok(Box::new(MemoryStream(self.stops.clone())))
    }
}

/// Two-tone test signal, one tone per channel
pub fn test_tone(sample_rate: u32, channels: usize, secs: f64) -> AudioBuffer {
    let frames = (sample_rate as f64 * secs) as usize;
    let data = (0..channels)
        .map(|c| {
            let hz = 220.0 * (c + 1) as f32;
            (0..frames)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    (2.0 * std::f32::consts::PI * hz * t).sin() * 0.4
                })
                .collect()
        })
        .collect();
    AudioBuffer::from_channels(sample_rate, data).expect("valid test tone")
}

/// The test tone as WAV file bytes
pub fn test_wav(sample_rate: u32, channels: usize, secs: f64) -> Vec<u8> {
    encode(&test_tone(sample_rate, channels, secs))
}
