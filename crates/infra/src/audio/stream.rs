//! Live output streams driven by a [`LiveRenderer`]
//!
//! The CPAL callback owns the renderer and pulls one device buffer at a time
//! from it, then converts the float frames to the device sample type.

use super::cpal_backend::{describe_output, device_name, find_output_device, map_sample_format};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample, Stream};
use lofi_core::domain::audio::{
    AudioError, AudioOutput, ChannelCount, DeviceInfo, PlaybackStream, Result, SampleRate,
    StreamConfig,
};
use lofi_core::domain::chain::LiveRenderer;
use tracing::{debug, error, info};

/// An output device the session can play through
pub struct CpalOutput {
    device: cpal::Device,
    supported: cpal::SupportedStreamConfig,
    buffer_size: Option<u32>,
}

impl CpalOutput {
    /// Open an output by name, or the host default when `name` is `None`
    pub fn open(name: Option<&str>, buffer_size: Option<u32>) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_output_device(&host, name)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;

        info!(
            device = %device_name(&device),
            sample_rate = supported.sample_rate(),
            channels = supported.channels(),
            format = ?supported.sample_format(),
            "Opened output device"
        );

        Ok(Self {
            device,
            supported,
            buffer_size: buffer_size.filter(|&n| n > 0),
        })
    }

    pub fn info(&self) -> Result<DeviceInfo> {
        let is_default = cpal::default_host()
            .default_output_device()
            .map(|d| device_name(&d) == device_name(&self.device))
            .unwrap_or(false);
        describe_output(&self.device, is_default)
    }

    fn cpal_config(&self) -> cpal::StreamConfig {
        let mut config = self.supported.config();
        if let Some(frames) = self.buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(frames);
        }
        config
    }
}

impl AudioOutput for CpalOutput {
    fn stream_config(&self) -> Result<StreamConfig> {
        let buffer_size = match (self.buffer_size, self.supported.buffer_size()) {
            (Some(frames), _) => frames,
            (None, cpal::SupportedBufferSize::Range { min, .. }) => *min,
            (None, cpal::SupportedBufferSize::Unknown) => 512,
        };

        Ok(StreamConfig {
            sample_rate: SampleRate::from_hz(self.supported.sample_rate()),
            channels: ChannelCount::from_count(self.supported.channels()),
            format: map_sample_format(self.supported.sample_format()),
            buffer_size,
        })
    }

    fn start(&self, renderer: LiveRenderer) -> Result<Box<dyn PlaybackStream>> {
        let config = self.cpal_config();
        if renderer.channels() != config.channels as usize
            || renderer.sample_rate() != config.sample_rate
        {
            return Err(AudioError::InvalidConfiguration(format!(
                "renderer is {} ch @ {} Hz, device is {} ch @ {} Hz",
                renderer.channels(),
                renderer.sample_rate(),
                config.channels,
                config.sample_rate
            )));
        }

        let stream = match self.supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &config, renderer),
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &config, renderer),
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &config, renderer),
            cpal::SampleFormat::I32 => build_stream::<i32>(&self.device, &config, renderer),
            cpal::SampleFormat::F64 => build_stream::<f64>(&self.device, &config, renderer),
            other => Err(AudioError::UnsupportedConfiguration(format!(
                "sample format {:?}",
                other
            ))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        debug!(channels = config.channels, rate = config.sample_rate, "Output stream running");
        Ok(Box::new(CpalPlaybackStream {
            stream: Some(stream),
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: LiveRenderer,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::with_capacity(8192);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                renderer.render_interleaved(&mut scratch);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))
}

/// Running CPAL stream; dropping it closes the device
pub struct CpalPlaybackStream {
    stream: Option<Stream>,
}

impl PlaybackStream for CpalPlaybackStream {
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Pause before close failed: {}", e);
            }
            info!("Output stream closed");
        }
    }
}

impl Drop for CpalPlaybackStream {
    fn drop(&mut self) {
        self.stop();
    }
}
