//! Offline rendering and export
//!
//! Export builds its own chain at the source rate, runs the whole source
//! through it block by block and hands the result to the WAV encoder. It never
//! touches the live chain.

use crate::domain::audio::{AudioError, Result};
use crate::domain::buffer::{AudioBuffer, RenderedBuffer, SourceBuffer};
use crate::domain::chain::{ChainSpec, SignalChain, Transport};
use crate::domain::config::EngineConfig;
use crate::domain::params::EffectParameters;
use crate::domain::wav::{self, WavHeader};
use chrono::{DateTime, Utc};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Cooperative cancellation flag, checked between blocks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Finished, immutable WAV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerBytes(Vec<u8>);

impl ContainerBytes {
    pub fn encode(buffer: &RenderedBuffer) -> Self {
        Self(wav::encode(buffer))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn header(&self) -> Result<WavHeader> {
        WavHeader::parse(&self.0)
    }
}

impl Deref for ContainerBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for ContainerBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// `<product>-lofi-<YYYY-MM-DDTHH-MM-SS>.wav`
pub fn export_filename(product: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}-lofi-{}.wav", product, timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

/// Renders a whole source through a fresh chain
pub struct OfflineRenderer {
    config: EngineConfig,
}

impl OfflineRenderer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Render the full source with the given parameters
    ///
    /// The output has the configured export channel count and exactly as many
    /// frames as the source. Speed changes how much of the source fits in
    /// that length. Cancellation yields [`AudioError::RenderFailure`].
    #[instrument(skip_all, fields(frames = source.frames(), rate = source.sample_rate()))]
    pub fn render(
        &self,
        source: &SourceBuffer,
        params: &EffectParameters,
        master_gain: f32,
        cancel: &CancelToken,
    ) -> Result<RenderedBuffer> {
        let rate = source.sample_rate();
        let channels = self.config.export_channels;
        let total = source.frames();

        let spec = ChainSpec::from_engine(&self.config, rate, channels);
        let mut chain = SignalChain::build(spec, params, master_gain)?;
        let params = params.sanitized();
        let mut transport = Transport::full(Arc::clone(source), channels, rate, params.playback_rate());

        let mut output = AudioBuffer::silent(rate, channels, total)?;
        let mut block = chain.new_block();
        let mut written = 0;

        while written < total {
            if cancel.is_cancelled() {
                info!(written, total, "Export cancelled");
                return Err(AudioError::RenderFailure("export cancelled".to_string()));
            }

            transport.fill(&mut block);
            chain.process(&mut block)?;

            let take = block.frames().min(total - written);
            for (c, out) in output.channels_mut().iter_mut().enumerate() {
                out[written..written + take].copy_from_slice(&block.channel(c)[..take]);
            }
            written += take;
        }

        debug!(frames = total, channels, "Offline render complete");
        Ok(output)
    }

    /// Render and encode in one step
    pub fn export(
        &self,
        source: &SourceBuffer,
        params: &EffectParameters,
        master_gain: f32,
        cancel: &CancelToken,
    ) -> Result<ContainerBytes> {
        let rendered = self.render(source, params, master_gain, cancel)?;
        Ok(ContainerBytes::encode(&rendered))
    }
}
