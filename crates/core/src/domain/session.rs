//! The LoFi session: one source, one parameter set, at most one live chain
//!
//! The session is the only entry point the CLI talks to. It owns the decoded
//! source, the parameter store and the master volume, starts and stops live
//! playback on the injected output device, and runs offline exports.

use crate::domain::audio::{AudioDecoder, AudioError, AudioOutput, PlaybackStream, Result};
use crate::domain::buffer::SourceBuffer;
use crate::domain::chain::{ChainCommand, ChainSpec, LiveRenderer, LiveShared, SignalChain, Transport};
use crate::domain::config::EngineConfig;
use crate::domain::params::{EffectParameters, MasterVolume, ParamName, ParameterStore, Preset};
use crate::domain::render::{CancelToken, ContainerBytes, OfflineRenderer};
use crossbeam::channel::{unbounded, Sender};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of a play request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStatus {
    Started,
    NoSource,
    AlreadyPlaying,
}

struct LiveHandle {
    stream: Box<dyn PlaybackStream>,
    commands: Sender<ChainCommand>,
    shared: Arc<LiveShared>,
}

pub struct LofiSession {
    decoder: Box<dyn AudioDecoder>,
    output: Box<dyn AudioOutput>,
    engine: EngineConfig,
    params: ParameterStore,
    volume: MasterVolume,
    source: Option<SourceBuffer>,
    live: Option<LiveHandle>,
}

impl LofiSession {
    pub fn new(
        decoder: Box<dyn AudioDecoder>,
        output: Box<dyn AudioOutput>,
        engine: EngineConfig,
        effects: EffectParameters,
    ) -> Self {
        let volume = MasterVolume::new(engine.default_volume);
        Self {
            decoder,
            output,
            engine,
            params: ParameterStore::with_values(effects),
            volume,
            source: None,
            live: None,
        }
    }

    /// Decode and replace the current source
    ///
    /// On failure the previous source stays loaded. On success any playback
    /// of the previous source is stopped.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn load_file(&mut self, bytes: &[u8]) -> Result<&SourceBuffer> {
        let decoded = self.decoder.decode(bytes)?;
        self.stop();
        info!(
            channels = decoded.channel_count(),
            sample_rate = decoded.sample_rate(),
            duration_secs = decoded.duration_secs(),
            "Source loaded"
        );
        Ok(self.source.insert(decoded))
    }

    pub fn source(&self) -> Option<&SourceBuffer> {
        self.source.as_ref()
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    /// Set one control; returns the stored (clamped) value
    pub fn set_parameter(&mut self, name: ParamName, value: f32) -> f32 {
        let stored = self.params.set(name, value);
        self.push_parameters();
        stored
    }

    pub fn get_parameter(&self, name: ParamName) -> f32 {
        self.params.get(name)
    }

    pub fn parameters(&self) -> EffectParameters {
        self.params.snapshot()
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        self.params.apply_preset(preset);
        self.push_parameters();
    }

    /// Replace all six controls, e.g. from a user preset
    pub fn replace_parameters(&mut self, params: EffectParameters) {
        self.params.replace(params);
        self.push_parameters();
    }

    pub fn reset_parameters(&mut self) {
        self.params.reset();
        self.push_parameters();
    }

    pub fn volume(&self) -> MasterVolume {
        self.volume
    }

    pub fn set_volume(&mut self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        self.volume = MasterVolume::new(percent);
        self.send(ChainCommand::SetMasterGain(self.volume.gain()));
    }

    pub fn toggle_mute(&mut self) {
        self.volume.toggle_mute();
        self.send(ChainCommand::SetMasterGain(self.volume.gain()));
    }

    fn push_parameters(&self) {
        self.send(ChainCommand::ApplyParameters(self.params.snapshot()));
    }

    fn send(&self, command: ChainCommand) {
        if let Some(live) = &self.live {
            if live.commands.send(command).is_err() {
                debug!("Live chain already released, update dropped");
            }
        }
    }

    // ------------------------------------------------------------------
    // Live playback
    // ------------------------------------------------------------------

    /// Play `start..end` seconds of the source through a fresh live chain
    #[instrument(skip(self))]
    pub fn play(&mut self, start: f64, end: f64) -> Result<PlayStatus> {
        let Some(source) = self.source.clone() else {
            info!("Play requested without a source");
            return Ok(PlayStatus::NoSource);
        };

        let duration = source.duration_secs();
        let clamped_start = if start.is_nan() { 0.0 } else { start.clamp(0.0, duration) };
        let clamped_end = if end.is_nan() { duration } else { end.clamp(0.0, duration) };
        if clamped_start >= clamped_end {
            return Err(AudioError::InvalidTrimRange { start, end });
        }

        if self.is_playing() {
            return Ok(PlayStatus::AlreadyPlaying);
        }
        // A finished chain is released before a new one is built
        self.release_live();

        let stream_config = self.output.stream_config()?;
        let device_rate = stream_config.sample_rate.hz();
        let channels = stream_config.channels.count() as usize;

        let spec = ChainSpec::from_engine(&self.engine, device_rate, channels);
        let params = self.params.snapshot();
        let chain = SignalChain::build(spec, &params, self.volume.gain())?;
        let transport = Transport::new(
            source.clone(),
            channels,
            clamped_start,
            clamped_end,
            source.sample_rate() as f64 / device_rate as f64,
            params.playback_rate(),
        );

        let (commands, receiver) = unbounded();
        let shared = Arc::new(LiveShared::new());
        let renderer = LiveRenderer::new(chain, transport, receiver, Arc::clone(&shared));
        let stream = self.output.start(renderer)?;

        self.live = Some(LiveHandle {
            stream,
            commands,
            shared,
        });
        info!(
            start = clamped_start,
            end = clamped_end,
            device_rate,
            channels,
            "Playback started"
        );
        Ok(PlayStatus::Started)
    }

    /// Play the whole source
    pub fn play_all(&mut self) -> Result<PlayStatus> {
        match &self.source {
            Some(source) => {
                let duration = source.duration_secs();
                self.play(0.0, duration)
            }
            None => Ok(PlayStatus::NoSource),
        }
    }

    fn release_live(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.shared.stop();
            live.stream.stop();
        }
    }

    /// Halt playback and release the live chain; safe when idle
    pub fn stop(&mut self) {
        if self.live.is_some() {
            self.release_live();
            info!("Playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.live
            .as_ref()
            .map(|live| live.shared.is_playing())
            .unwrap_or(false)
    }

    /// Byte spectrum of the live output, while playing
    pub fn spectrum(&self) -> Option<Vec<u8>> {
        self.live
            .as_ref()
            .filter(|live| live.shared.is_playing())
            .and_then(|live| live.shared.spectrum())
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Render the whole source offline and encode it
    ///
    /// Returns `None` when nothing is loaded.
    pub fn export(&self) -> Result<Option<ContainerBytes>> {
        self.export_with_cancel(&CancelToken::new())
    }

    pub fn export_with_cancel(&self, cancel: &CancelToken) -> Result<Option<ContainerBytes>> {
        let Some(source) = &self.source else {
            info!("Export requested without a source");
            return Ok(None);
        };

        info!(frames = source.frames(), "Export started");
        let renderer = OfflineRenderer::new(self.engine.clone());
        let bytes = renderer.export(source, &self.params.snapshot(), self.volume.gain(), cancel)?;
        info!(bytes = bytes.len(), "Export finished");
        Ok(Some(bytes))
    }
}

impl Drop for LofiSession {
    fn drop(&mut self) {
        self.release_live();
    }
}
