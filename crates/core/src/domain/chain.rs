//! Signal chain builder, transport and live renderer
//!
//! A [`SignalChain`] owns one instance of every stage in the fixed order
//! `bass -> eq -> filter -> reverb -> delay -> master`, with the crackle
//! source feeding the master stage. Live and offline renders each build their
//! own chain; nothing is shared between them but the read-only source buffer.

use crate::domain::analyser::Analyser;
use crate::domain::audio::{AudioError, Result};
use crate::domain::buffer::{AudioBlock, SourceBuffer};
use crate::domain::config::{CrackleLaw, EngineConfig};
use crate::domain::dsp::{
    constants, filter_cutoff_hz, BiquadStage, ConvolutionReverb, CrackleSource, DelayStage,
    Effect, GainStage,
};
use crate::domain::impulse::{generate_crackle_noise, normalized_reverb_impulse};
use crate::domain::params::EffectParameters;
use crossbeam::channel::{Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Shape of a chain instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSpec {
    pub sample_rate: u32,
    pub channels: usize,
    pub block_frames: usize,
    pub seed: u32,
    pub crackle_law: CrackleLaw,
}

impl ChainSpec {
    pub fn from_engine(config: &EngineConfig, sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
            block_frames: config.block_frames,
            seed: config.reverb_seed,
            crackle_law: config.crackle_law,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfiguration(
                "chain sample rate must be non-zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidConfiguration(
                "chain needs at least one channel".to_string(),
            ));
        }
        if self.block_frames == 0 {
            return Err(AudioError::InvalidConfiguration(
                "block size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One wired instance of the LoFi processing graph
pub struct SignalChain {
    spec: ChainSpec,
    bass: BiquadStage,
    eq: BiquadStage,
    filter: BiquadStage,
    reverb: ConvolutionReverb,
    delay: DelayStage,
    crackle: Option<CrackleSource>,
    master: GainStage,
}

impl SignalChain {
    /// Build every stage from a parameter snapshot
    pub fn build(spec: ChainSpec, params: &EffectParameters, master_gain: f32) -> Result<Self> {
        spec.validate()?;
        let params = params.sanitized();
        let rate = spec.sample_rate;
        let channels = spec.channels;

        let impulse = normalized_reverb_impulse(spec.seed, rate)?;

        let mut chain = Self {
            spec,
            bass: BiquadStage::low_shelf(rate, channels, constants::BASS_SHELF_HZ, params.bass_gain_db),
            eq: BiquadStage::peaking(
                rate,
                channels,
                constants::EQ_PEAK_HZ,
                params.eq_tilt,
                constants::EQ_PEAK_Q,
            ),
            filter: BiquadStage::low_pass(
                rate,
                channels,
                filter_cutoff_hz(params.filter_amount),
                constants::FILTER_Q_DB,
            ),
            reverb: ConvolutionReverb::new(&impulse, channels, spec.block_frames, params.reverb_mix()),
            delay: DelayStage::new(rate, channels, constants::DELAY_SECS),
            crackle: None,
            master: GainStage::new(master_gain),
        };
        chain.update_crackle(params.crackle_percent);

        debug!(
            sample_rate = rate,
            channels,
            block_frames = spec.block_frames,
            crackle = chain.crackle.is_some(),
            "Signal chain built"
        );
        Ok(chain)
    }

    /// Update every stage in place from a parameter snapshot
    ///
    /// Speed is not a chain property; the transport reads it.
    pub fn apply_parameters(&mut self, params: &EffectParameters) {
        let params = params.sanitized();
        self.bass.set_gain_db(params.bass_gain_db);
        self.eq.set_gain_db(params.eq_tilt);
        self.filter.set_frequency(filter_cutoff_hz(params.filter_amount));
        self.reverb.set_mix(params.reverb_mix());
        self.update_crackle(params.crackle_percent);
        debug!("Chain parameters updated in place");
    }

    // Created on first positive value, never removed afterwards
    fn update_crackle(&mut self, crackle_percent: f32) {
        let amplitude = self.spec.crackle_law.amplitude(crackle_percent);
        match &mut self.crackle {
            Some(source) => source.set_amplitude(amplitude),
            None if crackle_percent > 0.0 => {
                let noise = generate_crackle_noise(self.spec.seed, self.spec.sample_rate);
                self.crackle = Some(CrackleSource::new(noise, amplitude));
                debug!(amplitude, "Crackle source created");
            }
            None => {}
        }
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master.set_gain(gain);
    }

    /// Run one block through the chain
    ///
    /// The block must have the chain's channel count and block size.
    pub fn process(&mut self, block: &mut AudioBlock) -> Result<()> {
        if block.frames() != self.spec.block_frames || block.channel_count() != self.spec.channels {
            return Err(AudioError::InvalidConfiguration(format!(
                "chain expects {}x{} blocks, got {}x{}",
                self.spec.channels,
                self.spec.block_frames,
                block.channel_count(),
                block.frames()
            )));
        }

        self.bass.process(block)?;
        self.eq.process(block)?;
        self.filter.process(block)?;
        self.reverb.process(block)?;
        self.delay.process(block)?;
        if let Some(crackle) = &mut self.crackle {
            crackle.mix_into(block);
        }
        self.master.process(block)
    }

    pub fn new_block(&self) -> AudioBlock {
        AudioBlock::new(self.spec.channels, self.spec.block_frames)
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// Stage names in processing order
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names = vec![
            self.bass.name(),
            self.eq.name(),
            self.filter.name(),
            self.reverb.name(),
            self.delay.name(),
        ];
        if self.crackle.is_some() {
            names.push("crackle");
        }
        names.push(self.master.name());
        names
    }

    pub fn crackle_source_count(&self) -> usize {
        usize::from(self.crackle.is_some())
    }

    pub fn crackle_amplitude(&self) -> Option<f32> {
        self.crackle.as_ref().map(CrackleSource::amplitude)
    }

    pub fn bass_gain_db(&self) -> f32 {
        self.bass.gain_db()
    }

    pub fn eq_gain_db(&self) -> f32 {
        self.eq.gain_db()
    }

    pub fn filter_cutoff(&self) -> f32 {
        self.filter.frequency()
    }

    pub fn reverb_mix(&self) -> f32 {
        self.reverb.mix()
    }

    pub fn delay_frames(&self) -> usize {
        self.delay.delay_frames()
    }

    /// Frames of output still owed after the last input frame
    ///
    /// The series delay holds its full length and the reverb rings for the
    /// impulse length on top of that.
    pub fn tail_frames(&self) -> usize {
        self.delay.delay_frames() + self.reverb.impulse_frames()
    }

    pub fn master_gain(&self) -> f32 {
        self.master.gain()
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// Variable-rate reader over a source buffer
///
/// Reads frames `start..end` of the source with linear interpolation, mapping
/// source channels onto the chain's channel count.
pub struct Transport {
    source: SourceBuffer,
    channels: usize,
    position: f64,
    end: f64,
    rate_ratio: f64,
    step: f64,
}

impl Transport {
    /// `rate_ratio` is source rate over chain rate; `speed` multiplies it
    pub fn new(
        source: SourceBuffer,
        channels: usize,
        start_secs: f64,
        end_secs: f64,
        rate_ratio: f64,
        speed: f64,
    ) -> Self {
        let src_rate = source.sample_rate() as f64;
        let frames = source.frames() as f64;
        let position = (start_secs * src_rate).clamp(0.0, frames);
        let end = (end_secs * src_rate).clamp(position, frames);
        Self {
            source,
            channels,
            position,
            end,
            rate_ratio,
            step: speed * rate_ratio,
        }
    }

    /// Whole source at the chain rate
    pub fn full(source: SourceBuffer, channels: usize, chain_rate: u32, speed: f64) -> Self {
        let rate_ratio = source.sample_rate() as f64 / chain_rate as f64;
        let end = source.frames() as f64;
        Self {
            source,
            channels,
            position: 0.0,
            end,
            rate_ratio,
            step: speed * rate_ratio,
        }
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.step = speed * self.rate_ratio;
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.end
    }

    fn read(&self, channel: usize, index: usize, frac: f32) -> f32 {
        let data = self.source.channel(channel);
        let a = data[index];
        match data.get(index + 1) {
            Some(&b) => a + (b - a) * frac,
            None => a,
        }
    }

    fn mapped(&self, chain_channel: usize, index: usize, frac: f32) -> f32 {
        let source_channels = self.source.channel_count();
        if source_channels == 1 {
            self.read(0, index, frac)
        } else if self.channels == 1 {
            let sum: f32 = (0..source_channels).map(|c| self.read(c, index, frac)).sum();
            sum / source_channels as f32
        } else if chain_channel < source_channels {
            self.read(chain_channel, index, frac)
        } else {
            0.0
        }
    }

    /// Fill the block from the source and return how many frames were read
    ///
    /// Frames past the end of the selection are left silent.
    pub fn fill(&mut self, block: &mut AudioBlock) -> usize {
        block.clear();
        let mut written = 0;
        for frame in 0..block.frames() {
            if self.is_finished() {
                break;
            }
            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            for c in 0..block.channel_count().min(self.channels) {
                block.channel_mut(c)[frame] = self.mapped(c, index, frac);
            }
            self.position += self.step;
            written += 1;
        }
        written
    }
}

// ============================================================================
// LIVE RENDERER
// ============================================================================

/// Updates sent from the session to a running live chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCommand {
    ApplyParameters(EffectParameters),
    SetMasterGain(f32),
}

/// State visible to both the session and the audio thread
pub struct LiveShared {
    playing: AtomicBool,
    analyser: Mutex<Analyser>,
}

impl LiveShared {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(true),
            analyser: Mutex::new(Analyser::new()),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    /// Byte spectrum of the most recent output
    pub fn spectrum(&self) -> Option<Vec<u8>> {
        self.analyser
            .lock()
            .ok()
            .map(|mut analyser| analyser.byte_frequency_data())
    }
}

impl Default for LiveShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull-based renderer driven by the output device callback
pub struct LiveRenderer {
    chain: SignalChain,
    transport: Transport,
    commands: Receiver<ChainCommand>,
    shared: Arc<LiveShared>,
    block: AudioBlock,
    mono: Vec<f32>,
    block_pos: usize,
    block_len: usize,
    tail_left: Option<usize>,
    finished: bool,
}

impl LiveRenderer {
    pub fn new(
        chain: SignalChain,
        transport: Transport,
        commands: Receiver<ChainCommand>,
        shared: Arc<LiveShared>,
    ) -> Self {
        let block = chain.new_block();
        let mono = vec![0.0; block.frames()];
        Self {
            chain,
            transport,
            commands,
            shared,
            block,
            mono,
            block_pos: 0,
            block_len: 0,
            tail_left: None,
            finished: false,
        }
    }

    pub fn channels(&self) -> usize {
        self.chain.spec().channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.chain.spec().sample_rate
    }

    pub fn chain(&self) -> &SignalChain {
        &self.chain
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(ChainCommand::ApplyParameters(params)) => {
                    self.chain.apply_parameters(&params);
                    self.transport.set_speed(params.sanitized().playback_rate());
                }
                Ok(ChainCommand::SetMasterGain(gain)) => self.chain.set_master_gain(gain),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Frames of the next block to play, or 0 once the tail has run out
    ///
    /// After the selection ends, silent blocks keep flowing through the chain
    /// until the delay line and the reverb have played out.
    fn next_block_frames(&mut self) -> usize {
        let block_frames = self.block.frames();
        let read = self.transport.fill(&mut self.block);

        if let Some(left) = self.tail_left {
            let frames = left.min(block_frames);
            self.tail_left = Some(left - frames);
            return frames;
        }
        if read < block_frames {
            // The rest of this block is already tail
            let tail = self.chain.tail_frames();
            let emitted = block_frames - read;
            let frames = read + emitted.min(tail);
            self.tail_left = Some(tail.saturating_sub(emitted));
            return frames;
        }
        block_frames
    }

    fn render_block(&mut self) -> bool {
        let frames = self.next_block_frames();
        if frames == 0 {
            return false;
        }
        if let Err(e) = self.chain.process(&mut self.block) {
            error!(error = %e, "Live chain failed, stopping playback");
            return false;
        }

        let channels = self.block.channel_count() as f32;
        for (i, slot) in self.mono.iter_mut().enumerate() {
            let sum: f32 = (0..self.block.channel_count())
                .map(|c| self.block.channel(c)[i])
                .sum();
            *slot = sum / channels;
        }
        if let Ok(mut analyser) = self.shared.analyser.try_lock() {
            analyser.push(&self.mono[..frames]);
        }

        self.block_pos = 0;
        self.block_len = frames;
        true
    }

    /// Fill an interleaved device buffer with the chain's channel count
    ///
    /// Writes silence and clears the playing flag once the selection and its
    /// effect tail are done.
    pub fn render_interleaved(&mut self, out: &mut [f32]) {
        self.drain_commands();

        let channels = self.channels();
        for frame in out.chunks_mut(channels) {
            if !self.finished && self.shared.is_playing() && self.block_pos == self.block_len {
                if !self.render_block() {
                    self.finished = true;
                    self.shared.stop();
                }
            }

            if self.finished || !self.shared.is_playing() {
                frame.fill(0.0);
                continue;
            }

            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.block.channel(c)[self.block_pos];
            }
            self.block_pos += 1;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
