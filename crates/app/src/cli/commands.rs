//! Subcommand handlers

use crate::args::{ConfigAction, EffectArgs, PresetAction};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use lofi_core::domain::audio::{AudioEnumerator, AudioOutput, PlaybackStream, StreamConfig};
use lofi_core::domain::config::{ConfigManager, LofiConfig, PresetManager};
use lofi_core::{
    export_filename, AudioError, CancelToken, EffectParameters, LiveRenderer, LofiSession,
    ParamName, ParameterStore, PlayStatus, Preset, WavHeader,
};
use lofi_infra::{CpalEnumerator, CpalOutput, SymphoniaDecoder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loaded configuration plus the directories it resolves against
pub struct AppContext {
    pub manager: ConfigManager,
    pub config: LofiConfig,
}

impl AppContext {
    pub async fn load(config_dir: Option<PathBuf>) -> Result<Self> {
        let dir = match config_dir {
            Some(dir) => dir,
            None => ConfigManager::default_config_dir()?,
        };
        let manager = ConfigManager::new(dir);
        let config = manager.load().await;
        debug!(path = %manager.config_path().display(), "Configuration ready");
        Ok(Self { manager, config })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.manager.config_dir().join(path)
        }
    }

    pub fn presets(&self) -> PresetManager {
        PresetManager::new(self.resolve(&self.config.app.preset_dir))
    }

    /// Effect values: config, then preset, then explicit flags
    pub async fn effects(&self, args: &EffectArgs) -> Result<EffectParameters> {
        let base = match &args.preset {
            None => self.config.effects,
            Some(name) => self.preset(name).await?,
        };
        let mut store = ParameterStore::with_values(base);
        for (name, value) in args.overrides() {
            store.set(name, value);
        }
        Ok(store.snapshot())
    }

    async fn preset(&self, name: &str) -> Result<EffectParameters> {
        if let Ok(builtin) = name.parse::<Preset>() {
            return Ok(builtin.parameters());
        }
        self.presets()
            .load_preset(name)
            .await
            .with_context(|| format!("Unknown preset '{}'", name))
    }
}

/// Output used when no device is needed
struct Headless;

impl AudioOutput for Headless {
    fn stream_config(&self) -> lofi_core::domain::audio::Result<StreamConfig> {
        Ok(StreamConfig::default())
    }

    fn start(
        &self,
        _renderer: LiveRenderer,
    ) -> lofi_core::domain::audio::Result<Box<dyn PlaybackStream>> {
        Err(AudioError::DeviceNotFound(
            "no output device in headless mode".to_string(),
        ))
    }
}

fn decoder_for(path: &Path) -> SymphoniaDecoder {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => SymphoniaDecoder::with_extension(ext),
        None => SymphoniaDecoder::new(),
    }
}

async fn open_session(
    ctx: &AppContext,
    input: &Path,
    output: Box<dyn AudioOutput>,
    effects: &EffectArgs,
) -> Result<LofiSession> {
    let params = ctx.effects(effects).await?;
    let mut session = LofiSession::new(
        Box::new(decoder_for(input)),
        output,
        ctx.config.engine.clone(),
        params,
    );
    if let Some(volume) = effects.volume {
        session.set_volume(volume);
    }

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    session
        .load_file(&bytes)
        .with_context(|| format!("Failed to decode {}", input.display()))?;
    Ok(session)
}

fn print_parameters(params: &EffectParameters) {
    for name in ParamName::ALL {
        let value = params.get(name);
        println!("  {:<8} {:>7.1}  {}", name, value, name.describe(value));
    }
}

pub async fn export(
    ctx: &AppContext,
    input: &Path,
    output: Option<PathBuf>,
    effects: &EffectArgs,
) -> Result<()> {
    let session = open_session(ctx, input, Box::new(Headless), effects).await?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling export");
            on_interrupt.cancel();
        }
    });

    let result = session.export_with_cancel(&cancel);
    interrupt.abort();
    let bytes = result
        .context("Export failed")?
        .ok_or(AudioError::NoSourceLoaded)?;

    let path = match output {
        Some(path) => path,
        None => {
            let dir = ctx.resolve(&ctx.config.app.export_dir);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir.join(export_filename(&ctx.config.app.product_name, Utc::now()))
        }
    };

    tokio::fs::write(&path, bytes.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let header = bytes.header()?;
    info!(path = %path.display(), "Export written");
    println!(
        "{}  {:.2}s  {} ch  {} Hz",
        path.display(),
        header.duration_secs(),
        header.format.channels,
        header.format.sample_rate
    );
    Ok(())
}

fn ensure_started(status: PlayStatus) -> Result<()> {
    match status {
        PlayStatus::Started => Ok(()),
        PlayStatus::NoSource => Err(AudioError::NoSourceLoaded.into()),
        PlayStatus::AlreadyPlaying => bail!("Session is already playing"),
    }
}

/// Ten-step bar of the loudest spectrum bins
fn meter_line(spectrum: &[u8]) -> String {
    const WIDTH: usize = 32;
    let bands = spectrum.len().max(1).div_ceil(WIDTH);
    spectrum
        .chunks(bands)
        .map(|band| {
            let peak = band.iter().copied().max().unwrap_or(0);
            [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'][(peak as usize * 9) / 255]
        })
        .collect()
}

pub async fn play(
    ctx: &AppContext,
    input: &Path,
    start: f64,
    end: Option<f64>,
    device: Option<String>,
    meter: bool,
    effects: &EffectArgs,
) -> Result<()> {
    let device_name = device.or_else(|| {
        let name = &ctx.config.audio.output_device;
        (!name.is_empty()).then(|| name.clone())
    });
    let buffer_size = Some(ctx.config.audio.buffer_size).filter(|&n| n > 0);
    let output = CpalOutput::open(device_name.as_deref(), buffer_size)
        .context("Failed to open output device")?;
    match output.info() {
        Ok(info) => println!("Output: {}", info.name),
        Err(e) => debug!("Could not describe output device: {}", e),
    }

    let mut session = open_session(ctx, input, Box::new(output), effects).await?;
    let end = match end {
        Some(end) => end,
        None => session.source().map(|s| s.duration_secs()).unwrap_or(0.0),
    };

    ensure_started(session.play(start, end)?)?;

    println!("Playing {} ({:.2}s - {:.2}s), Ctrl-C to stop", input.display(), start, end);
    print_parameters(&session.parameters());

    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = tick.tick() => {
                if !session.is_playing() {
                    break;
                }
                if meter {
                    if let Some(spectrum) = session.spectrum() {
                        eprint!("\r[{}]", meter_line(&spectrum));
                    }
                }
            }
        }
    }
    if meter {
        eprintln!();
    }

    session.stop();
    Ok(())
}

pub fn devices(json: bool) -> Result<()> {
    let enumerator = CpalEnumerator::new();
    let devices = enumerator
        .output_devices()
        .context("Failed to enumerate output devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No output devices found");
    }
    for device in &devices {
        let rate = device
            .default_sample_rate
            .map(|r| format!("{} Hz", r.hz()))
            .unwrap_or_else(|| "?".to_string());
        let marker = if device.is_default { "*" } else { " " };
        println!("{} {}  ({})", marker, device.name, rate);
    }
    Ok(())
}

pub async fn presets(ctx: &AppContext, action: PresetAction) -> Result<()> {
    let manager = ctx.presets();
    match action {
        PresetAction::List => {
            println!("Built-in:");
            for preset in Preset::ALL {
                println!("  {}", preset.as_str());
            }
            let user = manager.list_presets().await?;
            println!("User:");
            if user.is_empty() {
                println!("  (none)");
            }
            for name in user {
                println!("  {}", name);
            }
        }
        PresetAction::Show { name } => {
            let params = ctx.preset(&name).await?;
            println!("{}:", name);
            print_parameters(&params);
        }
        PresetAction::Save { name, effects } => {
            if name.parse::<Preset>().is_ok() {
                bail!("'{}' is a built-in preset name", name);
            }
            let params = ctx.effects(&effects).await?;
            if manager.preset_exists(&name).await {
                println!("Overwriting preset '{}'", name);
            }
            manager
                .save_preset(&name, &params)
                .await
                .with_context(|| format!("Failed to save preset '{}'", name))?;
            println!("Saved preset '{}'", name);
        }
        PresetAction::Delete { name } => {
            manager
                .delete_preset(&name)
                .await
                .with_context(|| format!("Failed to delete preset '{}'", name))?;
            println!("Deleted preset '{}'", name);
        }
    }
    Ok(())
}

pub async fn inspect(file: &Path, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let header = WavHeader::parse(&bytes).context("Not a canonical PCM WAV file")?;

    if json {
        let value = serde_json::json!({
            "channels": header.format.channels,
            "sample_rate": header.format.sample_rate,
            "bits_per_sample": header.format.bits_per_sample,
            "frames": header.frames(),
            "data_len": header.data_len,
            "duration_secs": header.duration_secs(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("channels:        {}", header.format.channels);
        println!("sample rate:     {} Hz", header.format.sample_rate);
        println!("bits per sample: {}", header.format.bits_per_sample);
        println!("frames:          {}", header.frames());
        println!("duration:        {:.3}s", header.duration_secs());
    }
    Ok(())
}

pub async fn config(ctx: &AppContext, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if ctx.manager.exists() && !force {
                bail!(
                    "{} already exists, pass --force to overwrite",
                    ctx.manager.config_path().display()
                );
            }
            ctx.manager.save(&LofiConfig::factory_default()).await?;
            println!("Wrote {}", ctx.manager.config_path().display());
        }
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&ctx.config)?);
        }
        ConfigAction::Path => {
            println!("{}", ctx.manager.config_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_line_width() {
        let line = meter_line(&[0u8; 1024]);
        assert_eq!(line.chars().count(), 32);
        assert!(line.chars().all(|c| c == ' '));

        let loud = meter_line(&[255u8; 1024]);
        assert!(loud.chars().all(|c| c == '@'));
    }

    #[tokio::test]
    async fn test_effects_layering() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::load(Some(dir.path().to_path_buf())).await.unwrap();

        let args = EffectArgs {
            preset: Some("warm".to_string()),
            crackle: Some(500.0),
            ..Default::default()
        };
        let params = ctx.effects(&args).await.unwrap();
        assert_eq!(params.bass_gain_db, Preset::Warm.parameters().bass_gain_db);
        assert_eq!(params.crackle_percent, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_preset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::load(Some(dir.path().to_path_buf())).await.unwrap();
        let args = EffectArgs {
            preset: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(ctx.effects(&args).await.is_err());
    }

    #[test]
    fn test_no_source_maps_to_audio_error() {
        assert!(ensure_started(PlayStatus::Started).is_ok());

        let err = ensure_started(PlayStatus::NoSource).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AudioError>(),
            Some(AudioError::NoSourceLoaded)
        ));
        assert!(ensure_started(PlayStatus::AlreadyPlaying).is_err());
    }

    #[tokio::test]
    async fn test_preset_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::load(Some(dir.path().to_path_buf())).await.unwrap();
        let save = |bass| PresetAction::Save {
            name: "late_night".to_string(),
            effects: EffectArgs {
                bass: Some(bass),
                ..Default::default()
            },
        };

        presets(&ctx, save(4.0)).await.unwrap();
        assert!(ctx.presets().preset_exists("late_night").await);
        presets(&ctx, save(7.0)).await.unwrap();
        assert_eq!(ctx.preset("late_night").await.unwrap().bass_gain_db, 7.0);

        let builtin = PresetAction::Save {
            name: "chill".to_string(),
            effects: EffectArgs::default(),
        };
        assert!(presets(&ctx, builtin).await.is_err());
    }
}
