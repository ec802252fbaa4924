//! Command line definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lofi")]
#[command(about = "Turn any track into a lo-fi version of itself", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render a file through the effects chain and write a WAV
    Export {
        /// Input audio file
        input: PathBuf,

        /// Output path (defaults to `<export_dir>/<product>-lofi-<timestamp>.wav`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        effects: EffectArgs,
    },

    /// Play a file, or a trimmed part of it, on an output device
    Play {
        /// Input audio file
        input: PathBuf,

        /// Selection start in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Selection end in seconds (defaults to the end of the file)
        #[arg(long)]
        end: Option<f64>,

        /// Output device name
        #[arg(short, long)]
        device: Option<String>,

        /// Print a spectrum bar while playing
        #[arg(long)]
        meter: bool,

        #[command(flatten)]
        effects: EffectArgs,
    },

    /// List output devices
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage built-in and user presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Print the header of a WAV file
    Inspect {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum PresetAction {
    /// List built-in and user presets
    List,
    /// Show the values of a preset
    Show { name: String },
    /// Save the given effect values as a user preset
    Save {
        name: String,
        #[command(flatten)]
        effects: EffectArgs,
    },
    /// Delete a user preset
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the factory default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the active configuration
    Show,
    /// Print the configuration file path
    Path,
}

/// Effect controls; unset flags keep the configured value
#[derive(Args, Debug, Clone, Default)]
pub struct EffectArgs {
    /// Start from a built-in (chill, warm, vintage) or user preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Bass shelf gain in dB, -24..24
    #[arg(long, allow_negative_numbers = true)]
    pub bass: Option<f32>,

    /// Playback speed in percent, 50..150
    #[arg(long)]
    pub speed: Option<f32>,

    /// Low-pass amount, 0..100
    #[arg(long)]
    pub filter: Option<f32>,

    /// Reverb wet mix in percent, 0..100
    #[arg(long)]
    pub reverb: Option<f32>,

    /// Vinyl crackle, 0..100
    #[arg(long)]
    pub crackle: Option<f32>,

    /// Mid-band tilt, -50..50
    #[arg(long, allow_negative_numbers = true)]
    pub eq: Option<f32>,

    /// Master volume in percent, 0..100
    #[arg(long)]
    pub volume: Option<f32>,
}

impl EffectArgs {
    /// Explicit per-control overrides
    pub fn overrides(&self) -> Vec<(lofi_core::ParamName, f32)> {
        use lofi_core::ParamName;
        [
            (ParamName::Bass, self.bass),
            (ParamName::Speed, self.speed),
            (ParamName::Filter, self.filter),
            (ParamName::Reverb, self.reverb),
            (ParamName::Crackle, self.crackle),
            (ParamName::Eq, self.eq),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_export_flags() {
        let cli = Cli::try_parse_from([
            "lofi", "export", "in.mp3", "--bass", "-6", "--eq", "-20", "--preset", "warm",
        ])
        .unwrap();
        let Command::Export { effects, .. } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(effects.preset.as_deref(), Some("warm"));
        assert_eq!(
            effects.overrides(),
            vec![(lofi_core::ParamName::Bass, -6.0), (lofi_core::ParamName::Eq, -20.0)]
        );
    }
}
