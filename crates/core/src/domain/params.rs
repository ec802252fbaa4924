//! Effect parameter store
//!
//! Holds the six named LoFi controls plus the master volume. Values are
//! clamped into their ranges on write; non-finite writes are ignored. The
//! store never touches a signal chain: chains read a [`EffectParameters`]
//! snapshot whenever they are built or updated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

/// Parameter constraints
pub mod ranges {
    pub const BASS_DB_MIN: f32 = -24.0;
    pub const BASS_DB_MAX: f32 = 24.0;

    pub const SPEED_MIN: f32 = 50.0;
    pub const SPEED_MAX: f32 = 150.0;

    pub const PERCENT_MIN: f32 = 0.0;
    pub const PERCENT_MAX: f32 = 100.0;

    pub const EQ_MIN: f32 = -50.0;
    pub const EQ_MAX: f32 = 50.0;
}

/// Name of an effect control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    Bass,
    Speed,
    Filter,
    Reverb,
    Crackle,
    Eq,
}

impl ParamName {
    pub const ALL: [ParamName; 6] = [
        ParamName::Bass,
        ParamName::Speed,
        ParamName::Filter,
        ParamName::Reverb,
        ParamName::Crackle,
        ParamName::Eq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::Bass => "bass",
            ParamName::Speed => "speed",
            ParamName::Filter => "filter",
            ParamName::Reverb => "reverb",
            ParamName::Crackle => "crackle",
            ParamName::Eq => "eq",
        }
    }

    /// Inclusive clamp range
    pub fn range(&self) -> (f32, f32) {
        use ranges::*;
        match self {
            ParamName::Bass => (BASS_DB_MIN, BASS_DB_MAX),
            ParamName::Speed => (SPEED_MIN, SPEED_MAX),
            ParamName::Filter | ParamName::Reverb | ParamName::Crackle => {
                (PERCENT_MIN, PERCENT_MAX)
            }
            ParamName::Eq => (EQ_MIN, EQ_MAX),
        }
    }

    pub fn default_value(&self) -> f32 {
        EffectParameters::default().get(*self)
    }

    /// Human readable value, as shown next to the slider
    pub fn describe(&self, value: f32) -> String {
        let level = |low: &str, mid: &str, high: &str| {
            if value == 0.0 {
                "Off".to_string()
            } else if value < 33.0 {
                low.to_string()
            } else if value < 66.0 {
                mid.to_string()
            } else {
                high.to_string()
            }
        };

        match self {
            ParamName::Bass => format!("{} dB", value),
            ParamName::Speed | ParamName::Reverb => format!("{}%", value),
            ParamName::Filter => level("Low", "Medium", "High"),
            ParamName::Crackle => level("Soft", "Medium", "Heavy"),
            ParamName::Eq => {
                let label = if value < -25.0 {
                    "Dark"
                } else if value < 0.0 {
                    "Warm"
                } else if value == 0.0 {
                    "Neutral"
                } else if value < 25.0 {
                    "Bright"
                } else {
                    "Crisp"
                };
                label.to_string()
            }
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Unknown parameter: {0}")]
pub struct UnknownParameter(pub String);

impl FromStr for ParamName {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bass" | "bassGainDb" | "bass_gain_db" => Ok(ParamName::Bass),
            "speed" | "speedPercent" | "speed_percent" => Ok(ParamName::Speed),
            "filter" | "filterAmount" | "filter_amount" => Ok(ParamName::Filter),
            "reverb" | "reverbMixPercent" | "reverb_mix_percent" => Ok(ParamName::Reverb),
            "crackle" | "cracklePercent" | "crackle_percent" => Ok(ParamName::Crackle),
            "eq" | "eqTilt" | "eq_tilt" => Ok(ParamName::Eq),
            other => Err(UnknownParameter(other.to_string())),
        }
    }
}

/// Snapshot of all six effect controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParameters {
    pub bass_gain_db: f32,
    pub speed_percent: f32,
    pub filter_amount: f32,
    pub reverb_mix_percent: f32,
    pub crackle_percent: f32,
    pub eq_tilt: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            bass_gain_db: 0.0,
            speed_percent: 100.0,
            filter_amount: 0.0,
            // Stylistic default, the only control that is not neutral
            reverb_mix_percent: 30.0,
            crackle_percent: 0.0,
            eq_tilt: 0.0,
        }
    }
}

impl EffectParameters {
    pub fn get(&self, name: ParamName) -> f32 {
        match name {
            ParamName::Bass => self.bass_gain_db,
            ParamName::Speed => self.speed_percent,
            ParamName::Filter => self.filter_amount,
            ParamName::Reverb => self.reverb_mix_percent,
            ParamName::Crackle => self.crackle_percent,
            ParamName::Eq => self.eq_tilt,
        }
    }

    fn slot(&mut self, name: ParamName) -> &mut f32 {
        match name {
            ParamName::Bass => &mut self.bass_gain_db,
            ParamName::Speed => &mut self.speed_percent,
            ParamName::Filter => &mut self.filter_amount,
            ParamName::Reverb => &mut self.reverb_mix_percent,
            ParamName::Crackle => &mut self.crackle_percent,
            ParamName::Eq => &mut self.eq_tilt,
        }
    }

    /// Copy with every field clamped into range and non-finite fields reset
    pub fn sanitized(&self) -> Self {
        let mut out = Self::default();
        for name in ParamName::ALL {
            let value = self.get(name);
            if value.is_finite() {
                let (min, max) = name.range();
                *out.slot(name) = value.clamp(min, max);
            }
        }
        out
    }

    /// Transport rate multiplier
    pub fn playback_rate(&self) -> f64 {
        self.speed_percent as f64 / 100.0
    }

    /// Reverb wet fraction in [0, 1]
    pub fn reverb_mix(&self) -> f32 {
        self.reverb_mix_percent / 100.0
    }
}

/// Built-in parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Chill,
    Warm,
    Vintage,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Chill, Preset::Warm, Preset::Vintage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Chill => "chill",
            Preset::Warm => "warm",
            Preset::Vintage => "vintage",
        }
    }

    pub fn parameters(&self) -> EffectParameters {
        let (bass, speed, filter, reverb, crackle, eq) = match self {
            Preset::Chill => (3.0, 85.0, 40.0, 45.0, 15.0, -15.0),
            Preset::Warm => (6.0, 95.0, 25.0, 30.0, 20.0, -10.0),
            Preset::Vintage => (8.0, 75.0, 60.0, 20.0, 40.0, -30.0),
        };
        EffectParameters {
            bass_gain_db: bass,
            speed_percent: speed,
            filter_amount: filter,
            reverb_mix_percent: reverb,
            crackle_percent: crackle,
            eq_tilt: eq,
        }
    }
}

impl FromStr for Preset {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chill" => Ok(Preset::Chill),
            "warm" => Ok(Preset::Warm),
            "vintage" => Ok(Preset::Vintage),
            other => Err(UnknownParameter(other.to_string())),
        }
    }
}

/// Current effect values
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: EffectParameters,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given set, clamped into range
    pub fn with_values(values: EffectParameters) -> Self {
        Self {
            values: values.sanitized(),
        }
    }

    /// Set a value, clamped into range
    ///
    /// Non-finite values leave the store unchanged. Returns the stored value.
    pub fn set(&mut self, name: ParamName, value: f32) -> f32 {
        if !value.is_finite() {
            debug!(param = %name, "Ignoring non-finite parameter value");
            return self.get(name);
        }
        let (min, max) = name.range();
        let clamped = value.clamp(min, max);
        *self.values.slot(name) = clamped;
        trace!(param = %name, value = clamped, "Parameter set");
        clamped
    }

    pub fn get(&self, name: ParamName) -> f32 {
        self.values.get(name)
    }

    pub fn snapshot(&self) -> EffectParameters {
        self.values
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        debug!(preset = preset.as_str(), "Applying preset");
        self.values = preset.parameters();
    }

    pub fn replace(&mut self, values: EffectParameters) {
        self.values = values.sanitized();
    }

    pub fn reset(&mut self) {
        self.values = EffectParameters::default();
    }
}

/// User volume control feeding the master gain stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterVolume {
    percent: f32,
}

impl MasterVolume {
    pub const DEFAULT_PERCENT: f32 = 80.0;

    pub fn new(percent: f32) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            Self::DEFAULT_PERCENT
        };
        Self { percent }
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }

    /// Linear gain applied by the master stage
    pub fn gain(&self) -> f32 {
        self.percent / 100.0
    }

    pub fn is_muted(&self) -> bool {
        self.percent == 0.0
    }

    /// Mute button: silence when audible, back to the default level when muted
    pub fn toggle_mute(&mut self) {
        self.percent = if self.percent > 0.0 {
            0.0
        } else {
            Self::DEFAULT_PERCENT
        };
    }
}

impl Default for MasterVolume {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERCENT)
    }
}
