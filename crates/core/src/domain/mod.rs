//! Domain entities and business rules

pub mod analyser;
pub mod audio;
pub mod buffer;
pub mod chain;
pub mod config;
pub mod dsp;
pub mod impulse;
pub mod params;
pub mod render;
pub mod session;
pub mod wav;

// Re-export specific items to avoid ambiguous glob imports
pub use analyser::Analyser;
pub use audio::{
    AudioDecoder, AudioEnumerator, AudioError, AudioOutput, ChannelCount, DeviceId, DeviceInfo,
    PlaybackStream, SampleFormat, SampleRate, StreamConfig,
};
pub use buffer::{AudioBlock, AudioBuffer, RenderedBuffer, SourceBuffer};
pub use chain::{ChainCommand, ChainSpec, LiveRenderer, LiveShared, SignalChain, Transport};
pub use config::{
    AppConfig, AudioDeviceConfig, ConfigError, ConfigManager, CrackleLaw, EngineConfig, LofiConfig,
    PresetManager,
};
pub use params::{EffectParameters, MasterVolume, ParamName, ParameterStore, Preset};
pub use render::{export_filename, CancelToken, ContainerBytes, OfflineRenderer};
pub use session::{LofiSession, PlayStatus};
pub use wav::{encode, WavFormat, WavHeader};
