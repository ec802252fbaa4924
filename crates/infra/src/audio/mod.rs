//! Platform-specific audio output using CPAL
//!
//! CPAL abstracts the host APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod stream;

pub use cpal_backend::*;
pub use stream::*;
