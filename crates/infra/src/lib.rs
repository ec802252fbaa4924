//! Platform adapters for the LoFi engine
//!
//! - [`audio`]: CPAL-backed output devices and playback streams
//! - [`decode`]: Symphonia-backed file decoding

pub mod audio;
pub mod decode;

pub use audio::{CpalEnumerator, CpalOutput, CpalPlaybackStream};
pub use decode::SymphoniaDecoder;
