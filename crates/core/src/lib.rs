//! LoFi generator core
//!
//! Platform-agnostic pieces of the engine: the effect parameter store, the
//! signal chain builder with its DSP stages, the offline renderer, the WAV
//! container encoder and the session that ties them together. Device output
//! and file decoding are provided by the `infra` crate through the traits in
//! [`domain::audio`].

pub mod domain;

pub use domain::*;
