//! Neural note synthesis in pure Rust.
//!
//! A candle-based inference pipeline that turns a small set of musical
//! controls — pitch, velocity, instrument source family, quality tags,
//! and a 16-d latent timbre vector — into a synthesized waveform via
//! three pretrained stages feeding a harmonic-plus-noise synthesizer.
//!
//! ## Architecture
//!
//! ```text
//! controls ──validate/encode──► conditioning vector (31)
//!                                      │
//!                    z-stage: latent sequence [1000, 16]
//!                                      │
//!         contour stage: f0 (Hz) + loudness (dB), frame-aligned
//!                                      │
//!      harmonic-plus-noise synthesizer: 64 000 samples @ 16 kHz
//! ```
//!
//! Every boundary is a typed artifact with a checked shape contract;
//! a request either produces the full 4-second buffer or fails with an
//! error naming the offending field or stage.
//!
//! ## Modules
//!
//! - [`conditioning`] — input validation, vocabularies, encoding
//! - [`model`] — the three pretrained stage models
//! - [`audio`] — oscillator bank, filtered noise, WAV I/O
//! - [`pipeline`] — end-to-end orchestration
//! - [`loader`] — checkpoint directory convention
//! - [`manager`] — resident pipeline serving queued requests

pub mod audio;
pub mod conditioning;
pub mod config;
pub mod loader;
pub mod manager;
pub mod model;
pub mod pipeline;
pub mod stage;

mod error;

pub use error::{Error, Result, Stage};

pub use conditioning::NoteSpec;
pub use config::PipelineConfig;
pub use pipeline::Pipeline;
pub use stage::SynthesizedNote;
