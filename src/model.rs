//! Pretrained stage models.
//!
//! Each stage is an opaque candle module with a fixed tensor contract;
//! the pipeline depends only on the stage traits in [`crate::stage`],
//! so a checkpoint (or an entirely different implementation) can be
//! swapped without touching orchestration.

pub mod contour;
pub mod latent;
pub mod synthesizer;

pub use contour::ContourGenerator;
pub use latent::LatentGenerator;
pub use synthesizer::HarmonicNoiseSynth;
