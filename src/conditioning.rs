//! Input validation and conditioning encoding.
//!
//! A [`NoteSpec`] carries the five musical controls a caller can set:
//! velocity layer, MIDI pitch, instrument source family, quality tags,
//! and a 16-d latent timbre sample. Every field is validated against
//! its domain before any model runs; the first violation fails the
//! whole request.
//!
//! Valid requests encode deterministically into a flat [`Conditioning`]
//! vector consumed read-only by every downstream stage:
//!
//! ```text
//! [ pitch/127 | velocity/127 | source one-hot (3) | qualities multi-hot (10) | latent (16) ]
//! ```

use std::str::FromStr;

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The five velocity layers the stage models were trained on.
pub const VELOCITIES: [u8; 5] = [25, 50, 75, 100, 127];

/// Inclusive MIDI pitch domain.
pub const PITCH_MIN: u8 = 9;
/// Inclusive MIDI pitch domain.
pub const PITCH_MAX: u8 = 120;

/// Latent sample dimensionality.
pub const LATENT_DIM: usize = 16;

/// Inclusive bound on the magnitude of each latent component.
pub const LATENT_ABS_MAX: f32 = 7.0;

/// Total conditioning vector width.
pub const CONDITIONING_DIM: usize = 2 + InstrumentSource::COUNT + Quality::COUNT + LATENT_DIM;

/// Instrument source family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentSource {
    Acoustic,
    Electronic,
    Synthetic,
}

impl InstrumentSource {
    /// Number of source categories (one-hot width).
    pub const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for InstrumentSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "acoustic" => Ok(InstrumentSource::Acoustic),
            "electronic" => Ok(InstrumentSource::Electronic),
            "synthetic" => Ok(InstrumentSource::Synthetic),
            other => Err(Error::Validation {
                field: "source",
                reason: format!("unknown source '{other}' (acoustic, electronic, synthetic)"),
            }),
        }
    }
}

/// Qualitative timbre descriptors. The variant order is the canonical
/// vocabulary order used by the multi-hot encoding, independent of the
/// order tags appear in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Bright,
    Dark,
    Distortion,
    FastDecay,
    LongRelease,
    Multiphonic,
    NonlinearEnv,
    Percussive,
    Reverb,
    #[serde(rename = "tempo-synced")]
    TempoSynced,
}

impl Quality {
    /// Vocabulary size (multi-hot width).
    pub const COUNT: usize = 10;

    /// All tags in vocabulary order.
    pub const ALL: [Quality; Quality::COUNT] = [
        Quality::Bright,
        Quality::Dark,
        Quality::Distortion,
        Quality::FastDecay,
        Quality::LongRelease,
        Quality::Multiphonic,
        Quality::NonlinearEnv,
        Quality::Percussive,
        Quality::Reverb,
        Quality::TempoSynced,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bright" => Ok(Quality::Bright),
            "dark" => Ok(Quality::Dark),
            "distortion" => Ok(Quality::Distortion),
            "fast_decay" => Ok(Quality::FastDecay),
            "long_release" => Ok(Quality::LongRelease),
            "multiphonic" => Ok(Quality::Multiphonic),
            "nonlinear_env" => Ok(Quality::NonlinearEnv),
            "percussive" => Ok(Quality::Percussive),
            "reverb" => Ok(Quality::Reverb),
            "tempo-synced" | "tempo_synced" => Ok(Quality::TempoSynced),
            other => Err(Error::Validation {
                field: "qualities",
                reason: format!("unknown quality tag '{other}'"),
            }),
        }
    }
}

/// A raw synthesis request: exactly the five musical controls.
///
/// Quality tags have set semantics — duplicates are idempotent and the
/// multi-hot encoding ignores input order. An empty tag list is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteSpec {
    pub velocity: u8,
    pub pitch: u8,
    pub source: InstrumentSource,
    pub qualities: Vec<Quality>,
    pub latent_sample: Vec<f32>,
}

impl NoteSpec {
    /// Validate every field against its domain.
    ///
    /// No snapping: a velocity of 64 is a domain error, not "close to 75".
    pub fn validate(&self) -> Result<()> {
        if !VELOCITIES.contains(&self.velocity) {
            return Err(Error::Validation {
                field: "velocity",
                reason: format!("{} is not one of {VELOCITIES:?}", self.velocity),
            });
        }
        if !(PITCH_MIN..=PITCH_MAX).contains(&self.pitch) {
            return Err(Error::Validation {
                field: "pitch",
                reason: format!("{} is outside [{PITCH_MIN}, {PITCH_MAX}]", self.pitch),
            });
        }
        if self.latent_sample.len() != LATENT_DIM {
            return Err(Error::Validation {
                field: "latent_sample",
                reason: format!(
                    "expected {LATENT_DIM} values, got {}",
                    self.latent_sample.len()
                ),
            });
        }
        for (i, &v) in self.latent_sample.iter().enumerate() {
            if !v.is_finite() {
                return Err(Error::Validation {
                    field: "latent_sample",
                    reason: format!("component {i} is not finite"),
                });
            }
            if v.abs() > LATENT_ABS_MAX {
                return Err(Error::Validation {
                    field: "latent_sample",
                    reason: format!(
                        "component {i} = {v} is outside [-{LATENT_ABS_MAX}, {LATENT_ABS_MAX}]"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Validate, then encode into the conditioning vector.
    pub fn encode(&self) -> Result<Conditioning> {
        self.validate()?;
        Ok(Conditioning::from_spec(self))
    }
}

/// Immutable conditioning vector derived from a validated [`NoteSpec`].
///
/// Encoding the same request twice yields an identical vector; every
/// downstream stage consumes it read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditioning {
    values: Vec<f32>,
    pitch: u8,
}

impl Conditioning {
    fn from_spec(spec: &NoteSpec) -> Self {
        let mut values = Vec::with_capacity(CONDITIONING_DIM);
        values.push(spec.pitch as f32 / 127.0);
        values.push(spec.velocity as f32 / 127.0);

        let mut source = [0.0f32; InstrumentSource::COUNT];
        source[spec.source.index()] = 1.0;
        values.extend_from_slice(&source);

        let mut tags = [0.0f32; Quality::COUNT];
        for quality in &spec.qualities {
            tags[quality.index()] = 1.0;
        }
        values.extend_from_slice(&tags);

        values.extend_from_slice(&spec.latent_sample);
        debug_assert_eq!(values.len(), CONDITIONING_DIM);

        Self {
            values,
            pitch: spec.pitch,
        }
    }

    /// Full encoding as a flat slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// The latent sample components (last 16 values, passed through
    /// unchanged from the request).
    pub fn latent_sample(&self) -> &[f32] {
        &self.values[CONDITIONING_DIM - LATENT_DIM..]
    }

    /// The conditioned MIDI pitch, kept alongside the scaled encoding
    /// as the anchor for the f0 contour.
    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    /// The encoding as a `[1, CONDITIONING_DIM]` tensor.
    pub fn to_tensor(&self, device: &Device, dtype: DType) -> Result<Tensor> {
        let t = Tensor::from_slice(&self.values, (1, CONDITIONING_DIM), device)?;
        Ok(t.to_dtype(dtype)?)
    }
}
