//! Typed pipeline artifacts and the stage interfaces.
//!
//! The pipeline is an explicit chain of typed artifacts:
//!
//! ```text
//! Conditioning → LatentSequence → ContourPair → AudioBuffer
//! ```
//!
//! Each stage exposes exactly one inference operation behind an
//! object-safe trait, so the orchestrator stays agnostic to the
//! concrete model behind it and checkpoints can be swapped without
//! touching orchestration logic. Stages are stateless: they hold
//! read-only weights and retain nothing across requests.

use candle_core::{DType, Device, Tensor};

use crate::conditioning::Conditioning;
use crate::{Error, Result};

/// Time-varying latent embedding, one vector per synthesis frame.
///
/// Stored row-major as `[num_frames, dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentSequence {
    data: Vec<f32>,
    dim: usize,
}

impl LatentSequence {
    /// Build from flat row-major frame data.
    pub fn new(data: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 || data.len() % dim != 0 {
            return Err(Error::Synthesis(format!(
                "latent data of {} values does not divide into {dim}-d frames",
                data.len()
            )));
        }
        Ok(Self { data, dim })
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Embedding width per frame.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One frame's latent vector.
    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Flat row-major view of all frames.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// The sequence as a `[num_frames, dim]` tensor.
    pub fn to_tensor(&self, device: &Device, dtype: DType) -> Result<Tensor> {
        let t = Tensor::from_slice(&self.data, (self.len(), self.dim), device)?;
        Ok(t.to_dtype(dtype)?)
    }
}

/// Frame-aligned fundamental-frequency and loudness contours.
///
/// f0 is in Hz and strictly positive — unvoiced frames are expressed
/// through near-floor loudness, never a zero frequency. Loudness is in
/// dB, negative up to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourPair {
    pub f0_hz: Vec<f32>,
    pub loudness_db: Vec<f32>,
}

impl ContourPair {
    /// Number of frames (f0 length; `check` enforces agreement).
    pub fn len(&self) -> usize {
        self.f0_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.f0_hz.is_empty()
    }

    /// Fail fast on a malformed pair: length disagreement, non-positive
    /// or non-finite f0, non-finite loudness.
    pub fn check(&self) -> Result<()> {
        if self.f0_hz.len() != self.loudness_db.len() {
            return Err(Error::Synthesis(format!(
                "f0 has {} frames but loudness has {}",
                self.f0_hz.len(),
                self.loudness_db.len()
            )));
        }
        for (i, &f0) in self.f0_hz.iter().enumerate() {
            if !f0.is_finite() || f0 <= 0.0 {
                return Err(Error::Synthesis(format!(
                    "f0 frame {i} is {f0}, must be finite and positive"
                )));
            }
        }
        for (i, &db) in self.loudness_db.iter().enumerate() {
            if !db.is_finite() {
                return Err(Error::Synthesis(format!("loudness frame {i} is {db}")));
            }
        }
        Ok(())
    }
}

/// Synthesized audio at the pipeline sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Everything produced for one request: the terminal waveform plus the
/// intermediate artifacts, for callers that want to inspect them.
#[derive(Debug, Clone)]
pub struct SynthesizedNote {
    pub audio: AudioBuffer,
    pub latents: LatentSequence,
    pub contours: ContourPair,
}

/// z-stage capability: expand static conditioning into a time-varying
/// latent sequence.
pub trait GenerateLatents: Send + Sync {
    fn generate_latents(&self, conditioning: &Conditioning) -> Result<LatentSequence>;
}

/// Contour-stage capability: conditioning plus latent sequence into
/// frame-aligned f0/loudness contours.
pub trait GenerateContours: Send + Sync {
    fn generate_contours(
        &self,
        conditioning: &Conditioning,
        latents: &LatentSequence,
    ) -> Result<ContourPair>;
}

/// Synthesizer capability: latent sequence plus contours into audio.
pub trait SynthesizeAudio: Send + Sync {
    fn synthesize_audio(
        &self,
        latents: &LatentSequence,
        contours: &ContourPair,
    ) -> Result<AudioBuffer>;
}
