//! Pitch and loudness contour generator.
//!
//! Consumes the conditioning vector and the latent sequence and emits
//! frame-aligned f0 (Hz) and loudness (dB) contours. The output head
//! keeps the numeric contract by construction:
//!
//! - f0 is a tanh-bounded semitone deviation (±2 st) around the
//!   conditioned pitch, mapped through MIDI→Hz — always finite and
//!   strictly positive. Unvoiced frames come out as near-floor
//!   loudness, never a zero frequency.
//! - loudness is `floor · (1 − σ(x))`, landing strictly inside
//!   `(floor, 0)` dB.
//!
//! The raw contours are not smoothed; a refinement post-step is a known
//! quality gap in the current models.

use candle_core::{DType, Device, Tensor};
use candle_nn::{self as nn, Module, VarBuilder};

use crate::audio::harmonic::midi_to_hz;
use crate::conditioning::{Conditioning, CONDITIONING_DIM};
use crate::config::PipelineConfig;
use crate::stage::{ContourPair, GenerateContours, LatentSequence};
use crate::{Error, Result, Stage};

/// Largest deviation from the conditioned pitch, in semitones.
const MAX_PITCH_DEVIATION_ST: f32 = 2.0;

/// Contour model: conditioning `[1, 31]` + latents `[N, 16]` → `[N, 2]`
/// raw head outputs, mapped to (f0 Hz, loudness dB) per frame.
#[derive(Debug, Clone)]
pub struct ContourGenerator {
    in_proj: nn::Linear,
    hidden: nn::Linear,
    head: nn::Linear,
    loudness_floor_db: f32,
    device: Device,
    dtype: DType,
}

impl ContourGenerator {
    pub fn new(
        cfg: &PipelineConfig,
        dtype: DType,
        dev: &Device,
        vb: VarBuilder,
    ) -> Result<Self> {
        let in_dim = CONDITIONING_DIM + cfg.latent_dim;
        let in_proj = nn::linear(in_dim, cfg.hidden_dim, vb.pp("in_proj"))?;
        let hidden = nn::linear(cfg.hidden_dim, cfg.hidden_dim, vb.pp("hidden"))?;
        let head = nn::linear(cfg.hidden_dim, 2, vb.pp("head"))?;

        Ok(Self {
            in_proj,
            hidden,
            head,
            loudness_floor_db: cfg.synth.loudness_floor_db,
            device: dev.clone(),
            dtype,
        })
    }

    /// Forward pass: raw per-frame head outputs `[N, 2]`.
    pub fn forward(&self, conditioning: &Tensor, latents: &Tensor) -> candle_core::Result<Tensor> {
        let n = latents.dim(0)?;
        let cond = conditioning
            .broadcast_as((n, CONDITIONING_DIM))?
            .contiguous()?;
        let x = Tensor::cat(&[&cond, latents], 1)?;

        let h = x.apply(&self.in_proj)?.silu()?;
        let h = h.apply(&self.hidden)?.silu()?;
        h.apply(&self.head)
    }
}

impl GenerateContours for ContourGenerator {
    fn generate_contours(
        &self,
        conditioning: &Conditioning,
        latents: &LatentSequence,
    ) -> Result<ContourPair> {
        let stage_err = |reason: String| Error::ModelInference {
            stage: Stage::ContourGenerator,
            reason,
        };

        let cond = conditioning.to_tensor(&self.device, self.dtype)?;
        let z = latents.to_tensor(&self.device, self.dtype)?;
        let raw = self
            .forward(&cond, &z)
            .and_then(|t| t.to_dtype(DType::F32)?.to_vec2::<f32>())
            .map_err(|e| stage_err(e.to_string()))?;

        let pitch = conditioning.pitch() as f32;
        let mut f0_hz = Vec::with_capacity(raw.len());
        let mut loudness_db = Vec::with_capacity(raw.len());
        for row in &raw {
            let deviation = MAX_PITCH_DEVIATION_ST * row[0].tanh();
            f0_hz.push(midi_to_hz(pitch + deviation));
            loudness_db.push(self.loudness_floor_db * (1.0 - sigmoid(row[1])));
        }

        if f0_hz.iter().chain(loudness_db.iter()).any(|v| !v.is_finite()) {
            return Err(stage_err("produced non-finite contour values".into()));
        }
        Ok(ContourPair { f0_hz, loudness_db })
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::{InstrumentSource, NoteSpec, Quality};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            note_duration_s: 0.1,
            hidden_dim: 32,
            ..Default::default()
        }
    }

    fn conditioning(pitch: u8) -> Conditioning {
        NoteSpec {
            velocity: 75,
            pitch,
            source: InstrumentSource::Acoustic,
            qualities: vec![Quality::Bright],
            latent_sample: vec![0.5; 16],
        }
        .encode()
        .unwrap()
    }

    fn latents(cfg: &PipelineConfig) -> LatentSequence {
        LatentSequence::new(vec![0.1; cfg.num_frames() * cfg.latent_dim], cfg.latent_dim).unwrap()
    }

    #[test]
    fn contours_are_frame_aligned_and_in_range() {
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = ContourGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        let pair = model
            .generate_contours(&conditioning(60), &latents(&cfg))
            .unwrap();
        assert_eq!(pair.len(), cfg.num_frames());
        pair.check().unwrap();
        for &db in &pair.loudness_db {
            assert!(db < 0.0 && db > cfg.synth.loudness_floor_db);
        }
    }

    #[test]
    fn zero_weights_track_the_conditioned_pitch() {
        // Zero head output: deviation = 0, so f0 is exactly the MIDI
        // pitch frequency (~261.63 Hz at pitch 60) on every frame.
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = ContourGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        let pair = model
            .generate_contours(&conditioning(60), &latents(&cfg))
            .unwrap();
        for &f0 in &pair.f0_hz {
            assert!((f0 - 261.6256).abs() < 1e-2, "f0 = {f0}");
        }
        // And loudness sits midway to the floor.
        for &db in &pair.loudness_db {
            assert!((db - cfg.synth.loudness_floor_db / 2.0).abs() < 1e-3);
        }
    }

    #[test]
    fn deviation_is_bounded_at_domain_edges() {
        // Even at the pitch domain edges the mapped f0 stays positive
        // and within the deviation bound.
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = ContourGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        for pitch in [9u8, 120] {
            let pair = model
                .generate_contours(&conditioning(pitch), &latents(&cfg))
                .unwrap();
            let lo = midi_to_hz(pitch as f32 - MAX_PITCH_DEVIATION_ST);
            let hi = midi_to_hz(pitch as f32 + MAX_PITCH_DEVIATION_ST);
            for &f0 in &pair.f0_hz {
                assert!(f0 >= lo && f0 <= hi, "pitch {pitch}: f0 = {f0}");
            }
        }
    }
}
