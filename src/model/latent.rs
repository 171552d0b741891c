//! Latent sequence generator (z-stage).
//!
//! Expands the static conditioning vector into a time-varying latent
//! embedding, one 16-d vector per synthesis frame. Sinusoidal frame
//! position features are appended to the conditioning so the network
//! can shape an envelope over the note; the caller's latent sample is
//! added back to every frame, making the network a time-varying
//! modulation around the static timbre point.

use candle_core::{DType, Device, Tensor};
use candle_nn::{self as nn, Module, VarBuilder};

use crate::conditioning::{Conditioning, CONDITIONING_DIM, LATENT_DIM};
use crate::config::PipelineConfig;
use crate::stage::{GenerateLatents, LatentSequence};
use crate::{Error, Result, Stage};

/// Sinusoidal position features appended per frame.
const POSITION_FEATURES: usize = 8;

/// z-stage model: conditioning `[1, 31]` → latent sequence `[N, 16]`.
#[derive(Debug, Clone)]
pub struct LatentGenerator {
    in_proj: nn::Linear,
    hidden: nn::Linear,
    out_proj: nn::Linear,
    position: Tensor, // [N, POSITION_FEATURES], fixed
    num_frames: usize,
    device: Device,
    dtype: DType,
}

impl LatentGenerator {
    pub fn new(
        cfg: &PipelineConfig,
        dtype: DType,
        dev: &Device,
        vb: VarBuilder,
    ) -> Result<Self> {
        let in_dim = CONDITIONING_DIM + POSITION_FEATURES;
        let in_proj = nn::linear(in_dim, cfg.hidden_dim, vb.pp("in_proj"))?;
        let hidden = nn::linear(cfg.hidden_dim, cfg.hidden_dim, vb.pp("hidden"))?;
        let out_proj = nn::linear(cfg.hidden_dim, cfg.latent_dim, vb.pp("out_proj"))?;
        let num_frames = cfg.num_frames();
        let position = position_features(num_frames, dev, dtype)?;

        Ok(Self {
            in_proj,
            hidden,
            out_proj,
            position,
            num_frames,
            device: dev.clone(),
            dtype,
        })
    }

    /// Forward pass: conditioning `[1, 31]` → `[N, 16]`.
    pub fn forward(&self, conditioning: &Tensor) -> candle_core::Result<Tensor> {
        let cond = conditioning
            .broadcast_as((self.num_frames, CONDITIONING_DIM))?
            .contiguous()?;
        let x = Tensor::cat(&[&cond, &self.position], 1)?;

        let h = x.apply(&self.in_proj)?.silu()?;
        let h = h.apply(&self.hidden)?.silu()?;
        let delta = h.apply(&self.out_proj)?;

        // Residual: the static latent sample rides along every frame.
        let latent = conditioning.narrow(1, CONDITIONING_DIM - LATENT_DIM, LATENT_DIM)?;
        delta.broadcast_add(&latent)
    }
}

impl GenerateLatents for LatentGenerator {
    fn generate_latents(&self, conditioning: &Conditioning) -> Result<LatentSequence> {
        let stage_err = |reason: String| Error::ModelInference {
            stage: Stage::LatentGenerator,
            reason,
        };

        let cond = conditioning.to_tensor(&self.device, self.dtype)?;
        let z = self
            .forward(&cond)
            .and_then(|z| z.to_dtype(DType::F32)?.to_vec2::<f32>())
            .map_err(|e| stage_err(e.to_string()))?;

        let dim = z.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f32> = z.into_iter().flatten().collect();
        if flat.iter().any(|v| !v.is_finite()) {
            return Err(stage_err("produced non-finite latent values".into()));
        }
        LatentSequence::new(flat, dim)
    }
}

/// Fixed sin/cos features over the note: `[num_frames, POSITION_FEATURES]`.
///
/// Feature pair `i` oscillates at 2^i cycles per note, giving the
/// network both slow envelope and faster texture handles.
fn position_features(num_frames: usize, dev: &Device, dtype: DType) -> Result<Tensor> {
    let mut values = Vec::with_capacity(num_frames * POSITION_FEATURES);
    for frame in 0..num_frames {
        let t = frame as f32 / num_frames as f32;
        for i in 0..POSITION_FEATURES / 2 {
            let phase = std::f32::consts::TAU * t * (1 << i) as f32;
            values.push(phase.sin());
            values.push(phase.cos());
        }
    }
    let t = Tensor::from_vec(values, (num_frames, POSITION_FEATURES), dev)?;
    Ok(t.to_dtype(dtype)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::{InstrumentSource, NoteSpec};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            note_duration_s: 0.1, // 25 frames
            hidden_dim: 32,
            ..Default::default()
        }
    }

    fn conditioning() -> Conditioning {
        NoteSpec {
            velocity: 100,
            pitch: 60,
            source: InstrumentSource::Synthetic,
            qualities: vec![],
            latent_sample: (0..16).map(|i| i as f32 / 4.0).collect(),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn output_shape() {
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = LatentGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        let z = model.generate_latents(&conditioning()).unwrap();
        assert_eq!(z.len(), cfg.num_frames());
        assert_eq!(z.dim(), cfg.latent_dim);
    }

    #[test]
    fn zero_weights_pass_the_latent_through() {
        // With all weights at zero the modulation vanishes, so every
        // frame equals the caller's latent sample.
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = LatentGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        let cond = conditioning();
        let z = model.generate_latents(&cond).unwrap();
        for frame in 0..z.len() {
            for (a, b) in z.frame(frame).iter().zip(cond.latent_sample()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let cfg = small_config();
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let model = LatentGenerator::new(&cfg, DType::F32, &dev, vb).unwrap();

        let cond = conditioning();
        let a = model.generate_latents(&cond).unwrap();
        let b = model.generate_latents(&cond).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn position_features_shape_and_range() {
        let t = position_features(25, &Device::Cpu, DType::F32).unwrap();
        assert_eq!(t.dims(), &[25, POSITION_FEATURES]);
        let vals: Vec<f32> = t.flatten_all().unwrap().to_vec1().unwrap();
        assert!(vals.iter().all(|v| v.abs() <= 1.0 + 1e-6));
    }
}
