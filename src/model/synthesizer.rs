//! Harmonic-plus-noise synthesizer.
//!
//! A controls network maps each frame's latent vector plus the f0 and
//! loudness contours to synthesizer controls:
//!
//! - an overall amplitude in (0, 1),
//! - a softmax-normalized distribution over 60 harmonics,
//! - 33 noise-band magnitudes in (0, 1).
//!
//! Two deterministic DSP branches render the controls — a
//! phase-accumulating oscillator bank and frequency-domain filtered
//! noise — and both are scaled by the loudness contour converted from
//! dB to linear amplitude. Input contracts (equal lengths, finite
//! values, positive f0) are checked before any sample is produced.

use candle_core::{DType, Device, Tensor};
use candle_nn::{self as nn, Module, VarBuilder};

use crate::audio::harmonic::{db_to_amplitude, hz_to_midi, render_harmonics};
use crate::audio::noise::NoiseSynth;
use crate::config::PipelineConfig;
use crate::stage::{AudioBuffer, ContourPair, LatentSequence, SynthesizeAudio};
use crate::{Error, Result, Stage};

/// Synthesizer controls network plus DSP back end.
pub struct HarmonicNoiseSynth {
    in_proj: nn::Linear,
    hidden: nn::Linear,
    amp_head: nn::Linear,
    harmonic_head: nn::Linear,
    noise_head: nn::Linear,
    noise: NoiseSynth,
    num_harmonics: usize,
    noise_bands: usize,
    hop_size: usize,
    sample_rate: u32,
    loudness_floor_db: f32,
    latent_dim: usize,
    device: Device,
    dtype: DType,
}

impl HarmonicNoiseSynth {
    pub fn new(
        cfg: &PipelineConfig,
        dtype: DType,
        dev: &Device,
        vb: VarBuilder,
    ) -> Result<Self> {
        // Per frame: latent vector + scaled f0 + scaled loudness.
        let in_dim = cfg.latent_dim + 2;
        let in_proj = nn::linear(in_dim, cfg.hidden_dim, vb.pp("in_proj"))?;
        let hidden = nn::linear(cfg.hidden_dim, cfg.hidden_dim, vb.pp("hidden"))?;
        let amp_head = nn::linear(cfg.hidden_dim, 1, vb.pp("amp_head"))?;
        let harmonic_head = nn::linear(cfg.hidden_dim, cfg.synth.num_harmonics, vb.pp("harmonic_head"))?;
        let noise_head = nn::linear(cfg.hidden_dim, cfg.synth.noise_bands, vb.pp("noise_head"))?;

        Ok(Self {
            in_proj,
            hidden,
            amp_head,
            harmonic_head,
            noise_head,
            noise: NoiseSynth::new(cfg.hop_size(), cfg.synth.noise_seed),
            num_harmonics: cfg.synth.num_harmonics,
            noise_bands: cfg.synth.noise_bands,
            hop_size: cfg.hop_size(),
            sample_rate: cfg.sample_rate,
            loudness_floor_db: cfg.synth.loudness_floor_db,
            latent_dim: cfg.latent_dim,
            device: dev.clone(),
            dtype,
        })
    }

    /// Fail fast on malformed inputs before touching the DSP.
    fn check_inputs(&self, latents: &LatentSequence, contours: &ContourPair) -> Result<()> {
        contours.check()?;
        if latents.len() != contours.len() {
            return Err(Error::Synthesis(format!(
                "latent sequence has {} frames but contours have {}",
                latents.len(),
                contours.len()
            )));
        }
        if latents.dim() != self.latent_dim {
            return Err(Error::Synthesis(format!(
                "latent frames are {}-d, synthesizer expects {}-d",
                latents.dim(),
                self.latent_dim
            )));
        }
        if let Some(i) = latents.as_flat().iter().position(|v| !v.is_finite()) {
            return Err(Error::Synthesis(format!(
                "latent sequence contains a non-finite value at offset {i}"
            )));
        }
        Ok(())
    }

    /// Controls network: `[N, latent+2]` → (amplitude `[N]`,
    /// harmonic distribution `[N, K]`, noise magnitudes `[N, B]`).
    fn controls(
        &self,
        latents: &Tensor,
        f0_scaled: &Tensor,
        loudness_scaled: &Tensor,
    ) -> candle_core::Result<(Tensor, Tensor, Tensor)> {
        let x = Tensor::cat(&[latents, f0_scaled, loudness_scaled], 1)?;
        let h = x.apply(&self.in_proj)?.silu()?;
        let h = h.apply(&self.hidden)?.silu()?;

        let amp = nn::ops::sigmoid(&h.apply(&self.amp_head)?)?.squeeze(1)?;
        let distribution = nn::ops::softmax_last_dim(&h.apply(&self.harmonic_head)?)?;
        let noise_mags = nn::ops::sigmoid(&h.apply(&self.noise_head)?)?;
        Ok((amp, distribution, noise_mags))
    }
}

impl SynthesizeAudio for HarmonicNoiseSynth {
    fn synthesize_audio(
        &self,
        latents: &LatentSequence,
        contours: &ContourPair,
    ) -> Result<AudioBuffer> {
        self.check_inputs(latents, contours)?;
        let stage_err = |reason: String| Error::ModelInference {
            stage: Stage::Synthesizer,
            reason,
        };

        let n = latents.len();
        // Contours enter the network scaled to ~[0, 1].
        let f0_scaled: Vec<f32> = contours.f0_hz.iter().map(|&hz| hz_to_midi(hz) / 127.0).collect();
        let loudness_scaled: Vec<f32> = contours
            .loudness_db
            .iter()
            .map(|&db| db / self.loudness_floor_db)
            .collect();

        let z = latents.to_tensor(&self.device, self.dtype)?;
        let f0_t = Tensor::from_vec(f0_scaled, (n, 1), &self.device)?.to_dtype(self.dtype)?;
        let loud_t = Tensor::from_vec(loudness_scaled, (n, 1), &self.device)?.to_dtype(self.dtype)?;

        let (amp, distribution, noise_mags) = self
            .controls(&z, &f0_t, &loud_t)
            .map_err(|e| stage_err(e.to_string()))?;
        let amp: Vec<f32> = amp
            .to_dtype(DType::F32)
            .and_then(|t| t.to_vec1())
            .map_err(|e| stage_err(e.to_string()))?;
        let distribution: Vec<f32> = distribution
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all()?.to_vec1())
            .map_err(|e| stage_err(e.to_string()))?;
        let noise_mags: Vec<f32> = noise_mags
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all()?.to_vec1())
            .map_err(|e| stage_err(e.to_string()))?;
        debug_assert_eq!(distribution.len(), n * self.num_harmonics);
        debug_assert_eq!(noise_mags.len(), n * self.noise_bands);

        // Both branches ride the loudness contour in linear amplitude.
        let gain: Vec<f32> = contours
            .loudness_db
            .iter()
            .map(|&db| db_to_amplitude(db))
            .collect();
        let harmonic_amp: Vec<f32> = amp.iter().zip(&gain).map(|(a, g)| a * g).collect();

        let harmonic = render_harmonics(
            &contours.f0_hz,
            &harmonic_amp,
            &distribution,
            self.num_harmonics,
            self.hop_size,
            self.sample_rate,
        );
        let noise = self.noise.render(&noise_mags, &gain);

        let samples: Vec<f32> = harmonic.iter().zip(&noise).map(|(h, n)| h + n).collect();
        Ok(AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}
