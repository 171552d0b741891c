//! End-to-end synthesis pipeline.
//!
//! Orchestrates the staged generation for one note request:
//!
//! 1. Validate the raw request and encode the conditioning vector
//! 2. z-stage: conditioning → latent sequence
//! 3. Contour stage: conditioning + latents → f0/loudness contours
//! 4. Synthesizer: latents + contours → waveform
//!
//! The chain is a hard data dependency — each stage consumes the full
//! output of the previous one, so there is no valid reordering or
//! overlap. The orchestrator checks the frame-count contract at every
//! stage boundary before invoking the next stage and wraps stage
//! failures with their pipeline position; validation failures are
//! reported as-is, before any model runs. No partial audio is ever
//! returned.
//!
//! A loaded pipeline is immutable and `Send + Sync`: independent
//! requests may run concurrently against the same instance, sharing
//! the read-only weights.

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use crate::conditioning::NoteSpec;
use crate::config::PipelineConfig;
use crate::loader::{
    CheckpointDir, CONTOUR_GENERATOR_DIR, SYNTHESIZER_DIR, Z_GENERATOR_DIR,
};
use crate::model::{ContourGenerator, HarmonicNoiseSynth, LatentGenerator};
use crate::stage::{
    GenerateContours, GenerateLatents, SynthesizeAudio, SynthesizedNote,
};
use crate::{Error, Result, Stage};

/// The staged synthesis pipeline.
pub struct Pipeline {
    latent_stage: Box<dyn GenerateLatents>,
    contour_stage: Box<dyn GenerateContours>,
    synth_stage: Box<dyn SynthesizeAudio>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Assemble a pipeline from explicit stage implementations.
    pub fn new(
        config: PipelineConfig,
        latent_stage: Box<dyn GenerateLatents>,
        contour_stage: Box<dyn GenerateContours>,
        synth_stage: Box<dyn SynthesizeAudio>,
    ) -> Result<Self> {
        config.verify()?;
        Ok(Self {
            latent_stage,
            contour_stage,
            synth_stage,
            config,
        })
    }

    /// Load all three stage models from a checkpoint root with the
    /// default configuration.
    pub fn load(root: impl AsRef<Path>, device: &Device, dtype: DType) -> Result<Self> {
        Self::load_with_config(PipelineConfig::default(), root, device, dtype)
    }

    /// Load all three stage models from a checkpoint root.
    pub fn load_with_config(
        config: PipelineConfig,
        root: impl AsRef<Path>,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        let ckpt = CheckpointDir::new(root.as_ref());
        tracing::info!(root = %ckpt.root().display(), "loading stage checkpoints");
        let vb_z = ckpt.var_builder(Z_GENERATOR_DIR, dtype, device)?;
        let vb_contour = ckpt.var_builder(CONTOUR_GENERATOR_DIR, dtype, device)?;
        let vb_synth = ckpt.var_builder(SYNTHESIZER_DIR, dtype, device)?;
        Self::from_var_builders(config, dtype, device, vb_z, vb_contour, vb_synth)
    }

    /// Build the stage models from pre-made `VarBuilder`s (checkpoint
    /// loading and tests share this path).
    pub fn from_var_builders(
        config: PipelineConfig,
        dtype: DType,
        device: &Device,
        vb_z: VarBuilder,
        vb_contour: VarBuilder,
        vb_synth: VarBuilder,
    ) -> Result<Self> {
        let latent = LatentGenerator::new(&config, dtype, device, vb_z)?;
        let contour = ContourGenerator::new(&config, dtype, device, vb_contour)?;
        let synth = HarmonicNoiseSynth::new(&config, dtype, device, vb_synth)?;
        Self::new(
            config,
            Box::new(latent),
            Box::new(contour),
            Box::new(synth),
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Synthesize one note. The single entry point: raw request in,
    /// finished audio (plus intermediate artifacts) out.
    pub fn synthesize(&self, spec: &NoteSpec) -> Result<SynthesizedNote> {
        // Fail fast on bad input — no model is invoked past this point
        // for an invalid request.
        let conditioning = spec.encode()?;
        tracing::debug!(
            pitch = spec.pitch,
            velocity = spec.velocity,
            qualities = spec.qualities.len(),
            "encoded note request"
        );

        let num_frames = self.config.num_frames();

        let latents = self
            .latent_stage
            .generate_latents(&conditioning)
            .map_err(|e| Error::at_stage(Stage::LatentGenerator, e))?;
        self.check_frames(Stage::LatentGenerator, latents.len(), num_frames)?;
        if latents.dim() != self.config.latent_dim {
            return Err(Error::at_stage(
                Stage::LatentGenerator,
                Error::Synthesis(format!(
                    "latent frames are {}-d, contract requires {}-d",
                    latents.dim(),
                    self.config.latent_dim
                )),
            ));
        }

        let contours = self
            .contour_stage
            .generate_contours(&conditioning, &latents)
            .map_err(|e| Error::at_stage(Stage::ContourGenerator, e))?;
        self.check_frames(Stage::ContourGenerator, contours.len(), num_frames)?;
        contours
            .check()
            .map_err(|e| Error::at_stage(Stage::ContourGenerator, e))?;

        let audio = self
            .synth_stage
            .synthesize_audio(&latents, &contours)
            .map_err(|e| Error::at_stage(Stage::Synthesizer, e))?;
        let expected_samples = self.config.num_samples();
        if audio.samples.len() != expected_samples {
            return Err(Error::at_stage(
                Stage::Synthesizer,
                Error::Synthesis(format!(
                    "produced {} samples, contract requires {expected_samples}",
                    audio.samples.len()
                )),
            ));
        }

        tracing::debug!(
            frames = num_frames,
            samples = audio.samples.len(),
            "note synthesized"
        );
        Ok(SynthesizedNote {
            audio,
            latents,
            contours,
        })
    }

    /// Uniform boundary check: a stage must hand over exactly the
    /// pipeline-wide frame count.
    fn check_frames(&self, stage: Stage, got: usize, expected: usize) -> Result<()> {
        if got != expected {
            return Err(Error::at_stage(
                stage,
                Error::Synthesis(format!(
                    "produced {got} frames, contract requires {expected}"
                )),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::{Conditioning, InstrumentSource};
    use crate::stage::{AudioBuffer, ContourPair, LatentSequence};

    fn spec() -> NoteSpec {
        NoteSpec {
            velocity: 75,
            pitch: 60,
            source: InstrumentSource::Acoustic,
            qualities: vec![],
            latent_sample: vec![0.0; 16],
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            note_duration_s: 0.1,
            hidden_dim: 32,
            ..Default::default()
        }
    }

    fn zeros_pipeline(cfg: PipelineConfig) -> Pipeline {
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        Pipeline::from_var_builders(
            cfg,
            DType::F32,
            &dev,
            vb.pp("z"),
            vb.pp("contour"),
            vb.pp("synth"),
        )
        .unwrap()
    }

    /// z-stage double that reports an internal failure.
    struct FailingLatents;
    impl GenerateLatents for FailingLatents {
        fn generate_latents(&self, _: &Conditioning) -> Result<LatentSequence> {
            Err(Error::ModelInference {
                stage: Stage::LatentGenerator,
                reason: "numerical instability".into(),
            })
        }
    }

    /// z-stage double that hands over the wrong frame count.
    struct ShortLatents;
    impl GenerateLatents for ShortLatents {
        fn generate_latents(&self, _: &Conditioning) -> Result<LatentSequence> {
            LatentSequence::new(vec![0.0; 5 * 16], 16)
        }
    }

    struct UnreachableContours;
    impl GenerateContours for UnreachableContours {
        fn generate_contours(
            &self,
            _: &Conditioning,
            _: &LatentSequence,
        ) -> Result<ContourPair> {
            panic!("contour stage must not run after an upstream failure");
        }
    }

    struct UnreachableSynth;
    impl SynthesizeAudio for UnreachableSynth {
        fn synthesize_audio(
            &self,
            _: &LatentSequence,
            _: &ContourPair,
        ) -> Result<AudioBuffer> {
            panic!("synthesizer must not run after an upstream failure");
        }
    }

    #[test]
    fn invalid_input_runs_no_stage() {
        let pipeline = Pipeline::new(
            small_config(),
            Box::new(FailingLatents),
            Box::new(UnreachableContours),
            Box::new(UnreachableSynth),
        )
        .unwrap();

        let mut bad = spec();
        bad.velocity = 64;
        // FailingLatents would error (and the doubles would panic) if
        // any stage ran; validation must short-circuit first.
        match pipeline.synthesize(&bad) {
            Err(Error::Validation { field, .. }) => assert_eq!(field, "velocity"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn stage_failure_is_wrapped_with_position() {
        let pipeline = Pipeline::new(
            small_config(),
            Box::new(FailingLatents),
            Box::new(UnreachableContours),
            Box::new(UnreachableSynth),
        )
        .unwrap();

        let err = pipeline.synthesize(&spec()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::LatentGenerator));
        assert!(matches!(err, Error::Pipeline { .. }));
    }

    #[test]
    fn boundary_mismatch_names_the_stage() {
        let pipeline = Pipeline::new(
            small_config(),
            Box::new(ShortLatents),
            Box::new(UnreachableContours),
            Box::new(UnreachableSynth),
        )
        .unwrap();

        let err = pipeline.synthesize(&spec()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::LatentGenerator));
        let msg = err.to_string();
        assert!(msg.contains("frames"), "message was: {msg}");
    }

    #[test]
    fn full_chain_produces_contract_shapes() {
        let cfg = small_config();
        let n = cfg.num_frames();
        let samples = cfg.num_samples();
        let pipeline = zeros_pipeline(cfg);

        let note = pipeline.synthesize(&spec()).unwrap();
        assert_eq!(note.latents.len(), n);
        assert_eq!(note.contours.len(), n);
        assert_eq!(note.audio.samples.len(), samples);
    }

    #[test]
    fn bad_config_rejected_at_assembly() {
        let cfg = PipelineConfig {
            frame_rate: 300,
            ..Default::default()
        };
        let dev = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &dev);
        let result = Pipeline::from_var_builders(
            cfg,
            DType::F32,
            &dev,
            vb.pp("z"),
            vb.pp("contour"),
            vb.pp("synth"),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
