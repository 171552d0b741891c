//! Pipeline configuration.
//!
//! The geometry matches the dataset the stage models were trained on:
//! 16 kHz mono audio at a 250 Hz frame rate (hop of 64 samples),
//! 4-second notes, so every request produces 1000 frames and
//! 64 000 samples.

use serde::{Deserialize, Serialize};

use crate::conditioning::LATENT_DIM;
use crate::{Error, Result};

/// Fixed synthesis geometry and model dimensions, shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Control frame rate in Hz. Must divide the sample rate evenly.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Note duration in seconds.
    #[serde(default = "default_note_duration_s")]
    pub note_duration_s: f64,

    /// Latent embedding width per frame.
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,

    /// Hidden width of the stage networks.
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,

    /// Synthesizer parameters.
    #[serde(default)]
    pub synth: SynthConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_rate: default_frame_rate(),
            note_duration_s: default_note_duration_s(),
            latent_dim: default_latent_dim(),
            hidden_dim: default_hidden_dim(),
            synth: SynthConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Samples per control frame.
    pub fn hop_size(&self) -> usize {
        (self.sample_rate / self.frame_rate) as usize
    }

    /// Number of control frames per note.
    pub fn num_frames(&self) -> usize {
        (self.note_duration_s * self.frame_rate as f64).round() as usize
    }

    /// Number of audio samples per note (frames × hop).
    pub fn num_samples(&self) -> usize {
        self.num_frames() * self.hop_size()
    }

    /// Verify internal consistency before any stage is built.
    pub fn verify(&self) -> Result<()> {
        if self.frame_rate == 0 || self.sample_rate % self.frame_rate != 0 {
            return Err(Error::Config(format!(
                "frame rate {} must divide sample rate {} evenly",
                self.frame_rate, self.sample_rate
            )));
        }
        if self.num_frames() == 0 {
            return Err(Error::Config(format!(
                "note duration {}s at {} Hz yields zero frames",
                self.note_duration_s, self.frame_rate
            )));
        }
        if self.latent_dim != LATENT_DIM {
            return Err(Error::Config(format!(
                "latent dim {} does not match the {LATENT_DIM}-d latent sample contract",
                self.latent_dim
            )));
        }
        self.synth.verify(self.hop_size())
    }
}

/// Harmonic-plus-noise synthesizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Number of harmonic oscillators.
    #[serde(default = "default_num_harmonics")]
    pub num_harmonics: usize,

    /// Noise filter bands. Must equal `hop_size / 2 + 1` (one-sided
    /// spectrum of a hop-length FFT).
    #[serde(default = "default_noise_bands")]
    pub noise_bands: usize,

    /// Seed for the filtered-noise source. Fixed, so synthesis of
    /// identical inputs is bit-reproducible.
    #[serde(default = "default_noise_seed")]
    pub noise_seed: u64,

    /// Loudness floor in dB; contour values live in `(floor, 0)`.
    #[serde(default = "default_loudness_floor_db")]
    pub loudness_floor_db: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            num_harmonics: default_num_harmonics(),
            noise_bands: default_noise_bands(),
            noise_seed: default_noise_seed(),
            loudness_floor_db: default_loudness_floor_db(),
        }
    }
}

impl SynthConfig {
    /// Verify that the noise filter matches the hop-length FFT.
    pub fn verify(&self, hop_size: usize) -> Result<()> {
        if self.num_harmonics == 0 {
            return Err(Error::Config("num_harmonics must be at least 1".into()));
        }
        let expected = hop_size / 2 + 1;
        if self.noise_bands != expected {
            return Err(Error::Config(format!(
                "noise_bands is {}, expected {expected} (hop {hop_size} / 2 + 1)",
                self.noise_bands
            )));
        }
        if !(self.loudness_floor_db < 0.0) {
            return Err(Error::Config(format!(
                "loudness floor must be negative, got {}",
                self.loudness_floor_db
            )));
        }
        Ok(())
    }
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_frame_rate() -> u32 {
    250
}

fn default_note_duration_s() -> f64 {
    4.0
}

fn default_latent_dim() -> usize {
    LATENT_DIM
}

fn default_hidden_dim() -> usize {
    256
}

fn default_num_harmonics() -> usize {
    60
}

fn default_noise_bands() -> usize {
    33
}

fn default_noise_seed() -> u64 {
    0x6e6f_7465
}

fn default_loudness_floor_db() -> f32 {
    -120.0
}
