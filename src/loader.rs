//! Checkpoint loading.
//!
//! The three stage models live under one checkpoint root, one named
//! subdirectory per stage, each holding a single safetensors file:
//!
//! ```text
//! <root>/z_generator/model.safetensors
//! <root>/contour_generator/model.safetensors
//! <root>/synthesizer/model.safetensors
//! ```
//!
//! Weights are mmapped once at load time and shared read-only for the
//! life of the process; nothing here is touched per request.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use crate::{Error, Result};

/// Subdirectory holding the z-stage weights.
pub const Z_GENERATOR_DIR: &str = "z_generator";
/// Subdirectory holding the contour-stage weights.
pub const CONTOUR_GENERATOR_DIR: &str = "contour_generator";
/// Subdirectory holding the synthesizer weights.
pub const SYNTHESIZER_DIR: &str = "synthesizer";
/// Weights file name within each stage subdirectory.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// A checkpoint root following the three-subdirectory convention.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    root: PathBuf,
}

impl CheckpointDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve one stage's weights file, failing if it is missing.
    pub fn weights_path(&self, stage_dir: &str) -> Result<PathBuf> {
        let path = self.root.join(stage_dir).join(WEIGHTS_FILE);
        if !path.is_file() {
            return Err(Error::WeightLoad(format!(
                "missing weights file {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Mmap one stage's weights into a `VarBuilder`.
    pub fn var_builder(
        &self,
        stage_dir: &str,
        dtype: DType,
        device: &Device,
    ) -> Result<VarBuilder<'static>> {
        let path = self.weights_path(stage_dir)?;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], dtype, device) }
            .map_err(|e| Error::WeightLoad(format!("{stage_dir}: {e}")))?;
        Ok(vb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_weights_are_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointDir::new(dir.path());
        match ckpt.weights_path(Z_GENERATOR_DIR) {
            Err(Error::WeightLoad(msg)) => {
                assert!(msg.contains(Z_GENERATOR_DIR), "message was: {msg}")
            }
            other => panic!("expected weight load error, got {other:?}"),
        }
    }
}
