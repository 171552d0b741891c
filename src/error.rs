//! Error types for notegen-rs.

use std::fmt;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline position, attached to wrapped stage errors so a caller can
/// tell bad input apart from a mid-pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Input validation and conditioning encoding.
    Encoder,
    /// Latent sequence generation (z-stage).
    LatentGenerator,
    /// f0/loudness contour generation.
    ContourGenerator,
    /// Harmonic-plus-noise synthesis.
    Synthesizer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Encoder => "encoder",
            Stage::LatentGenerator => "latent generator",
            Stage::ContourGenerator => "contour generator",
            Stage::Synthesizer => "synthesizer",
        };
        write!(f, "{name}")
    }
}

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A raw input field violated its domain. Reported before any model
    /// runs; an invalid field fails the whole request.
    #[error("validation: {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// A generation stage failed internally (e.g. numerical instability).
    /// Never retried: the stages are deterministic functions of their
    /// inputs, so a retry without changed input cannot succeed.
    #[error("inference failed in {stage}: {reason}")]
    ModelInference { stage: Stage, reason: String },

    /// Contract violation between stage outputs: length mismatch or
    /// non-finite values. Checked before any sample is produced.
    #[error("synthesis: {0}")]
    Synthesis(String),

    /// A stage failure or boundary violation annotated with its
    /// pipeline position.
    #[error("pipeline ({stage}): {source}")]
    Pipeline {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    /// Candle tensor/model error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Model weight loading error.
    #[error("weight loading: {0}")]
    WeightLoad(String),

    /// Invalid configuration.
    #[error("config: {0}")]
    Config(String),

    /// Audio I/O error (WAV read/write).
    #[error("audio: {0}")]
    Audio(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Request manager error (channel closed, load task panicked).
    #[error("manager: {0}")]
    Manager(String),
}

impl Error {
    /// Wrap a stage failure with its pipeline position.
    pub(crate) fn at_stage(stage: Stage, source: Error) -> Self {
        Error::Pipeline {
            stage,
            source: Box::new(source),
        }
    }

    /// The pipeline position attached to this error, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Pipeline { stage, .. } | Error::ModelInference { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<hound::Error> for Error {
    fn from(error: hound::Error) -> Self {
        Error::Audio(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_names_the_field() {
        let err = Error::Validation {
            field: "velocity",
            reason: "64 is not an allowed velocity layer".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("velocity"), "message was: {msg}");
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn wrapped_error_keeps_position_and_cause() {
        let inner = Error::ModelInference {
            stage: Stage::ContourGenerator,
            reason: "non-finite output".into(),
        };
        let err = Error::at_stage(Stage::ContourGenerator, inner);
        assert_eq!(err.stage(), Some(Stage::ContourGenerator));
        let msg = err.to_string();
        assert!(msg.contains("contour generator"), "message was: {msg}");
        assert!(msg.contains("non-finite output"), "message was: {msg}");
    }
}
