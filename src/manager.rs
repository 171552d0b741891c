//! Synthesis manager — keeps the pipeline resident and queues requests.
//!
//! The manager owns one loaded [`Pipeline`] and processes submitted
//! note requests sequentially on a dedicated blocking thread. The
//! handle is cheap to clone, so independent callers can submit
//! concurrently; they all share the same read-only weights.
//!
//! # Example
//!
//! ```no_run
//! use notegen_rs::manager::{ManagerConfig, SynthesisManager};
//! use notegen_rs::conditioning::{InstrumentSource, NoteSpec};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SynthesisManager::start(ManagerConfig::new("checkpoints"))
//!         .await
//!         .unwrap();
//!     let note = manager
//!         .synthesize(NoteSpec {
//!             velocity: 100,
//!             pitch: 60,
//!             source: InstrumentSource::Acoustic,
//!             qualities: vec![],
//!             latent_sample: vec![0.0; 16],
//!         })
//!         .await
//!         .unwrap();
//!     assert_eq!(note.audio.sample_rate, 16_000);
//! }
//! ```

use std::path::PathBuf;

use candle_core::{DType, Device};
use tokio::sync::{mpsc, oneshot};

use crate::conditioning::NoteSpec;
use crate::pipeline::Pipeline;
use crate::stage::SynthesizedNote;
use crate::{Error, Result};

/// Configuration for the synthesis manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Checkpoint root with the three stage subdirectories.
    pub checkpoint_root: PathBuf,

    /// Device for the stage models.
    pub device: Device,

    /// Data type for model weights and activations.
    pub dtype: DType,
}

impl ManagerConfig {
    pub fn new(checkpoint_root: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_root: checkpoint_root.into(),
            device: Device::Cpu,
            dtype: DType::F32,
        }
    }
}

/// A submitted synthesis request.
struct PendingRequest {
    spec: NoteSpec,
    reply: oneshot::Sender<Result<SynthesizedNote>>,
}

/// Handle for submitting requests to a running manager.
#[derive(Clone)]
pub struct SynthesisManager {
    tx: mpsc::Sender<PendingRequest>,
}

impl SynthesisManager {
    /// Load the pipeline and start the manager loop.
    ///
    /// Loading runs on a blocking task (it mmaps weights from disk);
    /// an error here means the manager never starts.
    pub async fn start(config: ManagerConfig) -> Result<Self> {
        let pipeline = tokio::task::spawn_blocking(move || {
            tracing::info!(root = %config.checkpoint_root.display(), "loading synthesis pipeline");
            Pipeline::load(&config.checkpoint_root, &config.device, config.dtype)
        })
        .await
        .map_err(|join_error| Error::Manager(format!("pipeline load task panicked: {join_error}")))??;

        Ok(Self::with_pipeline(pipeline))
    }

    /// Start the manager loop around an already-assembled pipeline
    /// (custom stages, tests).
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        let (tx, rx) = mpsc::channel::<PendingRequest>(64);
        tokio::task::spawn_blocking(move || run_manager(pipeline, rx));
        Self { tx }
    }

    /// Submit a request and wait for the result.
    pub async fn synthesize(&self, spec: NoteSpec) -> Result<SynthesizedNote> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                spec,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Manager("manager has shut down".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Manager("manager dropped reply channel".into()))?
    }
}

/// The manager loop — runs on a dedicated blocking thread until every
/// handle is dropped.
fn run_manager(pipeline: Pipeline, mut rx: mpsc::Receiver<PendingRequest>) {
    while let Some(request) = rx.blocking_recv() {
        let result = pipeline.synthesize(&request.spec);
        // Ignore send errors — the caller may have given up waiting.
        let _ = request.reply.send(result);
    }
    tracing::info!("synthesis manager shut down");
}
