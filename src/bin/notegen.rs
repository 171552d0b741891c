//! notegen CLI — synthesize a single note from musical controls.
//!
//! Loads the three stage checkpoints and renders one note to a WAV
//! file. Prints a one-line JSON summary to stdout on success:
//!
//! ```json
//! {"path":"note.wav","duration_s":4.0,"sample_rate":16000,"frames":1000}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use std::path::PathBuf;

use clap::Parser;
use notegen_rs::audio::{peak_normalize, write_wav};
use notegen_rs::conditioning::{InstrumentSource, NoteSpec, Quality, LATENT_DIM};
use notegen_rs::Pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "notegen",
    about = "Synthesize a note from pitch, velocity, source, qualities, and a latent timbre vector",
    long_about = "Renders a single 4-second note at 16 kHz through the staged\n\
                  generation pipeline. Checkpoints are read from --checkpoints,\n\
                  which must contain the z_generator/, contour_generator/, and\n\
                  synthesizer/ subdirectories."
)]
struct Args {
    /// MIDI pitch (9-120).
    #[arg(long, short = 'p')]
    pitch: u8,

    /// Velocity layer: 25, 50, 75, 100, or 127.
    #[arg(long, short = 'v', default_value_t = 100)]
    velocity: u8,

    /// Instrument source family: acoustic, electronic, or synthetic.
    #[arg(long, short = 's', default_value = "acoustic")]
    source: String,

    /// Quality tag (repeatable), e.g. --quality bright --quality percussive.
    #[arg(long = "quality", short = 'q')]
    qualities: Vec<String>,

    /// 16 comma-separated latent values in [-7, 7]. Defaults to all zeros.
    #[arg(long)]
    latent: Option<String>,

    /// Checkpoint root directory.
    #[arg(long)]
    checkpoints: PathBuf,

    /// Output WAV path.
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Peak-normalize the waveform before writing.
    #[arg(long)]
    normalize: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let source: InstrumentSource = args.source.parse()?;
    let qualities = args
        .qualities
        .iter()
        .map(|q| q.parse::<Quality>())
        .collect::<notegen_rs::Result<Vec<_>>>()?;
    let latent_sample = match &args.latent {
        Some(text) => parse_latent(text)?,
        None => vec![0.0; LATENT_DIM],
    };

    let spec = NoteSpec {
        velocity: args.velocity,
        pitch: args.pitch,
        source,
        qualities,
        latent_sample,
    };

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let device = candle_core::Device::Cpu;
    let dtype = candle_core::DType::F32;

    tracing::info!("loading pipeline from {}", args.checkpoints.display());
    let pipeline = Pipeline::load(&args.checkpoints, &device, dtype)
        .map_err(|e| anyhow::anyhow!("failed to load pipeline: {e}"))?;

    tracing::info!(pitch = spec.pitch, velocity = spec.velocity, "synthesizing");
    let note = pipeline
        .synthesize(&spec)
        .map_err(|e| anyhow::anyhow!("synthesis failed: {e}"))?;

    let mut samples = note.audio.samples;
    if args.normalize {
        peak_normalize(&mut samples);
    }
    write_wav(&args.output, &samples, note.audio.sample_rate)
        .map_err(|e| anyhow::anyhow!("failed to write audio: {e}"))?;

    // Machine-readable summary for the caller.
    println!(
        r#"{{"path":"{path}","duration_s":{duration},"sample_rate":{sr},"frames":{frames}}}"#,
        path = args.output.display(),
        duration = samples.len() as f64 / note.audio.sample_rate as f64,
        sr = note.audio.sample_rate,
        frames = note.contours.len(),
    );

    Ok(())
}

/// Parse "0.1,-0.5,..." into exactly [`LATENT_DIM`] values. Range
/// checking happens in request validation, not here.
fn parse_latent(text: &str) -> anyhow::Result<Vec<f32>> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("bad latent value: {e}"))?;
    if values.len() != LATENT_DIM {
        anyhow::bail!(
            "expected {LATENT_DIM} comma-separated latent values, got {}",
            values.len()
        );
    }
    Ok(values)
}
