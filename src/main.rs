use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use vitalyn_triage::classifier::parse_probabilities;
use vitalyn_triage::{
    AnalysisRequest, EngineConfig, FaceInput, FrameObservation, PrecomputedClassifier,
    TriageEngine, VitalsReading,
};

/// Fuse vitals, face and voice signals into a triage decision
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vitals reading as a JSON file
    #[arg(long)]
    vitals: PathBuf,

    /// Vitals model output as comma separated class probabilities (e.g. "0.05,0.95")
    #[arg(long)]
    vitals_probs: Option<String>,

    /// Voice clip (WAV)
    #[arg(long)]
    voice: Option<PathBuf>,

    /// Stress model output as comma separated class probabilities; heuristic when absent
    #[arg(long)]
    voice_probs: Option<String>,

    /// Per-frame face observations as a JSON array
    #[arg(long, conflicts_with = "face_image")]
    face_frames: Option<PathBuf>,

    /// Face still image (PNG / JPEG). The CLI has no landmark detector, so the face
    /// is reported as unavailable; use --face-frames for scored face input
    #[arg(long)]
    face_image: Option<PathBuf>,

    /// Config file (defaults to ~/.vitalyn/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Patient transcript for the clinical note
    #[arg(long)]
    transcript: Option<String>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {} file {}", what, path.display()))
}

fn precomputed(probs: &str) -> Result<Arc<PrecomputedClassifier>> {
    let probabilities = parse_probabilities(probs).map_err(anyhow::Error::msg)?;
    Ok(Arc::new(PrecomputedClassifier::from_probabilities(probabilities)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr, so stdout stays machine readable)
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };

    let vitals_json = std::fs::read_to_string(&args.vitals)
        .with_context(|| format!("Failed to read vitals file {}", args.vitals.display()))?;
    let vitals = VitalsReading::from_json(&vitals_json).context("Invalid vitals reading")?;

    let mut builder = TriageEngine::builder().config(config);
    match &args.vitals_probs {
        Some(probs) => builder = builder.vitals_classifier(precomputed(probs)?),
        None => warn!("No vitals model output given; vitals will be reported as unavailable"),
    }
    if let Some(probs) = &args.voice_probs {
        builder = builder.stress_classifier(precomputed(probs)?);
    }
    let engine = builder.build();

    let mut request = AnalysisRequest::new(vitals);
    if let Some(path) = &args.face_frames {
        let frames: Vec<FrameObservation> = serde_json::from_slice(&read_file(path, "face frames")?)
            .context("Failed to parse face frames")?;
        info!("Loaded {} face observations", frames.len());
        request = request.with_face(FaceInput::Observations(frames));
    } else if let Some(path) = &args.face_image {
        warn!("No landmark detector is available to the CLI; face will be reported as unavailable");
        request = request.with_face(FaceInput::Video(read_file(path, "face image")?));
    }
    if let Some(path) = &args.voice {
        request = request.with_voice(read_file(path, "voice")?);
    }
    if let Some(transcript) = &args.transcript {
        request = request.with_transcript(transcript.clone());
    }

    let report = engine.analyze(request).await?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .context("Failed to serialize report")?;
    println!("{}", output);

    Ok(())
}
