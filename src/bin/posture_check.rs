//! posture_check - evaluate posture rules locally and print the result as JSON

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use posture_kernel::analysis::{analyze_landmarks, PostureService, DEFAULT_EXERCISE};
use posture_kernel::config::ServiceConfig;
use posture_kernel::ingest::open_video;
use posture_kernel::LandmarkSet;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Exercise context (squat or desk).
    #[arg(long, default_value = DEFAULT_EXERCISE)]
    exercise: String,
    /// Landmark JSON keyed by joint name; skips detection entirely.
    #[arg(long, conflicts_with_all = ["image", "video"])]
    landmarks: Option<PathBuf>,
    /// Encoded image (JPEG/PNG) to run through the configured detector.
    #[arg(long, conflicts_with = "video")]
    image: Option<PathBuf>,
    /// Encoded video to analyze frame by frame.
    #[arg(long)]
    video: Option<PathBuf>,
    /// Detector backend override (defaults to POSTURE_BACKEND / config).
    #[arg(long)]
    backend: Option<String>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let output = if let Some(path) = &args.landmarks {
        let landmarks = LandmarkSet::load(path)?;
        serde_json::to_value(analyze_landmarks(&landmarks, &args.exercise))?
    } else {
        let mut config = ServiceConfig::load()?;
        if let Some(backend) = &args.backend {
            config.detector.backend = backend.clone();
        }
        let service = PostureService::new(config.detector.registry()?);

        if let Some(path) = &args.image {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow!("failed to read image {}: {}", path.display(), e))?;
            serde_json::to_value(service.analyze_image_bytes(&bytes, &args.exercise)?)?
        } else if let Some(path) = &args.video {
            let bytes = std::fs::read(path)
                .map_err(|e| anyhow!("failed to read video {}: {}", path.display(), e))?;
            let mut source = open_video(&bytes)?;
            serde_json::to_value(service.analyze_video_source(source.as_mut(), &args.exercise)?)?
        } else {
            return Err(anyhow!("one of --landmarks, --image or --video is required"));
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);
    Ok(())
}
