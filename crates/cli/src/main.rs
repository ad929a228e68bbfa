use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use identityguard_core::detection::domain::face_detector::FaceDetector;
use identityguard_core::detection::infrastructure::model_resolver;
use identityguard_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use identityguard_core::liveness::domain::liveness_config::LivenessConfig;
use identityguard_core::pipeline::infrastructure::threaded_batch_executor::{
    Components, ThreadedBatchExecutor,
};
use identityguard_core::shared::constants::{
    BLAZEFACE_MODEL_NAME, DEFAULT_FACE_CONFIDENCE, MOVEMENT_THRESHOLD_PX, VIDEO_EXTENSIONS,
};
use identityguard_core::video::domain::video_reader::VideoReader;
use identityguard_core::video::infrastructure::ffmpeg_reader::FfmpegReader;

/// Video liveness check: prints one JSON verdict per input video.
#[derive(Parser)]
#[command(name = "identityguard")]
struct Cli {
    /// Input video files.
    #[arg(required = true)]
    videos: Vec<PathBuf>,

    /// BlazeFace ONNX model to use instead of the cached/bundled one.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Where to download the model from when it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_FACE_CONFIDENCE)]
    confidence: f64,

    /// Face movement (pixels) that must be exceeded to count as alive.
    #[arg(long, default_value_t = MOVEMENT_THRESHOLD_PX)]
    threshold: f64,

    /// Only search upright frames; skip the ±90° retries.
    #[arg(long)]
    no_rotation_fallback: bool,

    /// Analyze at most this many frames per video.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Videos checked in parallel (default: available cores).
    #[arg(long)]
    jobs: Option<usize>,

    /// Log per-stage timings for each video.
    #[arg(long)]
    timings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    warn_about_inputs(&cli.videos);

    let model_path = resolve_model(&cli)?;
    let confidence = cli.confidence;
    let factory = move || -> Result<Components, Box<dyn std::error::Error + Send + Sync>> {
        let detector = OnnxBlazefaceDetector::new(&model_path, confidence)
            .map_err(|e| e.to_string())?;
        Ok((
            Box::new(FfmpegReader::new()) as Box<dyn VideoReader>,
            Box::new(detector) as Box<dyn FaceDetector>,
        ))
    };

    let executor = match cli.jobs {
        Some(jobs) => ThreadedBatchExecutor::new(jobs),
        None => ThreadedBatchExecutor::default(),
    };
    let results = executor
        .with_config(build_config(&cli))
        .with_timings(cli.timings)
        .execute(&cli.videos, factory);

    for (_, verdict) in &results {
        println!("{}", serde_json::to_string(verdict)?);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> LivenessConfig {
    LivenessConfig {
        movement_threshold: cli.threshold,
        rotation_fallback: !cli.no_rotation_fallback,
        max_frames: cli.max_frames,
    }
}

fn resolve_model(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.model {
        if !path.is_file() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }
        return Ok(path.clone());
    }

    log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
    let bundled = bundled_model_dir();
    let path = model_resolver::resolve(
        BLAZEFACE_MODEL_NAME,
        cli.model_url.as_deref(),
        bundled.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    Ok(path)
}

/// `models/` next to the executable, if the executable path is known.
fn bundled_model_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if !cli.threshold.is_finite() || cli.threshold < 0.0 {
        return Err(format!(
            "Threshold must be a non-negative number of pixels, got {}",
            cli.threshold
        )
        .into());
    }
    if cli.max_frames == Some(0) {
        return Err("Max frames must be at least 1".into());
    }
    if cli.jobs == Some(0) {
        return Err("Jobs must be at least 1".into());
    }
    if cli.model.is_some() && cli.model_url.is_some() {
        return Err("--model and --model-url are mutually exclusive".into());
    }
    Ok(())
}

/// Missing files and odd extensions still get a verdict; this only warns.
fn warn_about_inputs(videos: &[PathBuf]) {
    for video in videos {
        if !video.exists() {
            log::warn!("Input file not found: {}", video.display());
        } else if !has_video_extension(video) {
            log::warn!("{} does not look like a video file", video.display());
        }
    }
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
