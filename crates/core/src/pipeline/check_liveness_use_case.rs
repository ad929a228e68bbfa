use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::rotation_fallback::RotationFallbackDetector;
use crate::liveness::domain::liveness_config::LivenessConfig;
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::liveness::domain::movement_tracker::MovementTracker;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::bounding_box::BoundingBox;
use crate::video::domain::video_reader::{OpenedVideo, VideoReader};

/// Called after every frame with `(frames_read, total_frames)`. Returning
/// `false` cancels the run.
pub type ProgressCallback = Box<dyn Fn(usize, usize) -> bool + Send>;

/// Why a run ended in an `Error` verdict. The `Display` text becomes the
/// verdict's message.
#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("Could not open video {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },
    #[error("Video decoding failed at frame {frame}: {reason}")]
    Decode { frame: usize, reason: String },
    #[error("Face detection failed at frame {frame}: {reason}")]
    Detect { frame: usize, reason: String },
    #[error("Cancelled")]
    Cancelled,
}

/// Decides whether the subject of a video clip is a live, moving person.
///
/// Every frame is converted to grayscale and searched for faces (with the
/// ±90° rotation fallback). The center of the largest face is tracked across
/// frames; the clip counts as alive once any displacement between two
/// consecutive face sightings exceeds `movement_threshold`.
///
/// Any decode or detection failure aborts the run with an `Error` verdict.
/// Nothing is concluded from the frames read before the failure.
pub struct CheckLivenessUseCase {
    reader: Box<dyn VideoReader>,
    detector: RotationFallbackDetector,
    config: LivenessConfig,
    on_progress: Option<ProgressCallback>,
    cancelled: Arc<AtomicBool>,
    logger: Box<dyn PipelineLogger>,
}

impl CheckLivenessUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        detector: Box<dyn FaceDetector>,
        config: LivenessConfig,
        on_progress: Option<ProgressCallback>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        let detector = RotationFallbackDetector::new(detector).with_fallback(config.rotation_fallback);
        Self {
            reader,
            detector,
            config,
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
            logger: Box::new(NullPipelineLogger),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.set_logger(logger);
        self
    }

    /// Swaps the logger, e.g. to start fresh statistics for the next video.
    pub fn set_logger(&mut self, logger: Box<dyn PipelineLogger>) {
        self.logger = logger;
    }

    /// Runs one liveness check. The reader is closed exactly once before
    /// this returns, whatever the outcome.
    pub fn execute(&mut self, video_path: &Path) -> LivenessVerdict {
        let verdict = match self.run(video_path) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::error!("Liveness check of {} failed: {e}", video_path.display());
                self.logger.summary();
                return LivenessVerdict::error(e.to_string());
            }
        };

        match &verdict {
            LivenessVerdict::Fail { message, debug } => {
                log::warn!("{}: {message} {debug}", video_path.display());
            }
            LivenessVerdict::Success {
                message,
                max_movement_pixels,
                ..
            } => {
                log::info!(
                    "{}: {message} (max movement {max_movement_pixels:.1}px)",
                    video_path.display()
                );
            }
            LivenessVerdict::Error { .. } => {}
        }
        self.logger.summary();
        verdict
    }

    fn run(&mut self, video_path: &Path) -> Result<LivenessVerdict, LivenessError> {
        let Self {
            reader,
            detector,
            config,
            on_progress,
            cancelled,
            logger,
        } = self;

        let mut video =
            OpenedVideo::open(&mut **reader, video_path).map_err(|e| LivenessError::Open {
                path: video_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let metadata = video.metadata();
        if metadata.rotation != 0 {
            log::debug!(
                "{} carries {}° rotation metadata; frames are analyzed as decoded",
                video_path.display(),
                metadata.rotation
            );
        }
        let total = match config.max_frames {
            Some(cap) if metadata.total_frames > 0 => cap.min(metadata.total_frames),
            _ => metadata.total_frames,
        };
        logger.info(&format!(
            "Checking liveness of {} ({}x{}, {} frames)",
            video_path.display(),
            metadata.width,
            metadata.height,
            total
        ));

        let mut tracker = MovementTracker::new(config.movement_threshold);
        let mut frames = video.frames();

        loop {
            if config
                .max_frames
                .is_some_and(|cap| tracker.frames_read() >= cap)
            {
                break;
            }
            if cancelled.load(Ordering::Relaxed) {
                return Err(LivenessError::Cancelled);
            }

            let started = Instant::now();
            let Some(next) = frames.next() else {
                break;
            };
            let position = tracker.frames_read();
            let frame = next.map_err(|e| LivenessError::Decode {
                frame: position,
                reason: e.to_string(),
            })?;
            let gray = frame.to_grayscale().map_err(|e| LivenessError::Decode {
                frame: position,
                reason: e.to_string(),
            })?;
            logger.timing("decode", elapsed_ms(started));

            let started = Instant::now();
            let (_, boxes) = detector
                .detect_oriented(&gray)
                .map_err(|e| LivenessError::Detect {
                    frame: position,
                    reason: e.to_string(),
                })?;
            logger.timing("detect", elapsed_ms(started));
            logger.metric("faces", boxes.len() as f64);

            let center = BoundingBox::largest(&boxes).map(BoundingBox::center);
            if let Some(distance) = tracker.record_frame(center) {
                logger.metric("displacement_px", distance);
            }

            let current = tracker.frames_read();
            logger.progress(current, total);
            if let Some(callback) = on_progress.as_ref() {
                if !callback(current, total) {
                    return Err(LivenessError::Cancelled);
                }
            }
        }

        Ok(tracker.into_verdict())
    }
}

/// Runs a single liveness check with a fresh use case.
pub fn check_liveness(
    video_path: &Path,
    reader: Box<dyn VideoReader>,
    detector: Box<dyn FaceDetector>,
    config: LivenessConfig,
) -> LivenessVerdict {
    CheckLivenessUseCase::new(reader, detector, config, None, None).execute(video_path)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
