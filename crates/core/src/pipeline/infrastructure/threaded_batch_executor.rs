use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::detection::domain::face_detector::FaceDetector;
use crate::liveness::domain::liveness_config::LivenessConfig;
use crate::liveness::domain::liveness_verdict::LivenessVerdict;
use crate::pipeline::check_liveness_use_case::CheckLivenessUseCase;
use crate::pipeline::pipeline_logger::StdoutPipelineLogger;
use crate::video::domain::video_reader::VideoReader;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Reader and detector for one worker.
pub type Components = (Box<dyn VideoReader>, Box<dyn FaceDetector>);

/// Checks many videos at once, one worker thread per slot.
///
/// Layout: `paths → job channel → N workers → result channel → ordered output`
///
/// Each worker asks the factory for its own reader and detector the first
/// time it picks up a job and keeps them for later jobs. Nothing is shared
/// between workers, and each video is still analyzed frame by frame on a
/// single thread.
pub struct ThreadedBatchExecutor {
    workers: usize,
    config: LivenessConfig,
    cancelled: Arc<AtomicBool>,
    timings: bool,
}

impl ThreadedBatchExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            config: LivenessConfig::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            timings: false,
        }
    }

    pub fn with_config(mut self, config: LivenessConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared flag; setting it turns every unfinished check into an
    /// `Error` verdict.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Log per-stage timings and a summary for every video.
    pub fn with_timings(mut self, timings: bool) -> Self {
        self.timings = timings;
        self
    }

    /// Returns one verdict per path, in input order.
    ///
    /// A factory failure becomes the `Error` verdict of the path that
    /// triggered it; the worker retries the factory on its next job.
    pub fn execute<F>(&self, paths: &[PathBuf], factory: F) -> Vec<(PathBuf, LivenessVerdict)>
    where
        F: Fn() -> Result<Components, SendError> + Sync,
    {
        if paths.is_empty() {
            return Vec::new();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, PathBuf)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, LivenessVerdict)>();

        for job in paths.iter().cloned().enumerate() {
            // Receiver is alive until the scope below ends
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let workers = self.workers.min(paths.len());
        log::debug!("Checking {} videos on {workers} worker(s)", paths.len());

        std::thread::scope(|scope| {
            for worker_id in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let factory = &factory;
                scope.spawn(move || {
                    let mut use_case: Option<CheckLivenessUseCase> = None;
                    for (index, path) in job_rx {
                        let verdict = self.check_one(worker_id, &mut use_case, &path, factory);
                        if result_tx.send((index, verdict)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut verdicts: Vec<Option<LivenessVerdict>> = vec![None; paths.len()];
        for (index, verdict) in result_rx {
            verdicts[index] = Some(verdict);
        }

        paths
            .iter()
            .cloned()
            .zip(verdicts)
            .map(|(path, verdict)| {
                let verdict =
                    verdict.unwrap_or_else(|| LivenessVerdict::error("No verdict produced"));
                (path, verdict)
            })
            .collect()
    }

    fn check_one<F>(
        &self,
        worker_id: usize,
        slot: &mut Option<CheckLivenessUseCase>,
        path: &Path,
        factory: &F,
    ) -> LivenessVerdict
    where
        F: Fn() -> Result<Components, SendError>,
    {
        if slot.is_none() {
            match factory() {
                Ok((reader, detector)) => {
                    *slot = Some(CheckLivenessUseCase::new(
                        reader,
                        detector,
                        self.config.clone(),
                        None,
                        Some(self.cancelled.clone()),
                    ));
                }
                Err(e) => {
                    log::error!("Worker {worker_id}: could not set up analysis: {e}");
                    return LivenessVerdict::error(format!("Could not set up analysis: {e}"));
                }
            }
        }
        let Some(use_case) = slot.as_mut() else {
            return LivenessVerdict::error("Could not set up analysis");
        };
        if self.timings {
            use_case.set_logger(Box::new(StdoutPipelineLogger::default()));
        }

        match catch_unwind(AssertUnwindSafe(|| use_case.execute(path))) {
            Ok(verdict) => verdict,
            Err(_) => {
                // Components may be left inconsistent; rebuild on the next job
                *slot = None;
                log::error!("Worker {worker_id} panicked while checking {}", path.display());
                LivenessVerdict::error(format!("Analysis of {} panicked", path.display()))
            }
        }
    }
}

impl Default for ThreadedBatchExecutor {
    fn default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}
