//! Run control: external stop requests and progress reporting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::algorithm::AlgorithmId;

/// Polled once per iteration; returning `true` ends the run early.
pub trait StopSignal: Send + Sync {
    fn should_stop(&self) -> bool;
}

/// In-process stop request, shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl StopSignal for StopFlag {
    fn should_stop(&self) -> bool {
        self.is_requested()
    }
}

/// Stops when a file appears at `path`. The file is removed when seen so
/// the next run is not stopped by a stale request.
#[derive(Debug, Clone)]
pub struct StopFile {
    path: PathBuf,
}

impl StopFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StopSignal for StopFile {
    fn should_stop(&self) -> bool {
        if !self.path.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove stop file {}: {}", self.path.display(), e);
        }
        true
    }
}

/// Reported after every executed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationProgress {
    /// Current iteration (0-based).
    pub iteration: usize,
    /// Total number of iterations.
    pub total: usize,
    /// Residual error of this iteration.
    pub error: f64,
    pub algorithm: AlgorithmId,
}

/// Callback type for progress reporting.
pub type ProgressCallback = Arc<dyn Fn(&IterationProgress) + Send + Sync>;

/// Optional stop signal and progress callback for one run.
#[derive(Clone, Default)]
pub struct RunControl {
    stop: Option<Arc<dyn StopSignal>>,
    progress: Option<ProgressCallback>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop(mut self, signal: impl StopSignal + 'static) -> Self {
        self.stop = Some(Arc::new(signal));
        self
    }

    pub fn with_progress(
        mut self,
        callback: impl Fn(&IterationProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn should_stop(&self) -> bool {
        self.stop.as_ref().is_some_and(|signal| signal.should_stop())
    }

    pub fn report(&self, progress: &IterationProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("stop", &self.stop.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_stop_flag_shared_between_clones() {
        let flag = StopFlag::new();
        let control = RunControl::new().with_stop(flag.clone());
        assert!(!control.should_stop());
        flag.request();
        assert!(control.should_stop());
    }

    #[test]
    fn test_stop_file_is_consumed() {
        let path = std::env::temp_dir().join(format!("phasor_stop_{}", std::process::id()));
        let signal = StopFile::new(&path);
        assert!(!signal.should_stop());

        std::fs::write(&path, b"").unwrap();
        assert!(signal.should_stop());
        assert!(!path.exists());
        assert!(!signal.should_stop());
    }

    #[test]
    fn test_default_control_never_stops() {
        let control = RunControl::default();
        assert!(!control.should_stop());
        control.report(&IterationProgress {
            iteration: 0,
            total: 1,
            error: 0.0,
            algorithm: AlgorithmId::Er,
        });
    }

    #[test]
    fn test_progress_callback_receives_reports() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let control = RunControl::new().with_progress(move |p| sink.lock().unwrap().push(p.iteration));

        for iteration in 0..3 {
            control.report(&IterationProgress {
                iteration,
                total: 3,
                error: 1.0,
                algorithm: AlgorithmId::Hio,
            });
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }
}
