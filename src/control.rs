//! Cooperative cancellation and progress reporting shared by both passes.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Analyze,
    Export,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pass::Analyze => "analyze",
            Pass::Export => "export",
        })
    }
}

/// How a pass ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    /// Stopped between frames on request; results cover the frames done.
    Cancelled,
    /// The frame source kept timing out.
    Stalled,
    /// Stopped by an error; only seen on the partial report an error carries.
    Failed,
}

/// Shared stop flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot handed to the progress callback after every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub pass: Pass,
    pub frames_done: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
    /// Estimated from the mean frame time so far; `None` without a total.
    pub remaining: Option<Duration>,
}

impl Progress {
    fn estimate(pass: Pass, frames_done: u64, total: Option<u64>, elapsed: Duration) -> Self {
        let remaining = total.and_then(|total| {
            if frames_done == 0 {
                return None;
            }
            let left = total.saturating_sub(frames_done);
            let per_frame = elapsed.as_secs_f64() / frames_done as f64;
            Some(Duration::from_secs_f64(per_frame * left as f64))
        });
        Self {
            pass,
            frames_done,
            total,
            elapsed,
            remaining,
        }
    }

    pub fn fraction(&self) -> Option<f64> {
        self.total
            .filter(|&t| t > 0)
            .map(|t| (self.frames_done as f64 / t as f64).min(1.0))
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&Progress) + Send + 'a>;

/// Per-run controls: a cancellation token, an optional progress callback
/// and a frame counter readable from other threads.
pub struct RunControl<'a> {
    cancel: CancellationToken,
    on_progress: Option<ProgressFn<'a>>,
    frames_done: Arc<AtomicU64>,
}

impl Default for RunControl<'_> {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            on_progress: None,
            frames_done: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<'a> RunControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&Progress) + Send + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn frames_done(&self) -> u64 {
        self.frames_done.load(Ordering::Relaxed)
    }

    pub(crate) fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_done)
    }

    /// Start a fresh count for a new pass.
    pub(crate) fn start(&mut self, pass: Pass, total: Option<u64>) -> Stopwatch {
        self.frames_done.store(0, Ordering::Relaxed);
        tracing::info!(%pass, total = ?total, "pass started");
        Stopwatch {
            pass,
            total,
            started: Instant::now(),
        }
    }

    pub(crate) fn report(&mut self, watch: &Stopwatch, frames_done: u64) {
        self.frames_done.store(frames_done, Ordering::Relaxed);
        let Some(callback) = self.on_progress.as_mut() else {
            return;
        };
        let progress = Progress::estimate(watch.pass, frames_done, watch.total, watch.started.elapsed());
        if panic::catch_unwind(AssertUnwindSafe(|| callback(&progress))).is_err() {
            tracing::warn!(pass = %watch.pass, "progress callback panicked; disabling it");
            self.on_progress = None;
        }
    }
}

impl fmt::Debug for RunControl<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunControl")
            .field("cancelled", &self.is_cancelled())
            .field("has_progress_callback", &self.on_progress.is_some())
            .field("frames_done", &self.frames_done())
            .finish()
    }
}

/// Timing of one pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stopwatch {
    pass: Pass,
    total: Option<u64>,
    started: Instant,
}

impl Stopwatch {
    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_eta_from_mean_frame_time() {
        let p = Progress::estimate(Pass::Analyze, 4, Some(10), Duration::from_secs(8));
        assert_eq!(p.remaining, Some(Duration::from_secs(12)));
        assert_eq!(p.fraction(), Some(0.4));
        let unknown = Progress::estimate(Pass::Analyze, 4, None, Duration::from_secs(8));
        assert_eq!(unknown.remaining, None);
        let fresh = Progress::estimate(Pass::Export, 0, Some(10), Duration::ZERO);
        assert_eq!(fresh.remaining, None);
    }

    #[test]
    fn test_token_is_shared() {
        let token = CancellationToken::new();
        let control = RunControl::new().with_cancellation(token.clone());
        assert!(!control.is_cancelled());
        token.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_report_updates_counter_and_calls_back() {
        let seen = Mutex::new(Vec::new());
        let mut control = RunControl::new().on_progress(|p| seen.lock().unwrap().push(p.frames_done));
        let watch = control.start(Pass::Export, Some(2));
        control.report(&watch, 1);
        control.report(&watch, 2);
        assert_eq!(control.frames_done(), 2);
        drop(control);
        assert_eq!(seen.into_inner().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_panicking_callback_is_disabled() {
        let mut control = RunControl::new().on_progress(|_| panic!("ui gone"));
        let watch = control.start(Pass::Analyze, None);
        control.report(&watch, 1);
        control.report(&watch, 2);
        assert_eq!(control.frames_done(), 2);
    }
}
