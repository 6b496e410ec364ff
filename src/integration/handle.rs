//! Passes running on a background thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crate::control::{CancellationToken, Pass, RunControl};
use crate::error::{PipelineError, Result};

/// Poll, cancel or join a pass started with `Pipeline::spawn_*`.
#[derive(Debug)]
pub struct PassHandle<T> {
    pass: Pass,
    thread: JoinHandle<Result<T>>,
    cancel: CancellationToken,
    frames_done: Arc<AtomicU64>,
}

impl<T> PassHandle<T> {
    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn frames_done(&self) -> u64 {
        self.frames_done.load(Ordering::Relaxed)
    }

    /// Ask the pass to stop after the frame in progress.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the pass to end.
    pub fn join(self) -> Result<T> {
        self.thread
            .join()
            .unwrap_or(Err(PipelineError::WorkerPanicked))
    }
}

pub(crate) fn spawn_pass<T, F>(
    pass: Pass,
    mut control: RunControl<'static>,
    run: F,
) -> Result<PassHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(&mut RunControl<'static>) -> Result<T> + Send + 'static,
{
    let cancel = control.cancellation().clone();
    let frames_done = control.counter();
    let thread = thread::Builder::new()
        .name(format!("{pass}-pass"))
        .spawn(move || run(&mut control))
        .map_err(PipelineError::Spawn)?;
    Ok(PassHandle {
        pass,
        thread,
        cancel,
        frames_done,
    })
}
