//! Bounded waits on collaborator calls.
//!
//! Model calls run on their own thread and the caller waits on a channel
//! with `recv_timeout`. A call that overruns is abandoned: its thread
//! finishes in the background and the result is dropped.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    TimedOut(Duration),
    /// The call panicked or its thread could not be started.
    Aborted,
}

/// A call running in the background.
pub struct Pending<T> {
    rx: Receiver<T>,
    started: Instant,
    timeout: Option<Duration>,
    spawn_failed: bool,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(name: &str, timeout: Option<Duration>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let spawned = thread::Builder::new().name(name.to_owned()).spawn(move || {
            let _ = tx.send(f());
        });
        Self {
            rx,
            started: Instant::now(),
            timeout,
            spawn_failed: spawned.is_err(),
        }
    }

    /// Wait for the result; the timeout counts from when the call started.
    pub fn wait(self) -> Result<T, WaitError> {
        if self.spawn_failed {
            return Err(WaitError::Aborted);
        }
        match self.timeout {
            None => self.rx.recv().map_err(|_| WaitError::Aborted),
            Some(timeout) => {
                let left = timeout.saturating_sub(self.started.elapsed());
                self.rx.recv_timeout(left).map_err(|err| match err {
                    RecvTimeoutError::Timeout => WaitError::TimedOut(timeout),
                    RecvTimeoutError::Disconnected => WaitError::Aborted,
                })
            }
        }
    }
}

/// Run `f` and wait for it. Without a timeout the call runs inline, with
/// panics still reported as [`WaitError::Aborted`].
pub fn call_bounded<T, F>(name: &str, timeout: Option<Duration>, f: F) -> Result<T, WaitError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match timeout {
        None => panic::catch_unwind(AssertUnwindSafe(f)).map_err(|_| WaitError::Aborted),
        Some(_) => Pending::spawn(name, timeout, f).wait(),
    }
}
