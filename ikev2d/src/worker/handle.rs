use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Completion handle for a task submitted to a [`super::ThreadPool`].
///
/// The result can be taken once. A panic in the task surfaces as
/// [`Error::TaskPanicked`].
#[must_use = "dropping a TaskHandle discards the task's result"]
pub struct TaskHandle<R> {
    rx: Receiver<std::result::Result<R, String>>,
}

impl<R> TaskHandle<R> {
    pub(super) fn new(rx: Receiver<std::result::Result<R, String>>) -> Self {
        Self { rx }
    }

    /// Block until the task finishes.
    pub fn wait(self) -> Result<R> {
        match self.rx.recv() {
            Ok(outcome) => outcome.map_err(Error::TaskPanicked),
            Err(_) => Err(Error::TaskLost),
        }
    }

    /// Wait up to `timeout`; `None` means the task is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome.map_err(Error::TaskPanicked)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::TaskLost)),
        }
    }

    /// Take the result if the task already finished.
    pub fn try_take(&self) -> Option<Result<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome.map_err(Error::TaskPanicked)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::TaskLost)),
        }
    }
}

impl<R> std::fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("ready", &!self.rx.is_empty())
            .finish()
    }
}
