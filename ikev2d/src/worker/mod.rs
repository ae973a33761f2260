//! Worker pool orchestration.
//!
//! Every long-running component of the daemon (endpoint receive and send
//! loops, session dispatchers, the timer loop, the reload watcher) and every
//! fired timer callback runs as a task on one shared [`ThreadPool`] of native
//! OS threads.
//!
//! - `submit` enqueues a closure and returns a [`TaskHandle`] that yields the
//!   closure's return value, or the panic message if it panicked.
//! - When the number of outstanding tasks (queued plus running) exceeds the
//!   configured growth threshold, one more worker thread is started, so a pool
//!   saturated by blocking loops still makes progress on short tasks.
//! - `shutdown` rejects further submissions, lets the workers drain every task
//!   already queued, then joins them.
//!
//! Shutdown joins worker threads, so it must not be called from inside a pool
//! task; a worker that finds itself in the join list is skipped with a warning.

mod handle;

pub use handle::TaskHandle;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::telemetry::{record_metric, MetricsEvent};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sizing and naming of pool threads.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Threads started up front.
    pub threads: usize,
    /// Outstanding-task count above which each submit adds a thread.
    pub growth_threshold: usize,
    /// Worker threads are named `{thread_name}-{id}`.
    pub thread_name: String,
    pub stack_size: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for PoolOptions {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            threads: config.pool_threads,
            growth_threshold: config.growth_threshold,
            thread_name: config.thread_name.clone(),
            stack_size: config.thread_stack_size,
        }
    }
}

struct PoolState {
    jobs: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    outstanding: AtomicUsize,
    next_worker_id: AtomicUsize,
    options: PoolOptions,
}

impl Shared {
    fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }
}

/// Shared pool of native worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Start a pool with `options.threads` workers (at least one).
    pub fn new(options: PoolOptions) -> Result<Self> {
        let initial = options.threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                stopping: false,
            }),
            available: Condvar::new(),
            outstanding: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            options,
        });

        let mut workers = Vec::with_capacity(initial);
        for _ in 0..initial {
            workers.push(spawn_worker(&shared)?);
        }

        info!(
            threads = initial,
            growth_threshold = shared.options.growth_threshold,
            name = %shared.options.thread_name,
            "Worker pool started"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Queue `task` for execution on some worker.
    ///
    /// Fails with [`Error::PoolClosed`] once shutdown has begun.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| panic_message(payload.as_ref()));
            // The caller may have dropped its handle; the result is then discarded.
            let _ = tx.send(outcome);
        });

        let outstanding = {
            let mut state = self.shared.state.lock();
            if state.stopping {
                return Err(Error::PoolClosed);
            }
            state.jobs.push_back(job);
            self.shared.outstanding.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.shared.available.notify_one();

        if outstanding > self.shared.options.growth_threshold {
            self.grow(outstanding);
        }

        Ok(TaskHandle::new(rx))
    }

    fn grow(&self, outstanding: usize) {
        let mut workers = self.workers.lock();
        if self.shared.is_stopping() {
            return;
        }
        match spawn_worker(&self.shared) {
            Ok(handle) => {
                workers.push(handle);
                debug!(
                    workers = workers.len(),
                    outstanding,
                    "Outstanding tasks above threshold, added a worker"
                );
                record_metric(MetricsEvent::PoolGrew {
                    workers: workers.len(),
                });
            }
            Err(e) => {
                warn!(error = %e, outstanding, "Failed to add a pool worker");
            }
        }
    }

    /// Stop accepting tasks, drain the queue and join every worker.
    ///
    /// Returns the number of threads joined. Calling it again is a no-op.
    pub fn shutdown(&self) -> usize {
        let already_stopping = {
            let mut state = self.shared.state.lock();
            std::mem::replace(&mut state.stopping, true)
        };
        self.shared.available.notify_all();

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        if already_stopping && handles.is_empty() {
            return 0;
        }

        info!(
            pending = self.shared.outstanding.load(Ordering::SeqCst),
            workers = handles.len(),
            "Shutting down worker pool"
        );

        let current = thread::current().id();
        let mut joined = 0;

        for (i, handle) in handles.into_iter().enumerate() {
            if handle.thread().id() == current {
                warn!(worker_id = i, "Pool shutdown called from a pool worker, not joining it");
                continue;
            }
            match handle.join() {
                Ok(()) => {
                    debug!(worker_id = i, "Pool worker exited cleanly");
                    joined += 1;
                }
                Err(e) => {
                    error!(worker_id = i, error = ?e, "Pool worker panicked");
                }
            }
        }

        info!(joined, "Worker pool shutdown complete");
        joined
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Tasks queued or running.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_stopping()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Workers finish what is queued and exit; joining is left to shutdown().
        self.shared.state.lock().stopping = true;
        self.shared.available.notify_all();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.worker_count())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

fn spawn_worker(shared: &Arc<Shared>) -> Result<JoinHandle<()>> {
    let id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name(format!("{}-{}", shared.options.thread_name, id))
        .stack_size(shared.options.stack_size)
        .spawn(move || worker_loop(shared, id))?;
    Ok(handle)
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    debug!(worker_id, "Pool worker started");

    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break Some(job);
                }
                if state.stopping {
                    break None;
                }
                shared.available.wait(&mut state);
            }
        };

        match job {
            Some(job) => {
                job();
                shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            }
            None => break,
        }
    }

    debug!(worker_id, "Pool worker stopped");
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
