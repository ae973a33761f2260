//! Timer engine.
//!
//! A single loop (run as one pool task) keeps a list of [`TimerEvent`]s sorted
//! by deadline and sleeps on a condition variable until the nearest one is due.
//! Scheduling an event earlier than the one currently awaited sets a
//! fall-through flag and wakes the loop so it re-plans its sleep.
//!
//! On each wakeup every event's remaining time is reduced by the time elapsed
//! since its own checkpoint. Events that reach zero have their callbacks
//! submitted to the worker pool, never run on the timer thread. One-shot
//! events are then dropped and repeating events are re-armed with their full
//! timeout.

mod event;

pub use event::{EventId, TimerEvent};

use crate::error::Result;
use crate::telemetry::{record_metric, MetricsEvent};
use crate::worker::{panic_message, ThreadPool};
use event::Callback;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Repeating events never re-arm faster than this.
pub const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

struct TimerState {
    /// Sorted by deadline, nearest first.
    events: Vec<TimerEvent>,
    /// Deadline the loop is currently sleeping towards.
    awaiting: Option<Instant>,
    fall_through: bool,
    stopped: bool,
}

pub struct TimerEngine {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    next_id: AtomicU64,
    pool: Arc<ThreadPool>,
}

impl TimerEngine {
    /// Create an engine whose callbacks run on `pool`. Nothing fires until
    /// [`TimerEngine::run`] is started.
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self {
            state: Mutex::new(TimerState {
                events: Vec::new(),
                awaiting: None,
                fall_through: false,
                stopped: false,
            }),
            wakeup: Condvar::new(),
            next_id: AtomicU64::new(1),
            pool,
        }
    }

    /// Arm a timer that invokes `callback` after `timeout`, and again every
    /// `timeout` when `repeat` is set.
    pub fn schedule<F>(&self, timeout: Duration, repeat: bool, callback: F) -> EventId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timeout = if repeat {
            timeout.max(MIN_REPEAT_INTERVAL)
        } else {
            timeout
        };
        let event = TimerEvent::new(id, timeout, repeat, Arc::new(callback) as Callback);
        let deadline = event.deadline();

        {
            let mut state = self.state.lock();
            let pos = state.events.partition_point(|e| e.deadline() <= deadline);
            state.events.insert(pos, event);
            if matches!(state.awaiting, Some(awaiting) if deadline < awaiting) {
                state.fall_through = true;
            }
        }
        self.wakeup.notify_one();

        trace!(event_id = id, timeout_ms = timeout.as_millis() as u64, repeat, "Timer scheduled");
        id
    }

    /// Remove a pending event. Returns `false` if it already fired (one-shot)
    /// or never existed.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut state = self.state.lock();
        match state.events.iter().position(|e| e.id() == id) {
            Some(pos) => {
                state.events.remove(pos);
                trace!(event_id = id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Run the timer loop until [`TimerEngine::shutdown`] is called.
    pub fn run(&self) -> Result<()> {
        info!("Timer loop started");
        let mut state = self.state.lock();

        loop {
            if state.stopped {
                break;
            }

            let nearest = state.events.first().map(TimerEvent::deadline);
            let deadline = match nearest {
                Some(deadline) => deadline,
                None => {
                    self.wakeup.wait(&mut state);
                    continue;
                }
            };

            state.awaiting = Some(deadline);
            while !state.stopped && !state.fall_through {
                if self.wakeup.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.awaiting = None;
            state.fall_through = false;

            if state.stopped {
                break;
            }

            let due = evaluate(&mut state, Instant::now());
            if !due.is_empty() {
                MutexGuard::unlocked(&mut state, || self.dispatch(due));
            }
        }

        info!(pending = state.events.len(), "Timer loop stopped");
        Ok(())
    }

    fn dispatch(&self, due: Vec<(EventId, Callback)>) {
        for (id, callback) in due {
            record_metric(MetricsEvent::TimerFired);
            match self.pool.submit(move || run_callback(id, &callback)) {
                Ok(_handle) => trace!(event_id = id, "Timer callback submitted"),
                Err(e) => debug!(event_id = id, error = %e, "Timer callback dropped"),
            }
        }
    }

    /// Stop the loop. Pending events are discarded with the engine.
    pub fn shutdown(&self) {
        self.state.lock().stopped = true;
        self.wakeup.notify_all();
        debug!("Timer engine stop requested");
    }

    /// Number of armed events.
    pub fn pending(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.state.lock().events.iter().any(|e| e.id() == id)
    }

    /// How many times a still-armed event has fired.
    pub fn fired_count(&self, id: EventId) -> Option<u32> {
        self.state
            .lock()
            .events
            .iter()
            .find(|e| e.id() == id)
            .map(TimerEvent::fired)
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimerEngine")
            .field("pending", &state.events.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}

/// Invoke one fired callback. A panic is logged and swallowed; returns
/// whether the callback completed.
fn run_callback(id: EventId, callback: &Callback) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                event_id = id,
                panic = %panic_message(payload.as_ref()),
                "Timer callback panicked"
            );
            false
        }
    }
}

/// Charge elapsed time to every event and collect the callbacks now due.
fn evaluate(state: &mut TimerState, now: Instant) -> Vec<(EventId, Callback)> {
    let mut due = Vec::new();

    for event in state.events.iter_mut() {
        if event.advance(now) {
            due.push((event.id(), event.callback()));
        }
    }

    state.events.retain(|e| !e.is_spent());
    state.events.sort_by_key(TimerEvent::remaining);
    due
}

#[cfg(test)]
mod tests;
