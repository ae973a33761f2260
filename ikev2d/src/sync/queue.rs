//! Blocking packet queue with close semantics.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Which end `pop` takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Oldest element first.
    #[default]
    Fifo,
    /// Newest element first.
    Lifo,
}

impl std::fmt::Display for QueueOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueOrder::Fifo => write!(f, "fifo"),
            QueueOrder::Lifo => write!(f, "lifo"),
        }
    }
}

impl std::str::FromStr for QueueOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(QueueOrder::Fifo),
            "lifo" => Ok(QueueOrder::Lifo),
            _ => Err(format!("Invalid queue order: {}", s)),
        }
    }
}

struct State<T> {
    items: VecDeque<Arc<T>>,
    closed: bool,
}

/// Unbounded MPMC queue of shared records.
///
/// `pop` blocks while the queue is open and empty. Once closed, pushes are
/// dropped, remaining items can still be drained, and `pop` on an empty queue
/// returns `None` immediately. Closing is idempotent.
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    order: QueueOrder,
}

impl<T> BlockingQueue<T> {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            order,
        }
    }

    /// Append an item and wake one waiting consumer.
    ///
    /// Returns `false` without enqueuing when the queue is closed.
    pub fn push(&self, item: Arc<T>) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.items.push_back(item);
        }
        self.available.notify_one();
        true
    }

    /// Take the next item, blocking until one arrives or the queue closes.
    pub fn pop(&self) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.closed {
            self.available.wait(&mut state);
        }
        self.take(&mut state)
    }

    /// Take the next item if one is immediately available.
    pub fn try_pop(&self) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        self.take(&mut state)
    }

    fn take(&self, state: &mut State<T>) -> Option<Arc<T>> {
        match self.order {
            QueueOrder::Fifo => state.items.pop_front(),
            QueueOrder::Lifo => state.items.pop_back(),
        }
    }

    /// Stop accepting items and release every blocked consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new(QueueOrder::default())
    }
}

impl<T> std::fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BlockingQueue")
            .field("order", &self.order)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
