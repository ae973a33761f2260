//! Dispatch configuration: dispatcher fan-out, queue discipline and session
//! expiry.
//!
//! These knobs decide how inbound datagrams move from the per-family receive
//! queue to sessions:
//! - how many dispatcher tasks pop each family's receive queue
//! - whether queues hand out the oldest or the newest record first
//! - how long a session lives and whether traffic extends that lifetime

use crate::session::expiry::DEFAULT_SESSION_TIMEOUT_MS;
use crate::session::ExpiryMode;
use crate::sync::QueueOrder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of dispatcher tasks per address family.
pub const DEFAULT_DISPATCHERS_PER_FAMILY: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatcher tasks popping each family's receive queue.
    ///
    /// Default: 3
    #[serde(default = "default_dispatchers_per_family")]
    pub dispatchers_per_family: usize,

    /// Order in which receive and send queues release records.
    ///
    /// `fifo` preserves arrival order per endpoint. `lifo` hands out the
    /// newest record first.
    ///
    /// Default: `fifo`
    #[serde(default)]
    pub queue_order: QueueOrder,

    /// Session lifetime in milliseconds.
    ///
    /// Default: 3000
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// `fixed`: sessions expire `session_timeout_ms` after creation.
    /// `sliding`: every datagram restarts the countdown.
    ///
    /// Default: `fixed`
    #[serde(default)]
    pub expiry_mode: ExpiryMode,
}

fn default_dispatchers_per_family() -> usize {
    DEFAULT_DISPATCHERS_PER_FAMILY
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatchers_per_family: DEFAULT_DISPATCHERS_PER_FAMILY,
            queue_order: QueueOrder::default(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            expiry_mode: ExpiryMode::default(),
        }
    }
}

impl DispatchConfig {
    /// Validate dispatch configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatchers_per_family == 0 {
            return Err("dispatch.dispatchers_per_family must be at least 1".to_string());
        }
        if self.dispatchers_per_family > 256 {
            return Err("dispatch.dispatchers_per_family is unreasonably high (> 256)".to_string());
        }
        if self.session_timeout_ms == 0 {
            return Err("dispatch.session_timeout_ms must be > 0".to_string());
        }

        if self.session_timeout_ms < 100 {
            tracing::warn!(
                timeout_ms = self.session_timeout_ms,
                "session_timeout_ms is very short, sessions may expire mid-exchange"
            );
        }
        if self.queue_order == QueueOrder::Lifo {
            tracing::warn!("queue_order = lifo: records are not dispatched in arrival order");
        }

        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}
