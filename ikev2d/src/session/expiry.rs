use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Default lifetime of a session without renewal.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 3000;

/// When a session's expiry timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryMode {
    /// Once, when the session is created. Traffic does not extend it.
    #[default]
    Fixed,
    /// On creation and again on every datagram.
    Sliding,
}

impl std::fmt::Display for ExpiryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryMode::Fixed => write!(f, "fixed"),
            ExpiryMode::Sliding => write!(f, "sliding"),
        }
    }
}

impl std::str::FromStr for ExpiryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(ExpiryMode::Fixed),
            "sliding" => Ok(ExpiryMode::Sliding),
            _ => Err(format!("Invalid expiry mode: {}", s)),
        }
    }
}

/// Session timeout and mode, adjustable at runtime by a config reload.
#[derive(Debug)]
pub struct ExpiryPolicy {
    timeout_ms: AtomicU64,
    sliding: AtomicBool,
}

impl ExpiryPolicy {
    pub fn new(timeout: Duration, mode: ExpiryMode) -> Self {
        Self {
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            sliding: AtomicBool::new(mode == ExpiryMode::Sliding),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn mode(&self) -> ExpiryMode {
        if self.sliding.load(Ordering::Relaxed) {
            ExpiryMode::Sliding
        } else {
            ExpiryMode::Fixed
        }
    }

    /// Applies to timers armed from now on; armed timers keep their deadline.
    pub fn update(&self, timeout: Duration, mode: ExpiryMode) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
        self.sliding
            .store(mode == ExpiryMode::Sliding, Ordering::Relaxed);
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            ExpiryMode::default(),
        )
    }
}
