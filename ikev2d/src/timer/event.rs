use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier handed out by [`super::TimerEngine::schedule`]. Never reused.
pub type EventId = u64;

pub(crate) type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// One armed timer.
pub struct TimerEvent {
    id: EventId,
    timeout: Duration,
    remaining: Duration,
    /// When `remaining` was last brought up to date.
    checkpoint: Instant,
    repeat: bool,
    fired: u32,
    callback: Callback,
}

impl TimerEvent {
    pub(crate) fn new(id: EventId, timeout: Duration, repeat: bool, callback: Callback) -> Self {
        Self {
            id,
            timeout,
            remaining: timeout,
            checkpoint: Instant::now(),
            repeat,
            fired: 0,
            callback,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn fired(&self) -> u32 {
        self.fired
    }

    /// When the event is due. Timeouts past the end of the clock's range
    /// saturate to a deadline roughly a century away.
    pub fn deadline(&self) -> Instant {
        self.checkpoint
            .checked_add(self.remaining)
            .or_else(|| self.checkpoint.checked_add(FAR_FUTURE))
            .unwrap_or(self.checkpoint)
    }

    pub(crate) fn callback(&self) -> Callback {
        Arc::clone(&self.callback)
    }

    /// Move the checkpoint to `now`. Returns `true` if the event fired, in
    /// which case a repeating event is re-armed.
    pub(crate) fn advance(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.checkpoint);
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.checkpoint = now;

        if !self.remaining.is_zero() {
            return false;
        }
        self.fired = self.fired.saturating_add(1);
        if self.repeat {
            self.remaining = self.timeout;
        }
        true
    }

    /// A one-shot event that has fired.
    pub(crate) fn is_spent(&self) -> bool {
        !self.repeat && self.fired > 0
    }
}

impl std::fmt::Debug for TimerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEvent")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("remaining", &self.remaining)
            .field("repeat", &self.repeat)
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Arc::new(|| {})
    }

    #[test]
    fn test_advance_counts_down_from_checkpoint() {
        let mut event = TimerEvent::new(1, Duration::from_millis(100), false, noop());
        let start = event.checkpoint;

        assert!(!event.advance(start + Duration::from_millis(40)));
        assert_eq!(event.remaining(), Duration::from_millis(60));

        assert!(!event.advance(start + Duration::from_millis(90)));
        assert_eq!(event.remaining(), Duration::from_millis(10));

        assert!(event.advance(start + Duration::from_millis(150)));
        assert!(event.is_spent());
    }

    #[test]
    fn test_repeating_event_rearms() {
        let mut event = TimerEvent::new(2, Duration::from_millis(10), true, noop());
        let start = event.checkpoint;

        assert!(event.advance(start + Duration::from_millis(10)));
        assert_eq!(event.remaining(), Duration::from_millis(10));
        assert_eq!(event.fired(), 1);
        assert!(!event.is_spent());
    }

    #[test]
    fn test_zero_timeout_is_due_immediately() {
        let mut event = TimerEvent::new(3, Duration::ZERO, false, noop());
        let now = event.checkpoint;
        assert!(event.advance(now));
    }

    #[test]
    fn test_unbounded_timeout_saturates_deadline() {
        let event = TimerEvent::new(4, Duration::MAX, false, noop());
        let deadline = event.deadline();
        assert!(deadline > event.checkpoint + Duration::from_secs(365 * 24 * 60 * 60));
    }
}
