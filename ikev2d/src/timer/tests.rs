//! Timer loop behaviour against a live worker pool.

use super::*;
use crate::worker::{PoolOptions, TaskHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

struct Harness {
    pool: Arc<ThreadPool>,
    engine: Arc<TimerEngine>,
    loop_handle: TaskHandle<Result<()>>,
}

impl Harness {
    fn start() -> Self {
        let pool = Arc::new(
            ThreadPool::new(PoolOptions {
                threads: 4,
                growth_threshold: 50,
                thread_name: "timer-test".to_string(),
                stack_size: 256 * 1024,
            })
            .unwrap(),
        );
        let engine = Arc::new(TimerEngine::new(Arc::clone(&pool)));
        let loop_handle = {
            let engine = Arc::clone(&engine);
            pool.submit(move || engine.run()).unwrap()
        };
        Self {
            pool,
            engine,
            loop_handle,
        }
    }

    fn stop(self) {
        self.engine.shutdown();
        self.loop_handle.wait().unwrap().unwrap();
        self.pool.shutdown();
    }
}

fn wait_for(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_one_shot_fires_after_timeout() {
    let harness = Harness::start();
    let fired_at = Arc::new(Mutex::new(None));

    let start = Instant::now();
    let id = {
        let fired_at = Arc::clone(&fired_at);
        harness
            .engine
            .schedule(Duration::from_millis(60), false, move || {
                *fired_at.lock() = Some(Instant::now());
            })
    };

    assert!(wait_for(|| fired_at.lock().is_some(), Duration::from_secs(2)));
    let elapsed = fired_at.lock().unwrap() - start;
    assert!(elapsed >= Duration::from_millis(60), "fired early: {:?}", elapsed);
    assert!(!harness.engine.is_scheduled(id));
    assert_eq!(harness.engine.pending(), 0);

    harness.stop();
}

#[test]
fn test_events_fire_in_deadline_order() {
    let harness = Harness::start();
    let order = Arc::new(Mutex::new(Vec::new()));

    for (label, ms) in [("slow", 150u64), ("fast", 30), ("mid", 90)] {
        let order = Arc::clone(&order);
        harness
            .engine
            .schedule(Duration::from_millis(ms), false, move || order.lock().push(label));
    }

    assert!(wait_for(|| order.lock().len() == 3, Duration::from_secs(2)));
    assert_eq!(*order.lock(), vec!["fast", "mid", "slow"]);

    harness.stop();
}

#[test]
fn test_earlier_event_interrupts_long_wait() {
    let harness = Harness::start();
    let fired = Arc::new(AtomicUsize::new(0));

    harness
        .engine
        .schedule(Duration::from_secs(30), false, || {});
    // Let the loop settle into its 30 s sleep.
    std::thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(40), false, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(wait_for(
        || fired.load(Ordering::SeqCst) == 1,
        Duration::from_secs(2)
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(harness.engine.pending(), 1);

    harness.stop();
}

#[test]
fn test_cancelled_event_never_fires() {
    let harness = Harness::start();
    let fired = Arc::new(AtomicUsize::new(0));

    let id = {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(50), false, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert!(harness.engine.cancel(id));
    assert!(!harness.engine.cancel(id));

    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    harness.stop();
}

#[test]
fn test_cancel_unknown_or_fired_event_returns_false() {
    let harness = Harness::start();
    assert!(!harness.engine.cancel(9_999));

    let fired = Arc::new(AtomicUsize::new(0));
    let id = {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(10), false, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert!(wait_for(
        || fired.load(Ordering::SeqCst) == 1,
        Duration::from_secs(2)
    ));
    assert!(!harness.engine.cancel(id));

    harness.stop();
}

#[test]
fn test_repeating_event_fires_until_cancelled() {
    let harness = Harness::start();
    let fired = Arc::new(AtomicUsize::new(0));

    let id = {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(20), true, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    assert!(wait_for(
        || fired.load(Ordering::SeqCst) >= 3,
        Duration::from_secs(3)
    ));
    assert!(harness.engine.fired_count(id).unwrap() >= 3);
    assert!(harness.engine.cancel(id));

    let settled = fired.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(80));
    // At most one callback may already have been in flight on the pool.
    assert!(fired.load(Ordering::SeqCst) <= settled + 1);

    harness.stop();
}

#[test]
fn test_callbacks_run_on_pool_threads() {
    let harness = Harness::start();
    let thread_name = Arc::new(Mutex::new(None));

    {
        let thread_name = Arc::clone(&thread_name);
        harness.engine.schedule(Duration::ZERO, false, move || {
            *thread_name.lock() = std::thread::current().name().map(str::to_string);
        });
    }

    assert!(wait_for(|| thread_name.lock().is_some(), Duration::from_secs(2)));
    let name = thread_name.lock().clone().unwrap();
    assert!(name.starts_with("timer-test-"), "ran on {}", name);

    harness.stop();
}

#[test]
fn test_shutdown_before_run_returns_immediately() {
    let pool = Arc::new(ThreadPool::new(PoolOptions::default()).unwrap());
    let engine = TimerEngine::new(Arc::clone(&pool));
    engine.schedule(Duration::from_secs(10), false, || {});
    engine.shutdown();

    let start = Instant::now();
    engine.run().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    pool.shutdown();
}

#[test]
fn test_unbounded_timeout_stays_pending() {
    let harness = Harness::start();
    let id = harness.engine.schedule(Duration::MAX, false, || {});
    assert!(harness.engine.is_scheduled(id));

    // An earlier event still fires ahead of it.
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(10), false, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert!(wait_for(|| fired.load(Ordering::SeqCst) == 1, Duration::from_secs(2)));

    assert!(harness.engine.cancel(id));
    assert_eq!(harness.engine.pending(), 0);
    harness.stop();
}

#[test]
fn test_panicking_callback_is_contained() {
    let callback: Callback = Arc::new(|| panic!("expiry blew up"));
    assert!(!run_callback(7, &callback));
    let callback: Callback = Arc::new(|| {});
    assert!(run_callback(8, &callback));

    let harness = Harness::start();
    harness
        .engine
        .schedule(Duration::ZERO, false, || panic!("expiry blew up"));

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        harness.engine.schedule(Duration::from_millis(20), true, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert!(wait_for(|| fired.load(Ordering::SeqCst) >= 2, Duration::from_secs(2)));
    assert_eq!(harness.pool.worker_count(), 4);

    harness.stop();
}
