//! Worker pool behaviour: results, panics, growth and draining shutdown.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

fn small_pool(threads: usize, growth_threshold: usize) -> ThreadPool {
    ThreadPool::new(PoolOptions {
        threads,
        growth_threshold,
        thread_name: "test-pool".to_string(),
        stack_size: 256 * 1024,
    })
    .unwrap()
}

#[test]
fn test_submit_returns_task_result() {
    let pool = small_pool(2, 50);
    let handle = pool.submit(|| 6 * 7).unwrap();
    assert_eq!(handle.wait().unwrap(), 42);
    pool.shutdown();
}

#[test]
fn test_panicking_task_reports_error_and_pool_survives() {
    let pool = small_pool(1, 50);
    let handle = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
    match handle.wait() {
        Err(Error::TaskPanicked(msg)) => assert!(msg.contains("boom")),
        other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
    }

    // The single worker is still alive.
    assert_eq!(pool.submit(|| 1).unwrap().wait().unwrap(), 1);
    pool.shutdown();
}

#[test]
fn test_submit_after_shutdown_is_rejected() {
    let pool = small_pool(1, 50);
    pool.shutdown();
    assert!(pool.is_shut_down());
    assert!(matches!(pool.submit(|| ()), Err(Error::PoolClosed)));
}

#[test]
fn test_shutdown_drains_queued_tasks() {
    let pool = small_pool(1, 1_000);
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let completed = Arc::clone(&completed);
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(2));
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();

    pool.shutdown();
    assert_eq!(completed.load(Ordering::SeqCst), 20);
    for handle in handles {
        assert!(handle.wait().is_ok());
    }
}

#[test]
fn test_shutdown_is_idempotent() {
    let pool = small_pool(2, 50);
    assert_eq!(pool.shutdown(), 2);
    assert_eq!(pool.shutdown(), 0);
}

#[test]
fn test_pool_grows_when_outstanding_exceeds_threshold() {
    let pool = small_pool(1, 1);
    let (release_tx, release_rx) = crossbeam_channel::unbounded::<()>();

    // The first task blocks the only worker; the second pushes outstanding
    // over the threshold and must get a thread of its own.
    let blocker = {
        let release_rx = release_rx.clone();
        pool.submit(move || release_rx.recv().is_ok()).unwrap()
    };
    let quick = pool.submit(|| "ran").unwrap();

    assert_eq!(
        quick.wait_timeout(Duration::from_secs(2)).unwrap().unwrap(),
        "ran"
    );
    assert!(pool.worker_count() >= 2);

    release_tx.send(()).unwrap();
    assert!(blocker.wait().unwrap());
    pool.shutdown();
}

#[test]
fn test_wait_timeout_reports_running_task() {
    let pool = small_pool(1, 50);
    let (tx, rx) = mpsc::channel::<()>();
    let handle = pool.submit(move || rx.recv().is_ok()).unwrap();

    assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());
    assert!(handle.try_take().is_none());

    tx.send(()).unwrap();
    assert!(handle.wait_timeout(Duration::from_secs(2)).unwrap().unwrap());
    pool.shutdown();
}

#[test]
fn test_outstanding_returns_to_zero() {
    let pool = small_pool(2, 50);
    let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i).unwrap()).collect();
    let sum: i32 = handles.into_iter().map(|h| h.wait().unwrap()).sum();
    assert_eq!(sum, 45);

    pool.shutdown();
    assert_eq!(pool.outstanding(), 0);
}
