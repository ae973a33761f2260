//! Configuration reload watcher.
//!
//! A long-running pool task parks on its own [`Poller`] watching two
//! notifiers: one raised when a reload is requested (SIGHUP in the binary),
//! one raised to stop the watcher. Reload requests that pile up while a
//! reload is running collapse into a single reload.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::reactor::{Notifier, NotifierFlags, Poller, Readiness, Trigger, STOP_SIGNAL};

#[derive(Debug)]
pub struct ReloadWatcher {
    /// Counter mode: one read consumes every pending request.
    reload: Notifier,
    stop: Notifier,
    reloads: AtomicU64,
}

impl ReloadWatcher {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            reload: Notifier::new(0, NotifierFlags::default())?,
            stop: Notifier::new(0, NotifierFlags::SEMAPHORE)?,
            reloads: AtomicU64::new(0),
        })
    }

    /// Ask the watcher to run its callback. Safe from any thread.
    pub fn request_reload(&self) -> io::Result<()> {
        self.reload.notify(1)
    }

    pub fn stop(&self) -> io::Result<()> {
        self.stop.notify(STOP_SIGNAL)
    }

    /// Number of reloads performed so far.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Acquire)
    }

    /// Invoke `on_reload` for every batch of reload requests until stopped.
    pub fn run<F>(&self, mut on_reload: F) -> Result<()>
    where
        F: FnMut(),
    {
        let poller = Poller::new("reload-watcher")?;
        let reload_fd = self.reload.as_raw_fd();
        let stop_fd = self.stop.as_raw_fd();
        poller.add(reload_fd, Trigger::Level)?;
        poller.add(stop_fd, Trigger::Level)?;

        debug!("Reload watcher started");

        loop {
            match poller.wait()? {
                Readiness::Readable(fd) if fd == stop_fd => {
                    if self.stop.wait(STOP_SIGNAL)? {
                        break;
                    }
                }
                Readiness::Readable(fd) if fd == reload_fd => {
                    let requests = self.reload.read()?;
                    info!(requests, "Reload requested");
                    on_reload();
                    self.reloads.fetch_add(1, Ordering::AcqRel);
                }
                Readiness::Readable(fd) | Readiness::Closed(fd) => {
                    warn!(fd, "Reload watcher polled an unknown descriptor");
                }
                Readiness::Idle => {}
            }
        }

        debug!(reloads = self.reload_count(), "Reload watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_reload_invokes_callback() {
        let watcher = Arc::new(ReloadWatcher::new().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let runner = {
            let watcher = Arc::clone(&watcher);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                watcher.run(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
            })
        };

        watcher.request_reload().unwrap();
        assert!(wait_for(Duration::from_secs(2), || calls.load(Ordering::SeqCst) == 1));

        watcher.request_reload().unwrap();
        assert!(wait_for(Duration::from_secs(2), || calls.load(Ordering::SeqCst) == 2));
        assert_eq!(watcher.reload_count(), 2);

        watcher.stop().unwrap();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn test_pending_requests_coalesce() {
        let watcher = ReloadWatcher::new().unwrap();
        for _ in 0..5 {
            watcher.request_reload().unwrap();
        }

        watcher.stop().unwrap();

        let mut calls = 0;
        watcher.run(|| calls += 1).unwrap();
        assert!(calls <= 1);
        assert_eq!(watcher.reload_count(), calls);
    }

    #[test]
    fn test_stop_before_run() {
        let watcher = ReloadWatcher::new().unwrap();
        watcher.stop().unwrap();

        let mut calls = 0;
        watcher.run(|| calls += 1).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(watcher.reload_count(), 0);
    }
}
