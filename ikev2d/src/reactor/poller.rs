//! Readiness multiplexer over a set of descriptors.

use parking_lot::Mutex;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How a registered descriptor reports readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Reported on every wait while data is pending.
    Level,
    /// Reported once per transition to readable; the owner must drain until
    /// `WouldBlock` before waiting again.
    Edge,
}

/// Outcome of a single [`Poller::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A watched descriptor has input pending.
    Readable(RawFd),
    /// The descriptor reported an error or hang-up and has been removed from
    /// the watch set. The poller does not close it; its owner does.
    Closed(RawFd),
    /// Nothing usable: the wait timed out, was interrupted, or woke for a
    /// descriptor no longer being watched.
    Idle,
}

/// An `epoll` instance plus the set of descriptors registered on it.
///
/// `wait` hands back at most one ready descriptor per call. Registration and
/// removal may happen from any thread while another thread waits.
pub struct Poller {
    epoll: OwnedFd,
    label: String,
    watched: Mutex<Vec<RawFd>>,
}

impl Poller {
    /// Create a new multiplexer. `label` only appears in log output.
    pub fn new(label: impl Into<String>) -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 returned a fresh descriptor nobody else owns.
        let epoll = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self {
            epoll,
            label: label.into(),
            watched: Mutex::new(Vec::new()),
        })
    }

    /// Start watching `fd` for readability.
    pub fn add(&self, fd: RawFd, trigger: Trigger) -> io::Result<()> {
        let mut events = libc::EPOLLIN as u32;
        if trigger == Trigger::Edge {
            events |= libc::EPOLLET as u32;
        }
        let mut event = libc::epoll_event {
            events,
            u64: fd as u64,
        };

        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        self.watched.lock().push(fd);
        debug!(poller = %self.label, fd, ?trigger, "Descriptor registered");
        Ok(())
    }

    /// Stop watching `fd`. The descriptor itself stays open.
    pub fn remove(&self, fd: RawFd) -> io::Result<()> {
        self.watched.lock().retain(|&watched| watched != fd);

        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let rc = unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, &mut event)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!(poller = %self.label, fd, "Descriptor deregistered");
        Ok(())
    }

    /// Block until one watched descriptor becomes readable.
    pub fn wait(&self) -> io::Result<Readiness> {
        self.wait_timeout(None)
    }

    /// Like [`Poller::wait`], giving up after `timeout` with [`Readiness::Idle`].
    pub fn wait_timeout(&self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let timeout_ms = timeout_millis(timeout);
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let n = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), &mut event, 1, timeout_ms) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::Idle);
            }
            return Err(err);
        }
        if n == 0 {
            return Ok(Readiness::Idle);
        }

        let flags = event.events;
        let fd = event.u64 as RawFd;

        let broken = flags & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0;
        if broken || flags & libc::EPOLLIN as u32 == 0 {
            warn!(poller = %self.label, fd, flags, "Descriptor errored or hung up, dropping it");
            if let Err(e) = self.remove(fd) {
                debug!(poller = %self.label, fd, error = %e, "Deregistering broken descriptor failed");
            }
            return Ok(Readiness::Closed(fd));
        }

        if self.watched.lock().contains(&fd) {
            trace!(poller = %self.label, fd, "Descriptor readable");
            Ok(Readiness::Readable(fd))
        } else {
            Ok(Readiness::Idle)
        }
    }

    /// Descriptors currently registered.
    pub fn watched(&self) -> Vec<RawFd> {
        self.watched.lock().clone()
    }
}

/// `epoll_wait` timeout: `-1` blocks, sub-millisecond waits round up to 1 ms.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32,
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll.as_raw_fd()
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("label", &self.label)
            .field("epoll", &self.epoll.as_raw_fd())
            .field("watched", &*self.watched.lock())
            .finish()
    }
}
