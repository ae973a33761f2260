//! Cancellation notifier backed by an `eventfd` counter.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Sentinel written to a notifier to ask the waiting loop to exit.
///
/// Notifiers are created in semaphore mode, where every read yields exactly 1,
/// so the sentinel has to be 1 as well.
pub const STOP_SIGNAL: u64 = 1;

/// Creation flags for a [`Notifier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierFlags {
    /// Each read decrements the counter by one and yields 1.
    pub semaphore: bool,
    /// Reads fail with `WouldBlock` instead of blocking on a zero counter.
    pub nonblocking: bool,
}

impl NotifierFlags {
    pub const SEMAPHORE: Self = Self {
        semaphore: true,
        nonblocking: false,
    };
}

/// A pollable counter used to wake and stop blocked loops.
#[derive(Debug)]
pub struct Notifier {
    fd: OwnedFd,
}

impl Notifier {
    pub fn new(initial: u32, flags: NotifierFlags) -> io::Result<Self> {
        let mut raw_flags = libc::EFD_CLOEXEC;
        if flags.semaphore {
            raw_flags |= libc::EFD_SEMAPHORE;
        }
        if flags.nonblocking {
            raw_flags |= libc::EFD_NONBLOCK;
        }

        let fd = unsafe { libc::eventfd(initial, raw_flags) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: eventfd returned a fresh descriptor nobody else owns.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Add `value` to the counter, waking any poller watching it.
    pub fn notify(&self, value: u64) -> io::Result<()> {
        let buf = value.to_ne_bytes();
        loop {
            let n = unsafe {
                libc::write(
                    self.fd.as_raw_fd(),
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                )
            };
            if n == buf.len() as isize {
                return Ok(());
            }
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write on eventfd",
            ));
        }
    }

    /// Consume one value from the counter, blocking while it is zero.
    pub fn read(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        loop {
            let n = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n == buf.len() as isize {
                return Ok(u64::from_ne_bytes(buf));
            }
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read on eventfd",
            ));
        }
    }

    /// Consume one value and report whether it equals `expected`.
    pub fn wait(&self, expected: u64) -> io::Result<bool> {
        Ok(self.read()? == expected)
    }
}

impl AsRawFd for Notifier {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
