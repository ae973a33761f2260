//! Readiness primitives built directly on Linux `epoll` and `eventfd`.
//!
//! Every blocking loop in the daemon (endpoint receive loops, the reload
//! watcher) parks on a [`Poller`] that watches its working descriptor together
//! with a [`Notifier`]. Writing the stop sentinel to the notifier makes the
//! notifier readable and wakes the loop, which is how components are cancelled
//! without closing descriptors out from under a blocked syscall.
//!
//! Both types own their kernel descriptors through [`std::os::fd::OwnedFd`], so
//! descriptors are closed exactly once, when the owner is dropped.

pub mod notifier;
pub mod poller;

pub use notifier::{Notifier, NotifierFlags, STOP_SIGNAL};
pub use poller::{Poller, Readiness, Trigger};

#[cfg(test)]
mod tests;
