//! Session dispatch.
//!
//! Each address family has one [`SessionManager`], shared by several
//! dispatcher tasks. A dispatcher pops inbound records, finds or creates the
//! [`Session`] for the record's peer, hands the payload to the configured
//! [`SessionHandler`] and queues whatever the handler returns for sending.
//!
//! A newly created session arms a one-shot expiry timer that removes it from
//! the table. With [`ExpiryMode::Fixed`] the timer is armed once at creation;
//! with [`ExpiryMode::Sliding`] every packet re-arms it.

pub mod expiry;
pub mod handler;
pub mod manager;
pub mod state;

pub use expiry::{ExpiryMode, ExpiryPolicy};
pub use handler::{EchoHandler, SessionHandler};
pub use manager::{Dispatched, SessionManager, SessionTable};
pub use state::Session;
