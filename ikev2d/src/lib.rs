//! ikev2d: a multi-threaded UDP session daemon.
//!
//! Datagrams arriving on a set of endpoints per address family are keyed by
//! peer, routed to a per-peer session and answered through the same family's
//! endpoints. Sessions live for a configurable time tracked by a shared timer
//! engine. The binary in `main.rs` wires this to signals and configuration.

pub mod config;
pub mod daemon;
pub mod dispatch_config;
pub mod error;
pub mod limits;
pub mod netio;
pub mod reactor;
pub mod reload;
pub mod routing;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod telemetry;
pub mod timer;
pub mod worker;

pub use daemon::{Daemon, ShutdownReport};
pub use error::{Error, Result};
