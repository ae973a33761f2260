//! Error types shared by the dispatch engine.
//!
//! Configuration and process bootstrap use `anyhow`; the engine primitives
//! (pool, endpoints, session managers) report through [`Error`] so callers can
//! match on the failure class.

use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The worker pool has been shut down and accepts no more work.
    #[error("worker pool is shut down")]
    PoolClosed,

    /// A submitted task panicked; the payload message is preserved.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// The task was dropped before it produced a result.
    #[error("task was dropped before completion")]
    TaskLost,

    /// Address resolution yielded nothing usable for the requested family.
    #[error("no {family} interface available for host '{host}'")]
    NoInterface { family: &'static str, host: String },

    #[error("failed to bind UDP socket to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A network endpoint loop stopped on an unrecoverable condition.
    #[error("{family} endpoint {id}: {reason}")]
    Endpoint {
        family: &'static str,
        id: usize,
        reason: String,
    },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}
