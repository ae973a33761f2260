//! Shared-state containers used between the network, dispatch and timer
//! components.
//!
//! - [`BlockingQueue`]: an unbounded multi-producer/multi-consumer queue of
//!   `Arc<T>` with close semantics, connecting endpoints to session managers.
//! - [`ConcurrentTable`]: a keyed map behind one coarse lock with an atomic
//!   find-or-create, holding the live sessions of one address family.

pub mod queue;
pub mod table;

pub use queue::{BlockingQueue, QueueOrder};
pub use table::ConcurrentTable;

#[cfg(test)]
mod tests;
