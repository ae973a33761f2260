//! Small tokio runtime for work outside the datagram path: OS signal
//! delivery and metrics aggregation. Datagrams never touch it.

use crate::config::RuntimeConfig;
use anyhow::Result;
use tokio::runtime::Runtime;

/// One worker thread is enough for signals and the metrics task.
const SIGNAL_WORKER_THREADS: usize = 1;

pub fn create_runtime(config: &RuntimeConfig) -> Result<Runtime> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(SIGNAL_WORKER_THREADS)
        .max_blocking_threads(1)
        .thread_name(format!("{}-signals", config.thread_name))
        .thread_stack_size(config.thread_stack_size)
        .enable_all()
        .build()?;

    Ok(rt)
}
