//! Event-driven metrics collection.
//!
//! Callers fire [`MetricsEvent`]s into an unbounded channel and never wait.
//! A dedicated task aggregates them into atomic counters that can be read
//! at any time through [`MetricsHandle::snapshot`].

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::config::TelemetryConfig;

/// Global metrics event sender
static METRICS_SENDER: OnceCell<Sender<MetricsEvent>> = OnceCell::new();

/// How often the aggregation task drains the channel.
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Metrics events for fire-and-forget recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsEvent {
    // ========== Network ==========
    /// Datagram read from an endpoint socket
    PacketReceived { bytes: usize },

    /// Datagram written to an endpoint socket
    PacketSent { bytes: usize },

    NetworkReceiveError,

    NetworkSendError,

    /// Endpoint receive loop started
    EndpointStarted,

    /// Endpoint receive loop exited
    EndpointStopped,

    // ========== Sessions ==========
    SessionCreated,

    /// Session removed by its expiry timer
    SessionExpired,

    // ========== Engine ==========
    /// Timer callback handed to the pool
    TimerFired,

    /// Pool added a thread; carries the new worker count
    PoolGrew { workers: usize },
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub receive_errors: u64,
    pub send_errors: u64,
    pub active_endpoints: u64,
    pub sessions_created: u64,
    pub sessions_expired: u64,
    pub timers_fired: u64,
    pub pool_workers: u64,
}

impl MetricsSnapshot {
    /// Sessions created and not yet expired.
    pub fn sessions_active(&self) -> u64 {
        self.sessions_created.saturating_sub(self.sessions_expired)
    }
}

/// Aggregates events into counters.
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    receive_errors: AtomicU64,
    send_errors: AtomicU64,
    active_endpoints: AtomicU64,
    sessions_created: AtomicU64,
    sessions_expired: AtomicU64,
    timers_fired: AtomicU64,
    pool_workers: AtomicU64,
}

impl MetricsCollector {
    pub(crate) fn process_event(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::PacketReceived { bytes } => {
                self.packets_received.fetch_add(1, Ordering::Relaxed);
                self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            MetricsEvent::PacketSent { bytes } => {
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            MetricsEvent::NetworkReceiveError => {
                self.receive_errors.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::NetworkSendError => {
                self.send_errors.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::EndpointStarted => {
                self.active_endpoints.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::EndpointStopped => {
                // Saturate: a stop may be folded before its start.
                let _ = self.active_endpoints.fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |n| Some(n.saturating_sub(1)),
                );
            }
            MetricsEvent::SessionCreated => {
                self.sessions_created.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::SessionExpired => {
                self.sessions_expired.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::TimerFired => {
                self.timers_fired.fetch_add(1, Ordering::Relaxed);
            }
            MetricsEvent::PoolGrew { workers } => {
                self.pool_workers.fetch_max(workers as u64, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn drain(&self, rx: &Receiver<MetricsEvent>) -> usize {
        let mut processed = 0;
        while let Ok(event) = rx.try_recv() {
            self.process_event(event);
            processed += 1;
        }
        processed
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            active_endpoints: self.active_endpoints.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_expired: self.sessions_expired.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            pool_workers: self.pool_workers.load(Ordering::Relaxed),
        }
    }

    fn log_summary(&self, service: &str) {
        let s = self.snapshot();
        tracing::info!(
            service = %service,
            packets_received = s.packets_received,
            bytes_received = s.bytes_received,
            packets_sent = s.packets_sent,
            bytes_sent = s.bytes_sent,
            receive_errors = s.receive_errors,
            send_errors = s.send_errors,
            active_endpoints = s.active_endpoints,
            sessions_active = s.sessions_active(),
            sessions_expired = s.sessions_expired,
            timers_fired = s.timers_fired,
            pool_workers = s.pool_workers,
            "Metrics summary"
        );
    }
}

/// Handle to the metrics task for graceful shutdown
pub struct MetricsHandle {
    collector: Arc<MetricsCollector>,
    task_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsHandle {
    /// Create a disabled handle (when metrics are disabled)
    pub fn disabled() -> Self {
        Self {
            collector: Arc::new(MetricsCollector::default()),
            task_handle: None,
            shutdown_tx: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.task_handle.is_some()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }

    /// Flush pending events, log a final summary and stop the task.
    pub async fn shutdown(self) {
        if let Some(tx) = self.shutdown_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Err(e)) => {
                    tracing::error!(error = ?e, "Metrics task panicked during shutdown");
                }
                Ok(Ok(())) => {}
                Err(_) => {
                    tracing::error!("Metrics task shutdown timed out after 5 seconds");
                }
            }
        }
    }
}

/// Record a metrics event (fire-and-forget).
///
/// No-op until [`start_metrics_task`] has run. Never blocks.
#[inline]
pub fn record_metric(event: MetricsEvent) {
    if let Some(sender) = METRICS_SENDER.get() {
        let _ = sender.send(event);
    }
}

/// Install the global sender and spawn the aggregation task.
///
/// Can succeed once per process.
pub fn start_metrics_task(
    config: &TelemetryConfig,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<MetricsHandle> {
    let (tx, rx) = crossbeam_channel::unbounded::<MetricsEvent>();

    METRICS_SENDER
        .set(tx)
        .map_err(|_| anyhow::anyhow!("Metrics sender already initialized"))?;

    let collector = Arc::new(MetricsCollector::default());
    let task_collector = Arc::clone(&collector);
    let service = config.service_name.clone();
    let report_every = Duration::from_secs(config.export_interval_secs.max(1));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

    let task_handle = runtime_handle.spawn(async move {
        tracing::debug!("Metrics collection task started");

        let mut report = tokio::time::interval(report_every);
        // The first tick completes immediately.
        report.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = report.tick() => {
                    task_collector.drain(&rx);
                    task_collector.log_summary(&service);
                }
                _ = tokio::time::sleep(DRAIN_INTERVAL) => {
                    task_collector.drain(&rx);
                }
            }
        }

        task_collector.drain(&rx);
        task_collector.log_summary(&service);
        tracing::debug!("Metrics task stopped");
    });

    Ok(MetricsHandle {
        collector,
        task_handle: Some(task_handle),
        shutdown_tx: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_counts_traffic() {
        let collector = MetricsCollector::default();
        collector.process_event(MetricsEvent::PacketReceived { bytes: 100 });
        collector.process_event(MetricsEvent::PacketReceived { bytes: 50 });
        collector.process_event(MetricsEvent::PacketSent { bytes: 100 });
        collector.process_event(MetricsEvent::NetworkSendError);

        let s = collector.snapshot();
        assert_eq!(s.packets_received, 2);
        assert_eq!(s.bytes_received, 150);
        assert_eq!(s.packets_sent, 1);
        assert_eq!(s.bytes_sent, 100);
        assert_eq!(s.send_errors, 1);
        assert_eq!(s.receive_errors, 0);
    }

    #[test]
    fn test_active_gauges() {
        let collector = MetricsCollector::default();
        collector.process_event(MetricsEvent::EndpointStopped);
        collector.process_event(MetricsEvent::EndpointStarted);
        collector.process_event(MetricsEvent::EndpointStarted);
        collector.process_event(MetricsEvent::EndpointStopped);
        for _ in 0..3 {
            collector.process_event(MetricsEvent::SessionCreated);
        }
        collector.process_event(MetricsEvent::SessionExpired);

        let s = collector.snapshot();
        assert_eq!(s.active_endpoints, 1);
        assert_eq!(s.sessions_active(), 2);
    }

    #[test]
    fn test_pool_workers_keeps_maximum() {
        let collector = MetricsCollector::default();
        collector.process_event(MetricsEvent::PoolGrew { workers: 5 });
        collector.process_event(MetricsEvent::PoolGrew { workers: 3 });
        assert_eq!(collector.snapshot().pool_workers, 5);
    }

    #[test]
    fn test_drain_empties_channel() {
        let collector = MetricsCollector::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        for _ in 0..10 {
            tx.send(MetricsEvent::TimerFired).unwrap();
        }
        assert_eq!(collector.drain(&rx), 10);
        assert_eq!(collector.drain(&rx), 0);
        assert_eq!(collector.snapshot().timers_fired, 10);
    }

    #[test]
    fn test_disabled_handle() {
        let handle = MetricsHandle::disabled();
        assert!(!handle.is_enabled());
        assert_eq!(handle.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_task_aggregates_and_stops() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let config = TelemetryConfig::default();

        let handle = start_metrics_task(&config, runtime.handle()).unwrap();
        assert!(handle.is_enabled());
        assert!(start_metrics_task(&config, runtime.handle()).is_err());

        record_metric(MetricsEvent::SessionCreated);
        record_metric(MetricsEvent::PacketReceived { bytes: 7 });

        runtime.block_on(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
        });
        let snapshot = handle.snapshot();
        assert!(snapshot.sessions_created >= 1);
        assert!(snapshot.bytes_received >= 7);

        runtime.block_on(handle.shutdown());
    }
}
