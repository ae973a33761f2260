//! # Telemetry and Observability
//!
//! Structured logging through `tracing` and event-driven metrics.
//!
//! Hot paths (datagram receive/send, session creation, timer fires) call
//! [`record_metric`], which is a single channel send. A task on the signal
//! runtime folds events into counters and logs a summary periodically.
//!
//! ## Usage
//!
//! ```ignore
//! use ikev2d::telemetry::{init_logging, init_telemetry, record_metric, MetricsEvent};
//!
//! init_logging(&config.global.logging)?;
//! let metrics = init_telemetry(&config.global.telemetry, runtime.handle())?;
//!
//! record_metric(MetricsEvent::PacketReceived { bytes: 1200 });
//! ```

pub mod config;
pub mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    record_metric, start_metrics_task, MetricsEvent, MetricsHandle, MetricsSnapshot,
};

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Start metrics aggregation on `runtime_handle`, or return a disabled
/// handle when metrics are turned off.
pub fn init_telemetry(
    config: &TelemetryConfig,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<MetricsHandle> {
    let metrics_handle = if config.enable_metrics {
        tracing::info!(
            service = %config.service_name,
            interval_secs = config.export_interval_secs,
            "Starting event-driven metrics system"
        );
        start_metrics_task(config, runtime_handle)?
    } else {
        tracing::warn!("Metrics collection is disabled");
        MetricsHandle::disabled()
    };

    Ok(metrics_handle)
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(config.enable_colors)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    tracing::debug!(level = %config.level, json = config.json_format, "Logging initialized");
    Ok(())
}
