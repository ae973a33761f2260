use anyhow::Context;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use ikev2d::config;
use ikev2d::limits;
use ikev2d::reload::ReloadWatcher;
use ikev2d::runtime;
use ikev2d::session::{EchoHandler, SessionHandler};
use ikev2d::telemetry;
use ikev2d::Daemon;

fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;

    telemetry::init_logging(&config.global.logging)?;
    info!(
        config_path = ?config.source,
        "Configuration loaded successfully"
    );

    if config.global.runtime.raise_core_limit {
        limits::raise_core_limit().context("failed to raise the core dump limit")?;
    }

    // Signals and metrics aggregation; datagrams never touch this runtime.
    let tokio_runtime = runtime::create_runtime(&config.global.runtime)
        .with_context(|| "failed to create tokio runtime")?;

    let metrics_handle = telemetry::init_telemetry(&config.global.telemetry, tokio_runtime.handle())
        .with_context(|| "failed to initialize telemetry")?;

    let handler: Arc<dyn SessionHandler> = Arc::new(EchoHandler);
    let daemon = Daemon::start(&config, handler).context("failed to start daemon")?;

    for family in config.enabled_families() {
        info!(
            %family,
            endpoints = ?daemon.local_addrs(family),
            "Listening"
        );
    }

    let reload = daemon.reload_watcher();
    tokio_runtime.block_on(wait_for_shutdown(reload))?;

    info!("Initiating graceful shutdown");
    let report = daemon.shutdown();
    if !report.is_clean() {
        for (task, error) in &report.failed_tasks {
            warn!(%task, %error, "Task failed");
        }
    }

    tokio_runtime.block_on(metrics_handle.shutdown());

    info!("Shutting down tokio runtime");
    tokio_runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    info!("Shutdown complete");
    Ok(())
}

/// Block until SIGINT or SIGTERM. SIGHUP requests a configuration reload.
async fn wait_for_shutdown(reload: Arc<ReloadWatcher>) -> anyhow::Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for SIGINT")?;
                info!("SIGINT received");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                return Ok(());
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading configuration");
                if let Err(e) = reload.request_reload() {
                    warn!(error = %e, "Failed to request reload");
                }
            }
        }
    }
}
