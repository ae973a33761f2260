//! Daemon bootstrap and orchestrated shutdown.
//!
//! [`Daemon::start`] wires the engine together for every enabled address
//! family:
//!
//! ```text
//!   endpoint recv loops ──► inbound queue ──► dispatchers ──► sessions
//!                                                               │
//!   endpoint send loops ◄── outbound queue ◄────── replies ◄────┘
//! ```
//!
//! All long-running loops (endpoint receive/send loops, dispatchers, the
//! timer loop and the reload watcher) are tasks on one [`ThreadPool`], which
//! is sized so each of them gets a thread and short jobs such as expiry
//! callbacks still find idle workers.
//!
//! [`Daemon::shutdown`] stops the components in dependency order, joins every
//! task and reports how each one ended.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{error, info, warn};

use crate::config::loader::CliArgs;
use crate::config::{self, validation, DaemonConfig};
use crate::error::Result;
use crate::netio::{
    AddressFamily, Endpoint, EndpointControl, EndpointQueues, Family, Ipv4, Ipv6, PacketQueue,
};
use crate::reload::ReloadWatcher;
use crate::session::{ExpiryPolicy, SessionHandler, SessionManager};
use crate::timer::TimerEngine;
use crate::worker::{PoolOptions, TaskHandle, ThreadPool};

/// Everything running for one address family.
struct FamilyRuntime {
    family: Family,
    manager: Arc<SessionManager>,
    endpoints: Vec<Arc<dyn EndpointControl>>,
}

struct NamedTask {
    name: String,
    handle: TaskHandle<Result<()>>,
}

/// How the daemon's tasks ended.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Long-running tasks waited for.
    pub tasks_joined: usize,
    /// `(task name, error)` for every task that failed or panicked.
    pub failed_tasks: Vec<(String, String)>,
    /// Pool threads joined.
    pub threads_joined: usize,
    /// Sessions still live at shutdown.
    pub sessions_dropped: usize,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed_tasks.is_empty()
    }
}

/// A running daemon. Dropping it without calling [`Daemon::shutdown`] shuts
/// it down anyway.
pub struct Daemon {
    pool: Arc<ThreadPool>,
    timer: Arc<TimerEngine>,
    reload: Arc<ReloadWatcher>,
    handler: Arc<dyn SessionHandler>,
    families: Vec<FamilyRuntime>,
    tasks: Vec<NamedTask>,
    stopped: bool,
}

impl Daemon {
    /// Start every component described by `config`.
    ///
    /// Fails if no endpoint of an enabled family could be bound. Components
    /// already started are shut down before the error is returned.
    pub fn start(config: &DaemonConfig, handler: Arc<dyn SessionHandler>) -> anyhow::Result<Self> {
        if config.enabled_families().is_empty() {
            bail!("no address family enabled");
        }

        let long_running = validation::long_running_tasks(config);
        let mut options = PoolOptions::from(&config.global.runtime);
        options.threads += long_running;
        let pool = Arc::new(ThreadPool::new(options).context("failed to start worker pool")?);

        let timer = Arc::new(TimerEngine::new(Arc::clone(&pool)));
        let reload = Arc::new(ReloadWatcher::new().context("failed to create reload notifier")?);

        let mut daemon = Self {
            pool,
            timer,
            reload,
            handler,
            families: Vec::new(),
            tasks: Vec::new(),
            stopped: false,
        };

        if let Err(e) = daemon.launch(config) {
            error!(error = %format!("{e:#}"), "Startup failed, stopping started components");
            daemon.stop_all();
            return Err(e);
        }

        info!(
            families = ?daemon.families.iter().map(|f| f.family).collect::<Vec<_>>(),
            tasks = daemon.tasks.len(),
            pool_threads = daemon.pool.worker_count(),
            "Daemon started"
        );
        Ok(daemon)
    }

    fn launch(&mut self, config: &DaemonConfig) -> anyhow::Result<()> {
        let timer = Arc::clone(&self.timer);
        self.spawn("timer", move || timer.run())?;

        for family in config.enabled_families() {
            self.start_family(family, config)?;
        }

        let managers: Vec<Arc<SessionManager>> =
            self.families.iter().map(|f| Arc::clone(&f.manager)).collect();
        let source = config.source.clone();
        let overrides = config.overrides.clone();
        let reload = Arc::clone(&self.reload);
        self.spawn("reload-watcher", move || {
            reload.run(|| apply_reload(source.as_deref(), overrides.as_ref(), &managers))
        })?;

        Ok(())
    }

    fn spawn<F>(&mut self, name: impl Into<String>, task: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let handle = self
            .pool
            .submit(task)
            .with_context(|| format!("failed to submit task {}", name))?;
        self.tasks.push(NamedTask { name, handle });
        Ok(())
    }

    fn start_family(&mut self, family: Family, config: &DaemonConfig) -> anyhow::Result<()> {
        let global = &config.global;
        let dispatch = &global.dispatch;

        let queues = EndpointQueues {
            inbound: Arc::new(PacketQueue::new(dispatch.queue_order)),
            outbound: Arc::new(PacketQueue::new(dispatch.queue_order)),
        };
        let manager = Arc::new(SessionManager::new(
            family,
            queues.clone(),
            Arc::clone(&self.timer),
            Arc::clone(&self.handler),
            ExpiryPolicy::new(dispatch.session_timeout(), dispatch.expiry_mode),
        ));

        // Registered first so a failure below still closes its queues.
        let slot = self.families.len();
        self.families.push(FamilyRuntime {
            family,
            manager: Arc::clone(&manager),
            endpoints: Vec::new(),
        });

        for i in 0..dispatch.dispatchers_per_family {
            let manager = Arc::clone(&manager);
            self.spawn(format!("{}-dispatcher-{}", family, i), move || {
                manager.handle_sessions()
            })?;
        }

        match family {
            Family::V4 => self.bind_endpoints::<Ipv4>(slot, &global.network.host4, config, &queues),
            Family::V6 => self.bind_endpoints::<Ipv6>(slot, &global.network.host6, config, &queues),
        }
    }

    fn bind_endpoints<F: AddressFamily>(
        &mut self,
        slot: usize,
        host: &str,
        config: &DaemonConfig,
        queues: &EndpointQueues,
    ) -> anyhow::Result<()> {
        let netio = &config.global.netio;
        let port = config.global.network.port;
        let mut bound = 0;

        for id in 0..netio.endpoints_per_family {
            let endpoint = match Endpoint::<F>::bind(id, host, port, netio, queues.clone()) {
                Ok(endpoint) => Arc::new(endpoint),
                Err(e) => {
                    warn!(family = F::NAME, endpoint_id = id, %host, port, error = %e, "Endpoint failed to start");
                    continue;
                }
            };

            if let Some(runtime) = self.families.get_mut(slot) {
                runtime.endpoints.push(Arc::clone(&endpoint) as Arc<dyn EndpointControl>);
            }

            let receiver = Arc::clone(&endpoint);
            self.spawn(format!("{}-endpoint-{}-recv", F::NAME, id), move || {
                receiver.receive_loop()
            })?;
            self.spawn(format!("{}-endpoint-{}-send", F::NAME, id), move || {
                endpoint.send_loop()
            })?;
            bound += 1;
        }

        if bound == 0 {
            bail!("no {} endpoint could be bound on {}:{}", F::NAME, host, port);
        }
        if bound < netio.endpoints_per_family {
            warn!(
                family = F::NAME,
                bound,
                wanted = netio.endpoints_per_family,
                "Running with fewer endpoints than configured"
            );
        }
        Ok(())
    }

    /// Local addresses of the running endpoints of `family`.
    pub fn local_addrs(&self, family: Family) -> Vec<SocketAddr> {
        self.families
            .iter()
            .filter(|f| f.family == family)
            .flat_map(|f| f.endpoints.iter().map(|e| e.local_addr()))
            .collect()
    }

    pub fn manager(&self, family: Family) -> Option<&Arc<SessionManager>> {
        self.families
            .iter()
            .find(|f| f.family == family)
            .map(|f| &f.manager)
    }

    pub fn reload_watcher(&self) -> Arc<ReloadWatcher> {
        Arc::clone(&self.reload)
    }

    pub fn request_reload(&self) -> std::io::Result<()> {
        self.reload.request_reload()
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn timer(&self) -> &Arc<TimerEngine> {
        &self.timer
    }

    /// Number of long-running tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop everything and wait for every task to finish.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.stop_all()
    }

    fn stop_all(&mut self) -> ShutdownReport {
        self.stopped = true;
        info!("Daemon shutting down");

        if let Err(e) = self.reload.stop() {
            warn!(error = %e, "Failed to signal the reload watcher");
        }
        self.timer.shutdown();

        // Closing the queues ends dispatchers and send loops once drained.
        for runtime in &self.families {
            runtime.manager.shutdown();
            for endpoint in &runtime.endpoints {
                if let Err(e) = endpoint.stop() {
                    warn!(
                        family = %runtime.family,
                        endpoint_id = endpoint.id(),
                        error = %e,
                        "Failed to signal endpoint"
                    );
                }
            }
        }

        let mut report = ShutdownReport::default();
        for task in self.tasks.drain(..) {
            match task.handle.wait() {
                Ok(Ok(())) => {}
                Ok(Err(e)) | Err(e) => {
                    warn!(task = %task.name, error = %e, "Task ended with an error");
                    report.failed_tasks.push((task.name, e.to_string()));
                }
            }
            report.tasks_joined += 1;
        }

        report.threads_joined = self.pool.shutdown();

        for runtime in &self.families {
            report.sessions_dropped += runtime.manager.clear_sessions();
        }
        self.handler.release();

        info!(
            tasks = report.tasks_joined,
            failed = report.failed_tasks.len(),
            threads = report.threads_joined,
            sessions_dropped = report.sessions_dropped,
            "Daemon stopped"
        );
        report
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop_all();
        }
    }
}

/// Re-read the configuration file and apply the hot-reloadable knobs.
fn apply_reload(
    source: Option<&Path>,
    overrides: Option<&CliArgs>,
    managers: &[Arc<SessionManager>],
) {
    let Some(path) = source else {
        warn!("Reload requested but the configuration has no source file");
        return;
    };

    match config::reload_config(path, overrides) {
        Ok(fresh) => {
            let dispatch = &fresh.global.dispatch;
            for manager in managers {
                manager.update_expiry(dispatch.session_timeout(), dispatch.expiry_mode);
            }
            info!(
                path = %path.display(),
                session_timeout_ms = dispatch.session_timeout_ms,
                expiry_mode = %dispatch.expiry_mode,
                "Configuration reloaded"
            );
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %format!("{e:#}"),
                "Configuration reload failed, keeping current settings"
            );
        }
    }
}
