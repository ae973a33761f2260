//! Daemon-wide configuration sections.
//!
//! Network binding, pool sizing and logging live here. Endpoint socket
//! options, dispatch behaviour and telemetry are defined next to the code
//! that consumes them and composed into [`GlobalConfig`].

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::dispatch_config::DispatchConfig;
use crate::netio::NetIoConfig;
use crate::telemetry::TelemetryConfig;

/// Default UDP port shared by both address families.
pub const DEFAULT_PORT: u16 = 34455;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub network: NetworkConfig,
    pub netio: NetIoConfig,
    pub dispatch: DispatchConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

impl GlobalConfig {
    /// Validate every section and collect all errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.network.validate() {
            errors.extend(e);
        }

        if let Err(e) = self.netio.validate() {
            errors.extend(e);
        }

        if let Err(e) = self.dispatch.validate() {
            errors.push(e);
        }

        if let Err(e) = self.runtime.validate() {
            errors.extend(e);
        }

        if let Err(e) = self.telemetry.validate() {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Network binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host the IPv4 endpoints bind to. An address literal or a name that
    /// resolves to at least one IPv4 address.
    ///
    /// **Default:** `"127.0.0.1"`
    pub host4: String,

    /// Host the IPv6 endpoints bind to.
    ///
    /// **Default:** `"::"`
    pub host6: String,

    /// UDP port for both families. `0` lets the OS pick one per endpoint.
    ///
    /// **Default:** `34455`
    pub port: u16,

    /// **Default:** `true`
    pub enable_ipv4: bool,

    /// **Default:** `true`
    pub enable_ipv6: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host4: "127.0.0.1".to_string(),
            host6: "::".to_string(),
            port: DEFAULT_PORT,
            enable_ipv4: true,
            enable_ipv6: true,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.enable_ipv4 && !self.enable_ipv6 {
            errors.push("At least one of enable_ipv4 / enable_ipv6 must be true".to_string());
        }

        // Names are resolved at bind time; literals can be checked now.
        if self.enable_ipv4 {
            if self.host4.is_empty() {
                errors.push("host4 must not be empty".to_string());
            } else if let Ok(IpAddr::V6(_)) = self.host4.parse::<IpAddr>() {
                errors.push(format!("host4 is an IPv6 address: {}", self.host4));
            }
        }

        if self.enable_ipv6 {
            if self.host6.is_empty() {
                errors.push("host6 must not be empty".to_string());
            } else if let Ok(IpAddr::V4(_)) = self.host6.parse::<IpAddr>() {
                errors.push(format!("host6 is an IPv4 address: {}", self.host6));
            }
        }

        if self.port == 0 {
            tracing::warn!("port=0: every endpoint binds to its own OS-assigned port");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base threads for short jobs such as timer callbacks. Long-running
    /// loops (endpoints, dispatchers, the timer, the reload watcher) get
    /// their own threads on top of this.
    ///
    /// **Default:** Number of CPU cores
    pub pool_threads: usize,

    /// Outstanding-task count above which the pool adds a thread.
    ///
    /// **Default:** 50
    pub growth_threshold: usize,

    /// **Default:** `"ikev2d-worker"`
    pub thread_name: String,

    /// Stack size for each pool thread in bytes.
    ///
    /// **Default:** 2 MB
    pub thread_stack_size: usize,

    /// Raise the soft core-dump limit to the hard limit at startup.
    ///
    /// **Default:** `true`
    pub raise_core_limit: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_threads: num_cpus::get(),
            growth_threshold: 50,
            thread_name: "ikev2d-worker".to_string(),
            thread_stack_size: 2 * 1024 * 1024,
            raise_core_limit: true,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.pool_threads == 0 {
            errors.push("pool_threads must be > 0".to_string());
        }

        if self.pool_threads > 1024 {
            errors.push("pool_threads is unreasonably high (> 1024)".to_string());
        }

        if self.growth_threshold == 0 {
            errors.push("growth_threshold must be > 0".to_string());
        }

        if self.thread_name.is_empty() {
            errors.push("thread_name must not be empty".to_string());
        }

        if self.thread_stack_size < 128 * 1024 {
            errors.push("thread_stack_size too small (< 128 KB)".to_string());
        }

        if self.thread_stack_size > 64 * 1024 * 1024 {
            errors.push("thread_stack_size too large (> 64 MB)".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overridden by `RUST_LOG` when set.
    ///
    /// **Default:** `Info`
    pub level: LogLevel,

    /// Emit one JSON object per event.
    ///
    /// **Default:** `false`
    pub json_format: bool,

    /// **Default:** `true`
    pub enable_colors: bool,

    /// **Default:** `false`
    pub include_file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            enable_colors: true,
            include_file_line: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}
