//! Daemon configuration.
//!
//! Every section deserialises with defaults, so an empty file (or no file)
//! yields a runnable daemon bound to `127.0.0.1` and `::` on port 34455.
//!
//! # Example
//!
//! ```toml
//! [global.network]
//! host4 = "0.0.0.0"
//! port = 500
//! enable_ipv6 = false
//!
//! [global.dispatch]
//! session_timeout_ms = 5000
//! expiry_mode = "sliding"
//! ```

pub mod global;
pub mod loader;
pub mod validation;


pub use global::{GlobalConfig, LogLevel, LoggingConfig, NetworkConfig, RuntimeConfig};
pub use loader::{load_config, load_config_file, reload_config};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub global: GlobalConfig,

    /// File this configuration was read from, re-read on reload.
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Command-line flags, re-applied on reload.
    #[serde(skip)]
    pub overrides: Option<loader::CliArgs>,
}

impl DaemonConfig {
    /// Validate the entire configuration.
    ///
    /// Errors from every section are collected so one run reports them all.
    /// Cross-section warnings are logged but never fail validation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        self.global.validate()?;
        validation::validate_resource_limits(self);
        Ok(())
    }

    /// Address families the daemon should serve.
    pub fn enabled_families(&self) -> Vec<crate::netio::Family> {
        let network = &self.global.network;
        let mut families = Vec::with_capacity(2);
        if network.enable_ipv4 {
            families.push(crate::netio::Family::V4);
        }
        if network.enable_ipv6 {
            families.push(crate::netio::Family::V6);
        }
        families
    }
}
