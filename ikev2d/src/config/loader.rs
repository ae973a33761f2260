//! Configuration loading and parsing.
//!
//! Precedence, lowest to highest: defaults, TOML file, `IKEV2D_` environment
//! variables, command-line flags.

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use config::{Config as ConfigLoader, Environment};
use std::path::{Path, PathBuf};

use super::DaemonConfig;
use crate::session::ExpiryMode;
use crate::sync::QueueOrder;

/// Environment variable prefix; sections are separated by `__`.
pub const ENV_PREFIX: &str = "IKEV2D";

/// Command-line interface for the daemon.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "UDP session daemon", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(long, short = 'c', default_value = "ikev2d.toml")]
    pub config: PathBuf,

    /// IPv4 bind host (overrides config file)
    #[arg(long)]
    pub host4: Option<String>,

    /// IPv6 bind host (overrides config file)
    #[arg(long)]
    pub host6: Option<String>,

    /// UDP port for both families (overrides config file)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Queue discipline: fifo or lifo (overrides config file)
    #[arg(long)]
    pub queue_order: Option<QueueOrder>,

    /// Session lifetime in milliseconds (overrides config file)
    #[arg(long)]
    pub session_timeout_ms: Option<u64>,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,

    /// Print default configuration and exit
    #[arg(long)]
    pub print_default_config: bool,
}

/// Load the daemon configuration from the process arguments.
///
/// `--print-default-config` and `--validate` are handled here and exit the
/// process.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if validation
/// fails.
pub fn load_config() -> Result<DaemonConfig> {
    let matches = CliArgs::command().get_matches();
    let cli =
        CliArgs::from_arg_matches(&matches).context("Failed to parse command-line arguments")?;

    if cli.print_default_config {
        print_default_config()?;
        std::process::exit(0);
    }

    let config = load_from_args(&cli, env_source())?;

    if cli.validate {
        println!("Configuration is valid");
        std::process::exit(0);
    }

    Ok(config)
}

/// Resolve a configuration from parsed flags and an environment source.
pub fn load_from_args(cli: &CliArgs, env: Environment) -> Result<DaemonConfig> {
    let mut config = load_config_file(&cli.config)?;
    apply_env_overrides(&mut config, env)?;
    apply_cli_overrides(&mut config, cli);
    config.overrides = Some(cli.clone());
    validate(&config)?;
    Ok(config)
}

/// Re-read `path` for a reload.
///
/// Flags from the original command line keep their precedence over the file
/// and environment.
pub fn reload_config(path: &Path, overrides: Option<&CliArgs>) -> Result<DaemonConfig> {
    let mut config = load_config_file(path)?;
    apply_env_overrides(&mut config, env_source())?;
    if let Some(cli) = overrides {
        apply_cli_overrides(&mut config, cli);
        config.overrides = Some(cli.clone());
    }
    validate(&config)?;
    Ok(config)
}

/// Load configuration from a TOML file. A missing file yields defaults.
pub fn load_config_file(path: &Path) -> Result<DaemonConfig> {
    let mut config = if path.exists() {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<DaemonConfig>(&config_str)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
    } else {
        tracing::warn!(
            config_path = %path.display(),
            "Configuration file not found, using defaults"
        );
        DaemonConfig::default()
    };

    config.source = Some(path.to_path_buf());
    Ok(config)
}

fn validate(config: &DaemonConfig) -> Result<()> {
    config.validate().map_err(|errors| {
        anyhow::anyhow!("Configuration validation failed:\n{}", errors.join("\n"))
    })
}

/// Process environment filtered to `IKEV2D_*`.
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Apply environment variable overrides.
///
/// Examples:
/// - `IKEV2D_GLOBAL__NETWORK__PORT=500`
/// - `IKEV2D_GLOBAL__DISPATCH__EXPIRY_MODE=sliding`
pub fn apply_env_overrides(config: &mut DaemonConfig, env: Environment) -> Result<()> {
    let env_config = ConfigLoader::builder()
        .add_source(env)
        .build()
        .context("Failed to load environment variables")?;

    let global = &mut config.global;

    if let Ok(host) = env_config.get_string("global.network.host4") {
        global.network.host4 = host;
    }
    if let Ok(host) = env_config.get_string("global.network.host6") {
        global.network.host6 = host;
    }
    if let Ok(port) = env_config.get_int("global.network.port") {
        global.network.port = u16::try_from(port)
            .with_context(|| format!("IKEV2D_GLOBAL__NETWORK__PORT out of range: {}", port))?;
    }
    if let Ok(enabled) = env_config.get_bool("global.network.enable_ipv4") {
        global.network.enable_ipv4 = enabled;
    }
    if let Ok(enabled) = env_config.get_bool("global.network.enable_ipv6") {
        global.network.enable_ipv6 = enabled;
    }
    if let Ok(count) = env_config.get_int("global.netio.endpoints_per_family") {
        global.netio.endpoints_per_family = usize::try_from(count).unwrap_or(0);
    }
    if let Ok(count) = env_config.get_int("global.dispatch.dispatchers_per_family") {
        global.dispatch.dispatchers_per_family = usize::try_from(count).unwrap_or(0);
    }
    if let Ok(timeout) = env_config.get_int("global.dispatch.session_timeout_ms") {
        global.dispatch.session_timeout_ms = u64::try_from(timeout).unwrap_or(0);
    }
    if let Ok(order) = env_config.get_string("global.dispatch.queue_order") {
        match order.parse::<QueueOrder>() {
            Ok(order) => global.dispatch.queue_order = order,
            Err(e) => tracing::warn!(error = %e, "Ignoring IKEV2D_GLOBAL__DISPATCH__QUEUE_ORDER"),
        }
    }
    if let Ok(mode) = env_config.get_string("global.dispatch.expiry_mode") {
        match mode.parse::<ExpiryMode>() {
            Ok(mode) => global.dispatch.expiry_mode = mode,
            Err(e) => tracing::warn!(error = %e, "Ignoring IKEV2D_GLOBAL__DISPATCH__EXPIRY_MODE"),
        }
    }
    if let Ok(threads) = env_config.get_int("global.runtime.pool_threads") {
        global.runtime.pool_threads = usize::try_from(threads).unwrap_or(0);
    }
    if let Ok(level) = env_config.get_string("global.logging.level") {
        if let Ok(parsed_level) = level.parse() {
            global.logging.level = parsed_level;
        }
    }

    Ok(())
}

/// Apply command-line argument overrides.
pub fn apply_cli_overrides(config: &mut DaemonConfig, cli: &CliArgs) {
    let global = &mut config.global;

    if let Some(ref host) = cli.host4 {
        global.network.host4 = host.clone();
    }
    if let Some(ref host) = cli.host6 {
        global.network.host6 = host.clone();
    }
    if let Some(port) = cli.port {
        global.network.port = port;
    }
    if let Some(order) = cli.queue_order {
        global.dispatch.queue_order = order;
    }
    if let Some(timeout) = cli.session_timeout_ms {
        global.dispatch.session_timeout_ms = timeout;
    }
    if let Some(ref level_str) = cli.log_level {
        if let Ok(level) = level_str.parse() {
            global.logging.level = level;
        } else {
            tracing::warn!(level = %level_str, "Invalid log level specified, ignoring");
        }
    }
}

/// Print the default configuration in TOML format.
fn print_default_config() -> Result<()> {
    let default_config = DaemonConfig::default();
    let toml_str =
        toml::to_string_pretty(&default_config).context("Failed to serialize default config")?;
    println!("{}", toml_str);
    Ok(())
}
