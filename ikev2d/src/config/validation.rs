//! Cross-section sanity checks.
//!
//! Section `validate()` methods reject values that cannot work. The checks
//! here only warn: they flag combinations that work but probably are not
//! what the operator meant.

use super::DaemonConfig;

/// Number of pool tasks that never return while the daemon runs.
///
/// Per enabled family: one receive and one send loop per endpoint plus the
/// dispatchers. On top of that the timer loop and the reload watcher.
pub fn long_running_tasks(config: &DaemonConfig) -> usize {
    let global = &config.global;
    let families = usize::from(global.network.enable_ipv4) + usize::from(global.network.enable_ipv6);
    let per_family = 2 * global.netio.endpoints_per_family + global.dispatch.dispatchers_per_family;
    families * per_family + 2
}

/// Check that limits make sense together. Returns the warnings it logged.
pub fn validate_resource_limits(config: &DaemonConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let global = &config.global;

    let long_running = long_running_tasks(config);
    if global.runtime.growth_threshold <= long_running {
        warnings.push(format!(
            "runtime.growth_threshold ({}) does not exceed the {} long-running tasks. \
             The pool will add a thread for almost every timer callback.",
            global.runtime.growth_threshold, long_running
        ));
    }

    if global.dispatch.dispatchers_per_family > global.netio.endpoints_per_family * 4 {
        warnings.push(format!(
            "dispatch.dispatchers_per_family ({}) is far above netio.endpoints_per_family ({}). \
             Most dispatchers will sit idle.",
            global.dispatch.dispatchers_per_family, global.netio.endpoints_per_family
        ));
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    warnings
}
