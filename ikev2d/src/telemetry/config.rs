use serde::{Deserialize, Serialize};

/// Telemetry configuration.
///
/// Metrics are aggregated in-process and reported through the log; there is
/// no external collector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to metric summaries.
    pub service_name: String,

    /// Enable metrics aggregation (default: true).
    ///
    /// When disabled, `record_metric` is a no-op for the life of the process.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Seconds between metric summaries in the log (default: 60).
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_export_interval() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ikev2d".to_string(),
            enable_metrics: true,
            export_interval_secs: default_export_interval(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.service_name.is_empty() {
            errors.push("telemetry.service_name must not be empty".to_string());
        }
        if self.enable_metrics && self.export_interval_secs == 0 {
            errors.push("telemetry.export_interval_secs must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
