//! Tracing configuration from environment variables and node app options.
//!
//! The configuration is process-wide: it is loaded once at startup and then
//! shared by reference (`Arc<TracingConfig>`) with the policy and the engine.
//! Independent engines with independent flags can coexist, which is what the
//! tests rely on.

use std::collections::HashMap;
use std::env;

use crate::domain::limits::TraceLimits;
use crate::errors::TracingError;

/// App option enabling execution tracing.
pub const FLAG_TRACING_ENABLED: &str = "execution-tracing.open-tracing";

/// App option excluding simulations from tracing.
pub const FLAG_SIMULATION_TRACING_DISABLED: &str = "execution-tracing.disable-simulation-trace";

/// Configuration for execution tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Capture traces at all. Decorators are pass-through when false.
    pub enabled: bool,

    /// Do not trace simulated executions.
    pub disable_simulations: bool,

    /// Service name reported with collected spans
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Per-category caps for span log fields
    pub limits: TraceLimits,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            disable_simulations: false,
            service_name: "qc-18-execution-tracing".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            limits: TraceLimits::default(),
        }
    }
}

impl TracingConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_TRACING_ENABLED`: Capture traces (default: false)
    /// - `QC_TRACING_DISABLE_SIMULATIONS`: Skip simulations (default: false)
    /// - `OTEL_SERVICE_NAME`: Service name (default: qc-18-execution-tracing)
    /// - `QC_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `QC_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `QC_TRACE_MAX_STORE`, `QC_TRACE_MAX_MESSAGE`, `QC_TRACE_MAX_LOGGER`,
    ///   `QC_TRACE_MAX_PACKET`, `QC_TRACE_MAX_DEFAULT`: log field caps
    pub fn from_env() -> Self {
        let defaults = TraceLimits::default();

        Self {
            enabled: env_flag("QC_TRACING_ENABLED"),

            disable_simulations: env_flag("QC_TRACING_DISABLE_SIMULATIONS"),

            service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "qc-18-execution-tracing".to_string()),

            log_level: env::var("QC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env_flag("QC_JSON_LOGS"),

            limits: TraceLimits {
                max_store_traced: env_usize("QC_TRACE_MAX_STORE", defaults.max_store_traced),
                max_message_traced: env_usize("QC_TRACE_MAX_MESSAGE", defaults.max_message_traced),
                max_logger_traced: env_usize("QC_TRACE_MAX_LOGGER", defaults.max_logger_traced),
                max_packet_description: env_usize(
                    "QC_TRACE_MAX_PACKET",
                    defaults.max_packet_description,
                ),
                default_max_length: env_usize("QC_TRACE_MAX_DEFAULT", defaults.default_max_length),
            },
        }
    }

    /// Apply the node's app options on top of the defaults.
    ///
    /// Unlike [`TracingConfig::from_env`], a flag that is present but not a
    /// boolean is rejected.
    pub fn from_app_options(options: &HashMap<String, String>) -> Result<Self, TracingError> {
        let mut config = Self::default();
        if let Some(v) = options.get(FLAG_TRACING_ENABLED) {
            config.enabled = parse_bool(FLAG_TRACING_ENABLED, v)?;
        }
        if let Some(v) = options.get(FLAG_SIMULATION_TRACING_DISABLED) {
            config.disable_simulations = parse_bool(FLAG_SIMULATION_TRACING_DISABLED, v)?;
        }

        tracing::info!(
            enabled = config.enabled,
            disable_simulations = config.disable_simulations,
            "Execution tracing configured"
        );
        Ok(config)
    }

    /// Config with tracing switched on, everything else default.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

fn parse_bool(flag: &str, value: &str) -> Result<bool, TracingError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" | "" => Ok(false),
        other => Err(TracingError::Config(format!(
            "{flag}: unable to cast {other:?} to bool"
        ))),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert!(!config.enabled);
        assert!(!config.disable_simulations);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.limits.max_store_traced, 5_000);
        assert_eq!(config.limits.default_max_length, 10_000);
    }

    #[test]
    fn test_app_options_flags() {
        let mut options = HashMap::new();
        options.insert(FLAG_TRACING_ENABLED.to_string(), "true".to_string());
        options.insert(FLAG_SIMULATION_TRACING_DISABLED.to_string(), "1".to_string());

        let config = TracingConfig::from_app_options(&options).unwrap();
        assert!(config.enabled);
        assert!(config.disable_simulations);
    }

    #[test]
    fn test_app_options_absent_flags_keep_defaults() {
        let config = TracingConfig::from_app_options(&HashMap::new()).unwrap();
        assert_eq!(config, TracingConfig::default());
    }

    #[test]
    fn test_app_options_reject_non_bool() {
        let mut options = HashMap::new();
        options.insert(FLAG_TRACING_ENABLED.to_string(), "sometimes".to_string());

        let err = TracingConfig::from_app_options(&options).unwrap_err();
        assert!(matches!(err, TracingError::Config(_)));
        assert!(err.to_string().contains(FLAG_TRACING_ENABLED));
    }
}
