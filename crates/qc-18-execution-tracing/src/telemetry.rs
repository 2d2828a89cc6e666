//! Process-level setup: log subscriber, metrics and the default engine.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::collector::NoopCollector;
use crate::adapters::otel::OtelCollector;
use crate::config::TracingConfig;
use crate::errors::TracingError;
use crate::metrics::register_metrics;
use crate::ports::SpanCollector;
use crate::service::ExecutionTracer;

/// Install the global `tracing` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &TracingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TracingError::SubscriberInit(e.to_string()))?;

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TracingError::SubscriberInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TracingError::SubscriberInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

/// Build the engine for `config`.
///
/// Spans go to the global OpenTelemetry tracer when tracing is enabled and
/// are discarded otherwise.
pub fn init_tracer(config: TracingConfig) -> Result<Arc<ExecutionTracer>, TracingError> {
    register_metrics()?;

    let collector: Arc<dyn SpanCollector> = if config.enabled {
        Arc::new(OtelCollector::new(config.service_name.clone()))
    } else {
        Arc::new(NoopCollector)
    };

    tracing::info!(
        enabled = config.enabled,
        disable_simulations = config.disable_simulations,
        service = %config.service_name,
        "Execution tracer initialized"
    );
    Ok(Arc::new(ExecutionTracer::new(Arc::new(config), collector)))
}
