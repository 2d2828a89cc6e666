//! Prometheus metrics for Subsystem 18.
//!
//! Naming follows the workspace convention `qc_<subsystem>_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::errors::TracingError;

lazy_static! {
    /// Registry for execution tracing metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Finished spans by operation
    pub static ref SPANS_FINISHED: CounterVec = CounterVec::new(
        Opts::new("qc_tracing_spans_finished_total", "Total spans finished by the execution tracer"),
        &["operation"]
    ).expect("metric creation failed");

    /// Spans whose unit of work failed
    pub static ref SPANS_ERRORED: CounterVec = CounterVec::new(
        Opts::new("qc_tracing_spans_errored_total", "Total traced units of work that returned an error"),
        &["operation"]
    ).expect("metric creation failed");

    /// Events forwarded from a span's isolated sink to its parent
    pub static ref EVENTS_FORWARDED: Counter = Counter::new(
        "qc_tracing_events_forwarded_total",
        "Total domain events forwarded to the parent event sink"
    ).expect("metric creation failed");
}

/// Register all metrics with the crate registry.
///
/// Metrics that are already registered are left as they are, so repeated
/// calls succeed.
pub fn register_metrics() -> Result<(), TracingError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SPANS_FINISHED.clone()),
        Box::new(SPANS_ERRORED.clone()),
        Box::new(EVENTS_FORWARDED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TracingError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TracingError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TracingError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TracingError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_encode() {
        register_metrics().unwrap();
        SPANS_FINISHED.with_label_values(&["metrics_test"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("qc_tracing_spans_finished_total"));
    }

    #[test]
    fn test_register_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
        assert_eq!(
            REGISTRY
                .gather()
                .iter()
                .filter(|mf| mf.get_name() == "qc_tracing_events_forwarded_total")
                .count(),
            1
        );
    }

    #[test]
    fn test_counter_increment() {
        SPANS_ERRORED.with_label_values(&["metrics_test"]).inc();
        assert!(SPANS_ERRORED.with_label_values(&["metrics_test"]).get() >= 1.0);
    }
}
