//! OpenTelemetry bridge.
//!
//! Replays each finished span on the globally installed tracer provider with
//! its original ids, parent, virtual timestamps, tags and log fields. Exporter
//! and sampling setup belong to whoever installs the provider; without one,
//! the global no-op tracer swallows the spans.

use std::borrow::Cow;
use std::time::SystemTime;

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{
    Span as _, SpanContext as OtelSpanContext, Status, TraceContextExt, TraceFlags, TraceState,
    Tracer as _,
};
use opentelemetry::{Array, Context, KeyValue, StringValue, Value};

use crate::domain::span::{logs, FinishedSpan, TagValue};
use crate::ports::SpanCollector;

pub struct OtelCollector {
    tracer: BoxedTracer,
}

impl OtelCollector {
    pub fn new(service_name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tracer: global::tracer(service_name),
        }
    }
}

impl SpanCollector for OtelCollector {
    fn collect(&self, span: FinishedSpan) {
        let parent_cx = match span.parent {
            Some(parent) => Context::new().with_remote_span_context(OtelSpanContext::new(
                parent.trace_id,
                parent.span_id,
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            )),
            None => Context::new(),
        };

        let builder = self
            .tracer
            .span_builder(span.name.clone())
            .with_trace_id(span.context.trace_id)
            .with_span_id(span.context.span_id)
            .with_start_time(SystemTime::from(span.start_time))
            .with_attributes(span.tags.iter().map(|(k, v)| to_key_value(k, v)));
        let mut otel_span = self.tracer.build_with_context(builder, &parent_cx);

        for entry in &span.logs {
            otel_span.add_event_with_timestamp(
                entry.key.clone(),
                SystemTime::from(entry.timestamp),
                vec![KeyValue::new(entry.key.clone(), entry.value.clone())],
            );
        }
        if span.is_errored() {
            let description = span.log(logs::ERROR).unwrap_or_default().to_string();
            otel_span.set_status(Status::error(description));
        }
        otel_span.end_with_timestamp(SystemTime::from(span.finish_time));
    }
}

fn to_key_value(key: &str, value: &TagValue) -> KeyValue {
    let key = key.to_string();
    match value {
        TagValue::Str(s) => KeyValue::new(key, s.clone()),
        TagValue::Bool(b) => KeyValue::new(key, *b),
        TagValue::Int(i) => KeyValue::new(key, *i),
        TagValue::List(items) => KeyValue::new(
            key,
            Value::Array(Array::String(
                items.iter().cloned().map(StringValue::from).collect(),
            )),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_conversion() {
        let kv = to_key_value("sender", &TagValue::List(vec!["a".into(), "b".into()]));
        assert_eq!(kv.key.as_str(), "sender");
        assert_eq!(
            kv.value,
            Value::Array(Array::String(vec!["a".into(), "b".into()]))
        );

        let kv = to_key_value("height", &TagValue::Int(42));
        assert_eq!(kv.value, Value::I64(42));
    }
}
