//! Span model.
//!
//! A [`Span`] is open while its unit of work runs; the engine turns it into a
//! [`FinishedSpan`] exactly once and hands that to the collector.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanId, TraceId};

use super::clock::VirtualClock;

/// Tag keys set by the engine and the call-site decorators.
pub mod tags {
    pub const MODULE: &str = "module";
    pub const ERRORED: &str = "errored";
    pub const MESSAGE_TYPE: &str = "message_type";
    pub const BLOCK_HEIGHT: &str = "height";
    pub const TX_HASH: &str = "tx";
    pub const SENDER: &str = "sender";
    pub const SIMULATION: &str = "simulation";
    pub const VALSET_UPDATE: &str = "valset_update";
    pub const QUERY_SERVICE: &str = "query_service";
    pub const PACKET_SRC_PORT: &str = "packet_src_port";
    pub const PACKET_DEST_PORT: &str = "packet_dest_port";
    pub const PACKET_SRC_CHANNEL: &str = "packet_src_channel";
    pub const PACKET_DEST_CHANNEL: &str = "packet_dest_channel";
}

/// Log field keys.
pub mod logs {
    pub const ERROR: &str = "error.object";
    pub const RAW_STORE_IO: &str = "raw_store_io";
    pub const RAW_EVENTS: &str = "raw_events";
    pub const LOGGER_OUT: &str = "logger_out";
    pub const GAS_USAGE: &str = "gas_usage";
    pub const RAW_MESSAGE: &str = "raw_message";
    pub const RAW_RESULT: &str = "raw_result";
    pub const VALSET_DIFF: &str = "valset_diff";
    pub const PACKET_MEMO: &str = "packet_memo";
    pub const PACKET_DESCRIPTION: &str = "packet_description";
    pub const ACK: &str = "ack";
    pub const ACK_SUCCESS: &str = "ack_success";
    pub const RELAYER: &str = "relayer";
}

/// Identity of a span within its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// Tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::List(items) => write!(f, "[{}]", items.join(" ")),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<Vec<String>> for TagValue {
    fn from(v: Vec<String>) -> Self {
        TagValue::List(v)
    }
}

/// One structured log field recorded on a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub value: String,
}

/// An open span.
#[derive(Debug)]
pub struct Span {
    name: String,
    context: SpanContext,
    parent: Option<SpanContext>,
    start_time: DateTime<Utc>,
    tags: BTreeMap<String, TagValue>,
    logs: Vec<LogEntry>,
    clock: VirtualClock,
}

impl Span {
    pub(crate) fn new(
        name: &str,
        context: SpanContext,
        parent: Option<SpanContext>,
        start_time: DateTime<Utc>,
        clock: VirtualClock,
    ) -> Self {
        Self {
            name: name.to_string(),
            context,
            parent,
            start_time,
            tags: BTreeMap::new(),
            logs: Vec::new(),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn parent(&self) -> Option<SpanContext> {
        self.parent
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Set a tag. A later value for the same key wins.
    pub fn set_tag(&mut self, key: &str, value: impl Into<TagValue>) -> &mut Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Append a log field stamped with the current virtual time.
    /// Callers cap the value; see [`crate::domain::limits`].
    pub fn log_field(&mut self, key: &str, value: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: self.clock.now().max(self.start_time),
            key: key.to_string(),
            value: value.into(),
        });
    }

    pub fn log_error(&mut self, err: &dyn fmt::Display) {
        self.log_field(logs::ERROR, err.to_string());
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Close the span at the current virtual time.
    pub(crate) fn finish(self) -> FinishedSpan {
        let finish_time = self.clock.now();
        FinishedSpan {
            name: self.name,
            context: self.context,
            parent: self.parent,
            start_time: self.start_time,
            finish_time: finish_time.max(self.start_time),
            tags: self.tags,
            logs: self.logs,
        }
    }
}

/// Everything recorded about a closed span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSpan {
    pub name: String,
    pub context: SpanContext,
    pub parent: Option<SpanContext>,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    pub tags: BTreeMap<String, TagValue>,
    pub logs: Vec<LogEntry>,
}

impl FinishedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Value of the first log field named `key`.
    pub fn log(&self, key: &str) -> Option<&str> {
        self.logs
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.tags.get(tags::ERRORED), Some(TagValue::Str(v)) if v == "true")
    }
}
