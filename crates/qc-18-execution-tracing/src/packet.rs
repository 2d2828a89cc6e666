//! Traced cross-module packet handling.
//!
//! ```text
//! packet_recv     (store: full)  ports, channels, memo, description, ack, relayer
//! packet_ack      (store: full)  ports, channels, ack, relayer
//! packet_timeout  (store: full)  ports, channels
//! ```

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use crate::domain::context::ExecutionContext;
use crate::domain::limits::TraceLimits;
use crate::domain::span::{logs, tags, Span};
use crate::service::{ExecutionTracer, StoreLogMode};

pub const PACKET_RECV: &str = "packet_recv";
pub const PACKET_ACK: &str = "packet_ack";
pub const PACKET_TIMEOUT: &str = "packet_timeout";

/// Recorded when a packet payload is neither a JSON object nor empty.
pub const UNIDENTIFIED_PACKET: &str = "unidentified";

/// A packet delivered between two module endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    pub data: Vec<u8>,
}

/// Acknowledgement written for a received packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acknowledgement {
    pub success: bool,
    pub data: Vec<u8>,
}

impl Acknowledgement {
    pub fn success(data: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            data: data.into(),
        }
    }

    pub fn error(data: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            data: data.into(),
        }
    }
}

/// Packet callbacks of a module.
pub trait PacketModule {
    type Error: fmt::Display;

    /// Failures are reported through the returned acknowledgement.
    fn on_recv_packet(
        &self,
        ctx: &ExecutionContext,
        packet: &Packet,
        relayer: &str,
    ) -> Acknowledgement;

    fn on_acknowledgement_packet(
        &self,
        ctx: &ExecutionContext,
        packet: &Packet,
        ack: &[u8],
        relayer: &str,
    ) -> Result<(), Self::Error>;

    fn on_timeout_packet(
        &self,
        ctx: &ExecutionContext,
        packet: &Packet,
        relayer: &str,
    ) -> Result<(), Self::Error>;
}

/// Traces the packet callbacks of one module.
pub struct TracePacketModule<P> {
    inner: P,
    module: String,
    tracer: Arc<ExecutionTracer>,
}

impl<P> TracePacketModule<P> {
    pub fn new(inner: P, module: &str, tracer: Arc<ExecutionTracer>) -> Self {
        Self {
            inner,
            module: module.to_string(),
            tracer,
        }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    fn is_traced(&self, ctx: &ExecutionContext) -> bool {
        let policy = self.tracer.policy();
        policy.is_enabled() && policy.is_traceable(ctx)
    }

    fn tag_packet(&self, span: &mut Span, packet: &Packet) {
        span.set_tag(tags::MODULE, self.module.as_str())
            .set_tag(tags::PACKET_SRC_PORT, packet.source_port.as_str())
            .set_tag(tags::PACKET_DEST_PORT, packet.destination_port.as_str())
            .set_tag(tags::PACKET_SRC_CHANNEL, packet.source_channel.as_str())
            .set_tag(tags::PACKET_DEST_CHANNEL, packet.destination_channel.as_str());
    }
}

impl<P: PacketModule> PacketModule for TracePacketModule<P> {
    type Error = P::Error;

    fn on_recv_packet(
        &self,
        root: &ExecutionContext,
        packet: &Packet,
        relayer: &str,
    ) -> Acknowledgement {
        if !self.is_traced(root) {
            return self.inner.on_recv_packet(root, packet, relayer);
        }

        let limits = *self.tracer.limits();
        let traced = self
            .tracer
            .run_traced(root, PACKET_RECV, StoreLogMode::Full, |work_ctx, span| {
                self.tag_packet(span, packet);
                let (memo, description) = describe_packet(&packet.data);
                span.log_field(logs::PACKET_MEMO, limits.safe_field(&memo));
                if !description.is_empty() {
                    span.log_field(
                        logs::PACKET_DESCRIPTION,
                        limits.capped_field(&description, limits.max_packet_description),
                    );
                }

                let ack = self.inner.on_recv_packet(work_ctx, packet, relayer);
                log_ack(span, &limits, &ack.data);
                span.log_field(logs::ACK_SUCCESS, ack.success.to_string());
                span.log_field(logs::RELAYER, limits.safe_field(relayer));
                Ok::<_, Infallible>(ack)
            });
        match traced {
            Ok(ack) => ack,
            Err(never) => match never {},
        }
    }

    fn on_acknowledgement_packet(
        &self,
        root: &ExecutionContext,
        packet: &Packet,
        ack: &[u8],
        relayer: &str,
    ) -> Result<(), Self::Error> {
        if !self.is_traced(root) {
            return self.inner.on_acknowledgement_packet(root, packet, ack, relayer);
        }

        let limits = *self.tracer.limits();
        self.tracer.run_traced(root, PACKET_ACK, StoreLogMode::Full, |work_ctx, span| {
            self.tag_packet(span, packet);
            log_ack(span, &limits, ack);
            span.log_field(logs::RELAYER, limits.safe_field(relayer));
            self.inner.on_acknowledgement_packet(work_ctx, packet, ack, relayer)
        })
    }

    fn on_timeout_packet(
        &self,
        root: &ExecutionContext,
        packet: &Packet,
        relayer: &str,
    ) -> Result<(), Self::Error> {
        if !self.is_traced(root) {
            return self.inner.on_timeout_packet(root, packet, relayer);
        }

        self.tracer.run_traced(root, PACKET_TIMEOUT, StoreLogMode::Full, |work_ctx, span| {
            self.tag_packet(span, packet);
            self.inner.on_timeout_packet(work_ctx, packet, relayer)
        })
    }
}

fn log_ack(span: &mut Span, limits: &TraceLimits, ack: &[u8]) {
    span.log_field(logs::ACK, limits.safe_field(&hex::encode(ack)));
}

/// Memo and description of a packet payload.
///
/// JSON object payloads yield their `memo` field and their compact JSON form.
/// Anything else is recorded as unidentified with no description.
fn describe_packet(data: &[u8]) -> (String, String) {
    match serde_json::from_slice::<serde_json::Value>(data) {
        Ok(serde_json::Value::Object(fields)) => {
            let memo = fields
                .get("memo")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            (memo, serde_json::Value::Object(fields).to_string())
        }
        _ => (UNIDENTIFIED_PACKET.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::collector::InMemoryCollector;
    use crate::adapters::memory_store::MemMultiStore;
    use crate::config::TracingConfig;
    use crate::domain::context::BlockHeader;
    use crate::domain::events::Event;
    use crate::domain::limits::TRUNCATION_MARKER;
    use crate::domain::span::TagValue;
    use chrono::Utc;

    struct TransferModule;

    impl PacketModule for TransferModule {
        type Error = String;

        fn on_recv_packet(
            &self,
            ctx: &ExecutionContext,
            packet: &Packet,
            _relayer: &str,
        ) -> Acknowledgement {
            ctx.event_manager().emit_event(Event::new("recv_packet"));
            match ctx.multi_store().kv_store("testing") {
                Ok(store) if store.set(&packet.sequence.to_be_bytes(), &packet.data).is_ok() => {
                    Acknowledgement::success(vec![1])
                }
                _ => Acknowledgement::error(b"store unavailable".to_vec()),
            }
        }

        fn on_acknowledgement_packet(
            &self,
            _ctx: &ExecutionContext,
            _packet: &Packet,
            ack: &[u8],
            _relayer: &str,
        ) -> Result<(), String> {
            if ack.is_empty() {
                return Err("empty acknowledgement".to_string());
            }
            Ok(())
        }

        fn on_timeout_packet(
            &self,
            ctx: &ExecutionContext,
            packet: &Packet,
            _relayer: &str,
        ) -> Result<(), String> {
            ctx.multi_store()
                .kv_store("testing")
                .and_then(|s| s.delete(&packet.sequence.to_be_bytes()))
                .map_err(|e| e.to_string())
        }
    }

    fn setup(config: TracingConfig) -> (TracePacketModule<TransferModule>, Arc<InMemoryCollector>) {
        let collector = Arc::new(InMemoryCollector::new());
        let tracer = Arc::new(ExecutionTracer::new(Arc::new(config), collector.clone()));
        (TracePacketModule::new(TransferModule, "transfer", tracer), collector)
    }

    fn ctx() -> ExecutionContext {
        let header = BlockHeader {
            height: 9,
            time: Utc::now(),
        };
        ExecutionContext::new(Arc::new(MemMultiStore::new(["testing"])), header, false)
    }

    fn packet(data: &[u8]) -> Packet {
        Packet {
            sequence: 1,
            source_port: "transfer".to_string(),
            source_channel: "channel-0".to_string(),
            destination_port: "transfer".to_string(),
            destination_channel: "channel-7".to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_recv_packet_span() {
        let (module, collector) = setup(TracingConfig::enabled());
        let root = ctx();

        let data = br#"{"amount":"5","memo":"hi"}"#;
        let ack = module.on_recv_packet(&root, &packet(data), "qc1relayer");
        assert_eq!(ack, Acknowledgement::success(vec![1]));
        assert_eq!(root.event_manager().len(), 1);

        let span = &collector.finished_spans()[0];
        assert_eq!(span.name, PACKET_RECV);
        assert_eq!(span.tag(tags::MODULE), Some(&TagValue::from("transfer")));
        assert_eq!(span.tag(tags::PACKET_DEST_CHANNEL), Some(&TagValue::from("channel-7")));
        assert_eq!(span.log(logs::PACKET_MEMO), Some("hi"));
        assert_eq!(
            span.log(logs::PACKET_DESCRIPTION),
            Some("{\"amount\":\"5\",\"memo\":\"hi\"}")
        );
        assert_eq!(span.log(logs::ACK), Some("01"));
        assert_eq!(span.log(logs::ACK_SUCCESS), Some("true"));
        assert_eq!(span.log(logs::RELAYER), Some("qc1relayer"));
        assert!(span.log(logs::RAW_STORE_IO).unwrap().contains("\"operation\":\"write\""));
    }

    #[test]
    fn test_unidentified_packet_has_no_description() {
        let (module, collector) = setup(TracingConfig::enabled());

        module.on_recv_packet(&ctx(), &packet(&[0xff, 0x00]), "qc1relayer");

        let span = &collector.finished_spans()[0];
        assert_eq!(span.log(logs::PACKET_MEMO), Some(UNIDENTIFIED_PACKET));
        assert!(span.log(logs::PACKET_DESCRIPTION).is_none());
    }

    #[test]
    fn test_packet_description_capped() {
        let config = TracingConfig {
            limits: TraceLimits {
                max_packet_description: 16,
                ..TraceLimits::default()
            },
            ..TracingConfig::enabled()
        };
        let (module, collector) = setup(config);
        let data = format!("{{\"memo\":\"\",\"payload\":\"{}\"}}", "a".repeat(200));

        module.on_recv_packet(&ctx(), &packet(data.as_bytes()), "qc1relayer");

        let description = collector.finished_spans()[0]
            .log(logs::PACKET_DESCRIPTION)
            .unwrap()
            .to_string();
        assert!(description.ends_with(TRUNCATION_MARKER));
        assert!(description.len() <= 16 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_ack_error_returned_unchanged() {
        let (module, collector) = setup(TracingConfig::enabled());

        let err = module
            .on_acknowledgement_packet(&ctx(), &packet(b"{}"), &[], "qc1relayer")
            .unwrap_err();
        assert_eq!(err, "empty acknowledgement");

        let span = &collector.finished_spans()[0];
        assert_eq!(span.name, PACKET_ACK);
        assert!(span.is_errored());
        assert_eq!(span.log(logs::ACK), Some(""));
    }

    #[test]
    fn test_timeout_span() {
        let (module, collector) = setup(TracingConfig::enabled());

        module.on_timeout_packet(&ctx(), &packet(b"{}"), "qc1relayer").unwrap();

        let span = &collector.finished_spans()[0];
        assert_eq!(span.name, PACKET_TIMEOUT);
        assert_eq!(span.tag(tags::PACKET_SRC_PORT), Some(&TagValue::from("transfer")));
        assert!(span.log(logs::RAW_STORE_IO).unwrap().contains("\"operation\":\"delete\""));
    }

    #[test]
    fn test_disabled_or_check_only_is_pass_through() {
        let (module, collector) = setup(TracingConfig::default());
        module.on_recv_packet(&ctx(), &packet(b"{}"), "qc1relayer");

        let (traced, traced_collector) = setup(TracingConfig::enabled());
        let header = BlockHeader {
            height: 9,
            time: Utc::now(),
        };
        let store = Arc::new(MemMultiStore::new(["testing"]));
        let check_ctx = ExecutionContext::new(store, header, true);
        traced.on_timeout_packet(&check_ctx, &packet(b"{}"), "qc1relayer").unwrap();

        assert!(collector.finished_spans().is_empty());
        assert!(traced_collector.finished_spans().is_empty());
    }
}
