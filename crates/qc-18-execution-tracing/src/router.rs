//! Traced message handling.
//!
//! Decorators for the two per-transaction entry points of the state machine:
//! the message handler and the ante handler that validates a transaction
//! before its messages run. Both forward to the wrapped handler untouched
//! when tracing is off or the execution is not traceable.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::domain::context::ExecutionContext;
use crate::domain::events::Event;
use crate::domain::limits::to_json;
use crate::domain::span::{logs, tags};
use crate::service::{ExecutionTracer, StoreLogMode};

pub const MSG_HANDLER: &str = "msg_handler";
pub const ANTE_HANDLER: &str = "ante_handler";

/// A message that can be described on a span.
pub trait TracedMsg: Serialize {
    /// Fully qualified type name, e.g. `/bank.MsgSend`.
    fn type_name(&self) -> String;

    /// Module the message is routed to.
    fn route(&self) -> Option<String> {
        None
    }

    fn signers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Result of a handled message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MsgResponse {
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
    pub events: Vec<Event>,
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub trait MsgHandler<M: TracedMsg> {
    type Error: fmt::Display;

    fn handle(&self, ctx: &ExecutionContext, msg: &M) -> Result<MsgResponse, Self::Error>;
}

/// Traces every handled message in a `msg_handler` span.
pub struct TraceMsgHandler<H> {
    inner: H,
    tracer: Arc<ExecutionTracer>,
}

impl<H> TraceMsgHandler<H> {
    pub fn new(inner: H, tracer: Arc<ExecutionTracer>) -> Self {
        Self { inner, tracer }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<M, H> MsgHandler<M> for TraceMsgHandler<H>
where
    M: TracedMsg,
    H: MsgHandler<M>,
{
    type Error = H::Error;

    fn handle(&self, root: &ExecutionContext, msg: &M) -> Result<MsgResponse, Self::Error> {
        let policy = self.tracer.policy();
        if !policy.is_enabled() || !policy.is_traceable(root) {
            return self.inner.handle(root, msg);
        }

        let limits = *self.tracer.limits();
        self.tracer
            .run_traced(root, MSG_HANDLER, StoreLogMode::Full, |work_ctx, span| {
                span.set_tag(tags::MODULE, msg.route().unwrap_or_else(|| "-".to_string()))
                    .set_tag(tags::MESSAGE_TYPE, msg.type_name())
                    .set_tag(tags::SENDER, msg.signers());
                span.log_field(
                    logs::RAW_MESSAGE,
                    limits.capped_field(&to_json(msg), limits.max_message_traced),
                );

                let response = self.inner.handle(work_ctx, msg)?;
                span.log_field(
                    logs::RAW_RESULT,
                    limits.capped_field(&to_json(&response), limits.max_message_traced),
                );
                Ok(response)
            })
    }
}

/// A transaction: its messages plus the raw bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx<M> {
    pub msgs: Vec<M>,
    pub bytes: Vec<u8>,
}

impl<M> Tx<M> {
    /// Uppercase hex SHA-256 of the raw bytes.
    pub fn hash(&self) -> String {
        hex::encode_upper(Sha256::digest(&self.bytes))
    }
}

pub trait AnteHandler<M: TracedMsg> {
    type Error: fmt::Display;

    /// Validate `tx` and return the context its messages run in.
    fn handle(
        &self,
        ctx: &ExecutionContext,
        tx: &Tx<M>,
        simulate: bool,
    ) -> Result<ExecutionContext, Self::Error>;
}

/// Traces the ante handler in an `ante_handler` span.
///
/// Only store writes are recorded; ante handlers read account state heavily.
/// The returned context carries the caller's store, gas meter, event sink,
/// logger and parent span wherever the wrapped handler passed the span's own
/// through, so work done after the span closes is not attributed to it.
pub struct TraceAnteHandler<H> {
    inner: H,
    tracer: Arc<ExecutionTracer>,
}

impl<H> TraceAnteHandler<H> {
    pub fn new(inner: H, tracer: Arc<ExecutionTracer>) -> Self {
        Self { inner, tracer }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<M, H> AnteHandler<M> for TraceAnteHandler<H>
where
    M: TracedMsg,
    H: AnteHandler<M>,
{
    type Error = H::Error;

    fn handle(
        &self,
        root: &ExecutionContext,
        tx: &Tx<M>,
        simulate: bool,
    ) -> Result<ExecutionContext, Self::Error> {
        let policy = self.tracer.policy();
        if !policy.is_enabled() || !policy.is_traceable_with(root, simulate) {
            return self.inner.handle(root, tx, simulate);
        }

        let ctx = root.with_simulation(simulate);
        let limits = *self.tracer.limits();
        self.tracer
            .run_traced(&ctx, ANTE_HANDLER, StoreLogMode::WritesOnly, |work_ctx, span| {
                let mut msg_types = Vec::with_capacity(tx.msgs.len());
                let mut senders = Vec::new();
                for msg in &tx.msgs {
                    msg_types.push(msg.type_name());
                    senders.extend(msg.signers());
                    span.log_field(
                        logs::RAW_MESSAGE,
                        limits.capped_field(&to_json(msg), limits.max_message_traced),
                    );
                }
                span.set_tag(tags::TX_HASH, tx.hash())
                    .set_tag(tags::MESSAGE_TYPE, deduplicate(msg_types))
                    .set_tag(tags::SENDER, deduplicate(senders))
                    .set_tag(tags::SIMULATION, simulate);

                let next = self.inner.handle(work_ctx, tx, simulate)?;
                Ok(next.restore_scope(work_ctx, &ctx))
            })
    }
}

/// Drop repeated entries, keeping first occurrences in order.
fn deduplicate(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
