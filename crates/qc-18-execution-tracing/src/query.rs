//! Traced query services.
//!
//! Queries do not go through the state machine's check/deliver phases, so the
//! only gate is whether tracing is enabled at all.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::context::ExecutionContext;
use crate::domain::limits::to_json;
use crate::domain::span::{logs, tags};
use crate::service::{ExecutionTracer, StoreLogMode};

pub const QUERY_SERVICE: &str = "query_service";

/// A query endpoint answering one request type.
pub trait QueryService<Req> {
    type Response: Serialize;
    type Error: fmt::Display;

    fn call(&self, ctx: &ExecutionContext, req: &Req) -> Result<Self::Response, Self::Error>;
}

/// Traces every call of one query method in a `query_service` span.
pub struct TraceQueryService<S> {
    inner: S,
    method: String,
    tracer: Arc<ExecutionTracer>,
}

impl<S> TraceQueryService<S> {
    /// `method` is the fully qualified method name, e.g. `/bank.Query/Balance`.
    pub fn new(inner: S, method: &str, tracer: Arc<ExecutionTracer>) -> Self {
        Self {
            inner,
            method: method.to_string(),
            tracer,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<Req, S> QueryService<Req> for TraceQueryService<S>
where
    S: QueryService<Req>,
{
    type Response = S::Response;
    type Error = S::Error;

    fn call(&self, root: &ExecutionContext, req: &Req) -> Result<Self::Response, Self::Error> {
        if !self.tracer.policy().is_enabled() {
            return self.inner.call(root, req);
        }

        let limits = *self.tracer.limits();
        self.tracer
            .run_traced(root, QUERY_SERVICE, StoreLogMode::WritesOnly, |work_ctx, span| {
                span.set_tag(tags::QUERY_SERVICE, self.method.as_str());
                let response = self.inner.call(work_ctx, req)?;
                span.log_field(
                    logs::RAW_RESULT,
                    limits.capped_field(&to_json(&response), limits.max_message_traced),
                );
                Ok(response)
            })
    }
}
