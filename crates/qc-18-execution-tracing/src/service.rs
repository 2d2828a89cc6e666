//! # Span Lifecycle Engine
//!
//! Opens a span for a named operation, runs the unit of work in a derived
//! context wired with fresh observers, records what the observers captured
//! and closes the span at virtual block time.
//!
//! ## Flow
//!
//! ```text
//! run_traced(ctx, "op", mode, work)
//!   1. attach BlockTimeClock (first attachment wins), start time
//!   2. open span, parent = ctx.parent_span(), tag height
//!   3. derive work context:
//!        store   -> TracingMultiStore (unless mode is Off)
//!        gas     -> TraceGasMeter(ctx gas meter)
//!        events  -> fresh EventManager
//!        logger  -> capturing logger
//!        parent  -> this span
//!   4. work(&work_ctx, &mut span)
//!   5. Err(e): log error.object, tag errored=true, keep e as is
//!   6. log raw_store_io (mode != Off), raw_events, logger_out, gas_usage
//!   7. forward captured events to ctx's event sink
//!   8. finish span at virtual time (immediately, or via SpanFinisher)
//! ```
//!
//! The derived context observes the same store and gas meter as the caller,
//! so toggling tracing never changes final state, events or gas accounting.

use std::fmt;
use std::sync::Arc;

use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};
use serde::Serialize;

use crate::adapters::trace_kv::TracingMultiStore;
use crate::config::TracingConfig;
use crate::domain::clock::{BlockTimeClock, SystemWallClock, VirtualClock, WallClock};
use crate::domain::context::ExecutionContext;
use crate::domain::events::EventManager;
use crate::domain::gas::{GasMeter, GasTrace, TraceGasMeter};
use crate::domain::limits::{to_json, TraceLimits};
use crate::domain::span::{logs, tags, Span, SpanContext};
use crate::metrics::{EVENTS_FORWARDED, SPANS_ERRORED, SPANS_FINISHED};
use crate::policy::TraceabilityPolicy;
use crate::ports::{MultiStore, SpanCollector};

/// How store access is recorded for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLogMode {
    /// Record reads and writes.
    Full,
    /// Record writes only.
    WritesOnly,
    /// Do not wrap the store.
    Off,
}

#[derive(Serialize)]
struct GasUsage<'a> {
    application: &'a [GasTrace],
    storage: &'a [GasTrace],
}

/// The tracing engine. One instance per process configuration.
pub struct ExecutionTracer {
    config: Arc<TracingConfig>,
    policy: TraceabilityPolicy,
    collector: Arc<dyn SpanCollector>,
    wall_clock: Arc<dyn WallClock>,
    ids: RandomIdGenerator,
}

impl ExecutionTracer {
    pub fn new(config: Arc<TracingConfig>, collector: Arc<dyn SpanCollector>) -> Self {
        Self {
            policy: TraceabilityPolicy::new(Arc::clone(&config)),
            config,
            collector,
            wall_clock: Arc::new(SystemWallClock),
            ids: RandomIdGenerator::default(),
        }
    }

    /// Read wall time from `wall_clock` instead of the system clock.
    #[must_use]
    pub fn with_wall_clock(mut self, wall_clock: Arc<dyn WallClock>) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    pub fn limits(&self) -> &TraceLimits {
        &self.config.limits
    }

    pub fn policy(&self) -> &TraceabilityPolicy {
        &self.policy
    }

    /// Run `work` inside a span and close the span before returning.
    ///
    /// The result of `work` is returned as is.
    pub fn run_traced<T, E, F>(
        &self,
        ctx: &ExecutionContext,
        operation: &str,
        mode: StoreLogMode,
        work: F,
    ) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce(&ExecutionContext, &mut Span) -> Result<T, E>,
    {
        let (result, finisher) = self.run_traced_async(ctx, operation, mode, work);
        finisher.finish();
        result
    }

    /// Like [`ExecutionTracer::run_traced`], but leaves the span open.
    ///
    /// The span is closed when the returned [`SpanFinisher`] is finished.
    pub fn run_traced_async<T, E, F>(
        &self,
        root: &ExecutionContext,
        operation: &str,
        mode: StoreLogMode,
        work: F,
    ) -> (Result<T, E>, SpanFinisher)
    where
        E: fmt::Display,
        F: FnOnce(&ExecutionContext, &mut Span) -> Result<T, E>,
    {
        let (ctx, start_time) = root.with_block_time_clock(self.wall_clock.now());
        let mut span = self.start_span(&ctx, operation, start_time);
        span.set_tag(tags::BLOCK_HEIGHT, ctx.block_height());

        let trace_store = Arc::new(TracingMultiStore::new(
            ctx.multi_store(),
            mode == StoreLogMode::WritesOnly,
        ));
        let mut work_ctx = ctx.clone();
        if mode != StoreLogMode::Off {
            let store: Arc<dyn MultiStore> = trace_store.clone();
            work_ctx = work_ctx.with_multi_store(store);
        }
        let events = EventManager::new();
        let (logger, captured_log) = ctx.logger().capturing();
        let gas_meter = Arc::new(TraceGasMeter::new(ctx.gas_meter()));
        let shadow: Arc<dyn GasMeter> = gas_meter.clone();
        let work_ctx = work_ctx
            .with_event_manager(events.clone())
            .with_logger(logger)
            .with_gas_meter(shadow)
            .with_parent_span(span.context());

        let result = work(&work_ctx, &mut span);
        let errored = result.is_err();
        if let Err(err) = &result {
            span.log_error(err);
            span.set_tag(tags::ERRORED, "true");
        }

        let limits = self.limits();
        if mode != StoreLogMode::Off {
            span.log_field(
                logs::RAW_STORE_IO,
                limits.safe_field(&trace_store.store_data_limited(limits.max_store_traced)),
            );
        }
        let captured_events = events.events();
        span.log_field(logs::RAW_EVENTS, limits.safe_field(&to_json(&captured_events)));
        span.log_field(
            logs::LOGGER_OUT,
            limits.capped_field(&captured_log.contents(), limits.max_logger_traced),
        );
        let application = gas_meter.traces();
        let storage = trace_store.gas_traces();
        let gas_usage = GasUsage {
            application: &application,
            storage: &storage,
        };
        span.log_field(logs::GAS_USAGE, limits.safe_field(&to_json(&gas_usage)));

        if !captured_events.is_empty() {
            EVENTS_FORWARDED.inc_by(captured_events.len() as f64);
            ctx.event_manager().emit_events(captured_events);
        }

        let finisher = SpanFinisher {
            span,
            collector: Arc::clone(&self.collector),
            errored,
        };
        (result, finisher)
    }

    fn start_span(
        &self,
        ctx: &ExecutionContext,
        operation: &str,
        start_time: chrono::DateTime<chrono::Utc>,
    ) -> Span {
        let parent = ctx.parent_span();
        let trace_id = parent.map_or_else(|| self.ids.new_trace_id(), |p| p.trace_id);
        let context = SpanContext {
            trace_id,
            span_id: self.ids.new_span_id(),
        };
        let block_clock = ctx
            .block_time_clock()
            .unwrap_or_else(|| BlockTimeClock::new(self.wall_clock.now(), start_time));
        let clock = VirtualClock::new(block_clock, Arc::clone(&self.wall_clock));
        Span::new(operation, context, parent, start_time, clock)
    }
}

impl fmt::Debug for ExecutionTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionTracer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Closes a span opened by [`ExecutionTracer::run_traced_async`].
#[must_use = "the span stays open until `finish` is called"]
pub struct SpanFinisher {
    span: Span,
    collector: Arc<dyn SpanCollector>,
    errored: bool,
}

impl SpanFinisher {
    pub fn span_context(&self) -> SpanContext {
        self.span.context()
    }

    /// Close the span at the current virtual time and hand it to the collector.
    pub fn finish(self) {
        let finished = self.span.finish();
        SPANS_FINISHED.with_label_values(&[&finished.name]).inc();
        if self.errored {
            SPANS_ERRORED.with_label_values(&[&finished.name]).inc();
        }
        tracing::debug!(
            operation = %finished.name,
            trace_id = %finished.context.trace_id,
            span_id = %finished.context.span_id,
            errored = self.errored,
            "span finished"
        );
        self.collector.collect(finished);
    }
}
