//! # Execution Context
//!
//! The per-call bundle of ambient dependencies threaded through the observed
//! state machine. Contexts are values: every `with_*` method returns a new
//! context and leaves the receiver untouched. Shared handles (store, gas
//! meter, event sink) are reference counted, so a derived context observes
//! the same underlying resources unless one is explicitly replaced.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::clock::BlockTimeClock;
use super::events::EventManager;
use super::gas::{GasMeter, InfiniteGasMeter};
use super::logger::Logger;
use super::span::SpanContext;
use crate::ports::MultiStore;

/// Block the execution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    pub time: DateTime<Utc>,
}

/// Ambient dependencies of one unit of work.
#[derive(Clone)]
pub struct ExecutionContext {
    header: BlockHeader,
    check_only: bool,
    simulation: bool,
    clock: Option<BlockTimeClock>,
    parent_span: Option<SpanContext>,
    deadline: Option<Instant>,
    store: Arc<dyn MultiStore>,
    gas_meter: Arc<dyn GasMeter>,
    events: EventManager,
    logger: Logger,
}

impl ExecutionContext {
    /// Root context for one inbound unit of work.
    pub fn new(store: Arc<dyn MultiStore>, header: BlockHeader, check_only: bool) -> Self {
        Self {
            header,
            check_only,
            simulation: false,
            clock: None,
            parent_span: None,
            deadline: None,
            store,
            gas_meter: Arc::new(InfiniteGasMeter::new()),
            events: EventManager::new(),
            logger: Logger::new(),
        }
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    pub fn header(&self) -> BlockHeader {
        self.header
    }

    /// True for cheap validation-only passes.
    pub fn is_check_only(&self) -> bool {
        self.check_only
    }

    /// True when the call site marked this execution as a simulation.
    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    pub fn multi_store(&self) -> Arc<dyn MultiStore> {
        Arc::clone(&self.store)
    }

    pub fn gas_meter(&self) -> Arc<dyn GasMeter> {
        Arc::clone(&self.gas_meter)
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the inherited deadline has passed. Never consulted by the engine.
    pub fn is_past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Span that nested traced calls attach to.
    pub fn parent_span(&self) -> Option<SpanContext> {
        self.parent_span
    }

    pub fn block_time_clock(&self) -> Option<BlockTimeClock> {
        self.clock
    }

    #[must_use]
    pub fn with_multi_store(&self, store: Arc<dyn MultiStore>) -> Self {
        Self {
            store,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_gas_meter(&self, gas_meter: Arc<dyn GasMeter>) -> Self {
        Self {
            gas_meter,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_event_manager(&self, events: EventManager) -> Self {
        Self {
            events,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_logger(&self, logger: Logger) -> Self {
        Self {
            logger,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_simulation(&self, simulation: bool) -> Self {
        Self {
            simulation,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    #[must_use]
    pub(crate) fn with_parent_span(&self, parent: SpanContext) -> Self {
        Self {
            parent_span: Some(parent),
            ..self.clone()
        }
    }

    /// Hand span-scoped resources still held by `self` back to `caller`.
    ///
    /// `scope` is the work context a span gave its unit of work. Any store,
    /// gas meter, event sink, logger or parent span that `self` still shares
    /// with `scope` is replaced by the caller's. Resources the unit of work
    /// installed itself are kept.
    #[must_use]
    pub(crate) fn restore_scope(
        &self,
        scope: &ExecutionContext,
        caller: &ExecutionContext,
    ) -> Self {
        let mut ctx = self.clone();
        if Arc::ptr_eq(&ctx.store, &scope.store) {
            ctx.store = caller.multi_store();
        }
        if Arc::ptr_eq(&ctx.gas_meter, &scope.gas_meter) {
            ctx.gas_meter = caller.gas_meter();
        }
        if ctx.events.same_sink(&scope.events) {
            ctx.events = caller.events.clone();
        }
        if ctx.logger.shares_capture(&scope.logger) {
            ctx.logger = caller.logger.clone();
        }
        if ctx.parent_span == scope.parent_span {
            ctx.parent_span = caller.parent_span;
        }
        ctx
    }

    /// Attach a block time clock unless one is already attached.
    ///
    /// Returns the context carrying the clock and the current virtual time.
    /// On first attachment the virtual time is exactly the block time; later
    /// calls reuse the attached clock, so all nested spans of one root
    /// invocation share a single time base.
    pub fn with_block_time_clock(
        &self,
        current_system_time: DateTime<Utc>,
    ) -> (Self, DateTime<Utc>) {
        if let Some(clock) = self.clock {
            return (self.clone(), clock.now(current_system_time));
        }
        let clock = BlockTimeClock::new(current_system_time, self.header.time);
        let ctx = Self {
            clock: Some(clock),
            ..self.clone()
        };
        (ctx, self.header.time)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("header", &self.header)
            .field("check_only", &self.check_only)
            .field("simulation", &self.simulation)
            .field("clock", &self.clock)
            .field("parent_span", &self.parent_span)
            .field("deadline", &self.deadline)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}
