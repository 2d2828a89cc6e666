//! # qc-18-execution-tracing
//!
//! Execution Tracing subsystem for Quantum-Chain.
//!
//! ## Role in System
//!
//! - **Observer**: Wraps units of state machine work in spans without changing
//!   their results, final state, emitted events or gas accounting
//! - **Deterministic Timestamps**: Spans are placed on block time, so replays of
//!   the same block produce the same span start times
//! - **Bounded Payloads**: Every span log field is capped
//!
//! ## Span Lifecycle
//!
//! ```text
//! caller ctx ──run_traced──→ [ExecutionTracer]
//!                               │ derive work ctx
//!                               │   store   → TracingMultiStore
//!                               │   gas     → TraceGasMeter
//!                               │   events  → fresh EventManager
//!                               │   logger  → capturing Logger
//!                               ↓
//!                           unit of work ──(nested run_traced → child spans)
//!                               │
//!                               ↓ log store I/O, events, logger output, gas
//!                           forward events to caller ctx
//!                               │
//!                               ↓
//!                        [SpanCollector] (in-memory, no-op, OpenTelemetry)
//! ```
//!
//! ## Call Sites
//!
//! | Decorator | Operation | Store mode |
//! |-----------|-----------|------------|
//! | `TraceModuleManager::begin_block` | `root_begin_block` / `module_begin_block` | off / writes only |
//! | `TraceModuleManager::end_block` | `abci_end_block` / `module_end_block` | off / writes only |
//! | `TraceMsgHandler` | `msg_handler` | full |
//! | `TraceAnteHandler` | `ante_handler` | writes only |
//! | `TracePacketModule` | `packet_recv` / `packet_ack` / `packet_timeout` | full |
//! | `TraceQueryService` | `query_service` | writes only |

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod packet;
pub mod policy;
pub mod ports;
pub mod query;
pub mod router;
pub mod service;
pub mod telemetry;

pub use adapters::*;
pub use config::{TracingConfig, FLAG_SIMULATION_TRACING_DISABLED, FLAG_TRACING_ENABLED};
pub use domain::*;
pub use errors::{GasError, LifecycleError, StoreError, TracingError};
pub use lifecycle::{
    BeginBlockResponse, BlockModule, EndBlockResponse, TraceModuleManager, ValidatorUpdate,
};
pub use packet::{Acknowledgement, Packet, PacketModule, TracePacketModule};
pub use policy::TraceabilityPolicy;
pub use ports::*;
pub use query::{QueryService, TraceQueryService};
pub use router::{
    AnteHandler, MsgHandler, MsgResponse, TraceAnteHandler, TraceMsgHandler, TracedMsg, Tx,
};
pub use service::{ExecutionTracer, SpanFinisher, StoreLogMode};
pub use telemetry::{init_logging, init_tracer};
