//! Domain layer: the tracing context model and the observer decorators that
//! need no outbound adapter.

pub mod clock;
pub mod context;
pub mod events;
pub mod gas;
pub mod limits;
pub mod logger;
pub mod span;

pub use clock::{BlockTimeClock, ManualWallClock, SystemWallClock, VirtualClock, WallClock};
pub use context::{BlockHeader, ExecutionContext};
pub use events::{Event, EventAttribute, EventManager};
pub use gas::{
    BasicGasMeter, Gas, GasMeter, GasTrace, InfiniteGasMeter, KvGasConfig, TraceGasMeter,
};
pub use limits::{cut_length, to_json, TraceLimits, TRUNCATION_MARKER};
pub use logger::{LogCapture, Logger};
pub use span::{FinishedSpan, LogEntry, Span, SpanContext, TagValue};
