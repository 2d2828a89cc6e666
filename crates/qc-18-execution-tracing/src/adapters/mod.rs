//! Adapters: store decorators, the in-memory store and span collectors.

pub mod collector;
pub mod gas_kv;
pub mod memory_store;
pub mod otel;
pub mod trace_kv;

pub use collector::{InMemoryCollector, NoopCollector};
pub use gas_kv::GasKvStore;
pub use memory_store::{MemKvStore, MemMultiStore};
pub use otel::OtelCollector;
pub use trace_kv::{
    StoreTraceBuffer, TraceKvStore, TraceOperation, TracedStoreEvent, TracingMultiStore,
    WritesOnlyKvStore,
};
