//! Ports (hexagonal architecture boundaries).

pub mod outbound;

pub use outbound::{IterOrder, KvPair, KvStore, MultiStore, SpanCollector};
