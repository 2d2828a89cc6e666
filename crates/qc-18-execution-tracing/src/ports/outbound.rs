//! Outbound ports: the store being observed and the span sink.

use std::sync::Arc;

use crate::domain::span::FinishedSpan;
use crate::errors::StoreError;

/// A key/value pair returned by range iteration.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Iteration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterOrder {
    Ascending,
    Descending,
}

/// One namespace of the key-value store.
///
/// Every store wrapper in this crate implements the full trait, so wrappers
/// compose in any order.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Entries with `start <= key < end`; `None` leaves a side open.
    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: IterOrder,
    ) -> Result<Vec<KvPair>, StoreError>;
}

/// A set of named key-value stores.
pub trait MultiStore: Send + Sync {
    fn kv_store(&self, namespace: &str) -> Result<Arc<dyn KvStore>, StoreError>;

    fn namespaces(&self) -> Vec<String>;
}

/// Receives spans once they are finished. Delivery is fire-and-forget.
pub trait SpanCollector: Send + Sync {
    fn collect(&self, span: FinishedSpan);
}
