//! # Store Tracer
//!
//! Records store operations into a buffer owned by one span.
//!
//! ```text
//! TracingMultiStore::kv_store(ns)
//!   └─ TraceKvStore | WritesOnlyKvStore   (records into StoreTraceBuffer)
//!        └─ GasKvStore                    (charges the storage shadow meter)
//!             └─ parent namespace
//! ```
//!
//! In writes-only mode reads skip the recorder and go straight to the gas
//! wrapper; busy read paths would otherwise flood the buffer and its cap.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::gas_kv::GasKvStore;
use crate::domain::gas::{GasMeter, GasTrace, InfiniteGasMeter, KvGasConfig, TraceGasMeter};
use crate::domain::limits::{cut_length, to_json};
use crate::errors::StoreError;
use crate::ports::{IterOrder, KvPair, KvStore, MultiStore};

/// Kind of a recorded store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceOperation {
    Read,
    Write,
    Delete,
    IterKey,
    IterValue,
}

/// One recorded store operation. Keys and values are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracedStoreEvent {
    pub operation: TraceOperation,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub namespace: String,
}

impl TracedStoreEvent {
    fn new(operation: TraceOperation, namespace: &str, key: &[u8], value: Option<&[u8]>) -> Self {
        Self {
            operation,
            key: hex::encode(key),
            value: value.map(hex::encode),
            namespace: namespace.to_string(),
        }
    }
}

/// Span-scoped store trace. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct StoreTraceBuffer {
    events: Arc<Mutex<Vec<TracedStoreEvent>>>,
}

impl StoreTraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: TracedStoreEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<TracedStoreEvent> {
        self.events.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// One JSON line per event, capped at `max` bytes.
    pub fn dump(&self, max: usize) -> String {
        let lines: Vec<String> = self.events.lock().iter().map(to_json).collect();
        cut_length(&lines.join("\n"), max)
    }
}

/// Records every read and write.
pub struct TraceKvStore {
    parent: Arc<dyn KvStore>,
    buffer: StoreTraceBuffer,
    namespace: String,
}

impl TraceKvStore {
    pub fn new(parent: Arc<dyn KvStore>, buffer: StoreTraceBuffer, namespace: &str) -> Self {
        Self {
            parent,
            buffer,
            namespace: namespace.to_string(),
        }
    }

    fn record(&self, operation: TraceOperation, key: &[u8], value: Option<&[u8]>) {
        self.buffer
            .record(TracedStoreEvent::new(operation, &self.namespace, key, value));
    }
}

impl KvStore for TraceKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.parent.get(key)?;
        self.record(TraceOperation::Read, key, value.as_deref());
        Ok(value)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        let found = self.parent.has(key)?;
        self.record(TraceOperation::Read, key, None);
        Ok(found)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.record(TraceOperation::Write, key, Some(value));
        self.parent.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.record(TraceOperation::Delete, key, None);
        self.parent.delete(key)
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: IterOrder,
    ) -> Result<Vec<KvPair>, StoreError> {
        let entries = self.parent.range(start, end, order)?;
        for (key, value) in &entries {
            self.record(TraceOperation::IterKey, key, None);
            self.record(TraceOperation::IterValue, key, Some(value));
        }
        Ok(entries)
    }
}

/// Records writes only; reads go to `parent` untraced.
pub struct WritesOnlyKvStore {
    parent: Arc<dyn KvStore>,
    traced: TraceKvStore,
}

impl WritesOnlyKvStore {
    pub fn new(parent: Arc<dyn KvStore>, traced: TraceKvStore) -> Self {
        Self { parent, traced }
    }
}

impl KvStore for WritesOnlyKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.parent.get(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.parent.has(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.traced.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.traced.delete(key)
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: IterOrder,
    ) -> Result<Vec<KvPair>, StoreError> {
        self.parent.range(start, end, order)
    }
}

/// Multi-store that hands out traced namespaces.
///
/// Built fresh for every engine invocation; the buffer and the storage gas
/// meter are never shared between spans.
pub struct TracingMultiStore {
    parent: Arc<dyn MultiStore>,
    writes_only: bool,
    buffer: StoreTraceBuffer,
    gas_meter: Arc<TraceGasMeter>,
    gas_config: KvGasConfig,
}

impl TracingMultiStore {
    pub fn new(parent: Arc<dyn MultiStore>, writes_only: bool) -> Self {
        Self {
            parent,
            writes_only,
            buffer: StoreTraceBuffer::new(),
            gas_meter: Arc::new(TraceGasMeter::new(Arc::new(InfiniteGasMeter::new()))),
            gas_config: KvGasConfig::default(),
        }
    }

    pub fn buffer(&self) -> &StoreTraceBuffer {
        &self.buffer
    }

    /// Storage gas attributed to operations through this store.
    pub fn gas_traces(&self) -> Vec<GasTrace> {
        self.gas_meter.traces()
    }

    pub fn store_data_limited(&self, max: usize) -> String {
        self.buffer.dump(max)
    }
}

impl MultiStore for TracingMultiStore {
    fn kv_store(&self, namespace: &str) -> Result<Arc<dyn KvStore>, StoreError> {
        let parent = self.parent.kv_store(namespace)?;
        let gas_meter: Arc<dyn GasMeter> = self.gas_meter.clone();
        let gas_store: Arc<dyn KvStore> =
            Arc::new(GasKvStore::new(parent, gas_meter, self.gas_config));
        let traced = TraceKvStore::new(Arc::clone(&gas_store), self.buffer.clone(), namespace);
        if self.writes_only {
            return Ok(Arc::new(WritesOnlyKvStore::new(gas_store, traced)));
        }
        Ok(Arc::new(traced))
    }

    fn namespaces(&self) -> Vec<String> {
        self.parent.namespaces()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemMultiStore;

    fn parent() -> Arc<MemMultiStore> {
        Arc::new(MemMultiStore::new(["testing"]))
    }

    #[test]
    fn test_full_mode_records_reads_and_writes_in_order() {
        let ms = TracingMultiStore::new(parent(), false);
        let store = ms.kv_store("testing").unwrap();

        store.set(b"foo", b"bar").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), Some(b"bar".to_vec()));
        store.delete(b"foo").unwrap();

        let ops: Vec<_> = ms.buffer().events().iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![TraceOperation::Write, TraceOperation::Read, TraceOperation::Delete]
        );
        assert_eq!(ms.buffer().events()[1].value.as_deref(), Some("626172"));
        assert!(!ms.gas_traces().is_empty());
    }

    #[test]
    fn test_writes_only_mode_skips_reads() {
        let backing = parent();
        backing.kv_store("testing").unwrap().set(b"k", b"v").unwrap();

        let ms = TracingMultiStore::new(backing, true);
        let store = ms.kv_store("testing").unwrap();
        store.get(b"k").unwrap();
        store.has(b"k").unwrap();
        store.range(None, None, IterOrder::Ascending).unwrap();
        assert!(ms.buffer().is_empty());

        store.set(b"foo", b"bar").unwrap();
        store.get(b"foo").unwrap();
        let events = ms.buffer().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, TraceOperation::Write);
    }

    #[test]
    fn test_iteration_records_keys_and_values() {
        let backing = parent();
        backing.kv_store("testing").unwrap().set(b"a", b"1").unwrap();

        let ms = TracingMultiStore::new(backing, false);
        ms.kv_store("testing")
            .unwrap()
            .range(None, None, IterOrder::Ascending)
            .unwrap();

        let ops: Vec<_> = ms.buffer().events().iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![TraceOperation::IterKey, TraceOperation::IterValue]);
    }

    #[test]
    fn test_dump_format() {
        let ms = TracingMultiStore::new(parent(), false);
        ms.kv_store("testing").unwrap().set(b"foo", b"bar").unwrap();
        ms.kv_store("testing").unwrap().delete(b"foo").unwrap();

        assert_eq!(
            ms.store_data_limited(10_000),
            "{\"operation\":\"write\",\"key\":\"666f6f\",\"value\":\"626172\",\"namespace\":\"testing\"}\n\
             {\"operation\":\"delete\",\"key\":\"666f6f\",\"namespace\":\"testing\"}"
        );
    }

    #[test]
    fn test_storage_gas_does_not_reach_parent_state() {
        let backing = parent();
        let ms = TracingMultiStore::new(backing.clone(), false);
        ms.kv_store("testing").unwrap().set(b"foo", b"bar").unwrap();

        assert_eq!(
            backing.kv_store("testing").unwrap().get(b"foo").unwrap(),
            Some(b"bar".to_vec())
        );
        let traces = ms.gas_traces();
        assert_eq!(traces[0].descriptor, "WriteFlat");
        assert_eq!(traces[0].consumed_before, 0);
    }

    #[test]
    fn test_unknown_namespace_propagates() {
        let ms = TracingMultiStore::new(parent(), false);
        assert!(matches!(
            ms.kv_store("missing"),
            Err(StoreError::UnknownNamespace(_))
        ));
    }
}
