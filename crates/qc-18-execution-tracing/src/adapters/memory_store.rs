//! In-memory multi-namespace store.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::StoreError;
use crate::ports::{IterOrder, KvPair, KvStore, MultiStore};

/// One ordered in-memory namespace.
#[derive(Debug, Default)]
pub struct MemKvStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: IterOrder,
    ) -> Result<Vec<KvPair>, StoreError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Ok(Vec::new());
            }
        }
        let lower = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
        let upper = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));

        let entries = self.entries.read();
        let iter = entries
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()));
        Ok(match order {
            IterOrder::Ascending => iter.collect(),
            IterOrder::Descending => iter.rev().collect(),
        })
    }
}

/// Named namespaces mounted up front.
#[derive(Debug, Default)]
pub struct MemMultiStore {
    stores: RwLock<BTreeMap<String, Arc<MemKvStore>>>,
}

impl MemMultiStore {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stores = namespaces
            .into_iter()
            .map(|ns| (ns.into(), Arc::new(MemKvStore::new())))
            .collect();
        Self {
            stores: RwLock::new(stores),
        }
    }

    /// Mount a namespace. Mounting an existing namespace keeps its contents.
    pub fn mount(&self, namespace: &str) {
        self.stores
            .write()
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemKvStore::new()));
    }
}

impl MultiStore for MemMultiStore {
    fn kv_store(&self, namespace: &str) -> Result<Arc<dyn KvStore>, StoreError> {
        self.stores
            .read()
            .get(namespace)
            .map(|s| Arc::clone(s) as Arc<dyn KvStore>)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))
    }

    fn namespaces(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let store = MemKvStore::new();
        store.set(b"foo", b"bar").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), Some(b"bar".to_vec()));
        assert!(store.has(b"foo").unwrap());

        store.delete(b"foo").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_range_bounds_and_order() {
        let store = MemKvStore::new();
        for k in [b"a", b"b", b"c", b"d"] {
            store.set(&k[..], &k[..]).unwrap();
        }

        let asc = store.range(Some(&b"b"[..]), Some(&b"d"[..]), IterOrder::Ascending).unwrap();
        assert_eq!(asc, vec![(b"b".to_vec(), b"b".to_vec()), (b"c".to_vec(), b"c".to_vec())]);

        let desc = store.range(None, None, IterOrder::Descending).unwrap();
        let keys: Vec<_> = desc.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        let reversed = store.range(Some(&b"d"[..]), Some(&b"a"[..]), IterOrder::Ascending);
        assert!(reversed.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_namespace() {
        let ms = MemMultiStore::new(["bank"]);
        assert!(ms.kv_store("bank").is_ok());
        assert_eq!(
            ms.kv_store("staking").err(),
            Some(StoreError::UnknownNamespace("staking".to_string()))
        );

        ms.mount("staking");
        assert_eq!(ms.namespaces(), vec!["bank".to_string(), "staking".to_string()]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let ms = MemMultiStore::new(["a", "b"]);
        ms.kv_store("a").unwrap().set(b"k", b"v").unwrap();
        assert_eq!(ms.kv_store("b").unwrap().get(b"k").unwrap(), None);
    }
}
