//! In-memory and no-op counter stores
//!
//! `InMemoryCounterStore` keeps encoded keys and values in an ordered map so
//! it scans exactly like the on-disk store. `NullStore` discards everything.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{accumulate, check_writable, decode_resolved, CounterStore};
use crate::counters::{CounterKeyEncoder, CounterKind, DataPoint};
use crate::error::{Result, StatsError};
use crate::identity::{IdentityResolver, NoIdentity};

/// Ordered in-memory store
pub struct InMemoryCounterStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    resolver: Arc<dyn IdentityResolver>,
    closed: AtomicBool,
}

impl InMemoryCounterStore {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        InMemoryCounterStore {
            entries: RwLock::new(BTreeMap::new()),
            resolver,
            closed: AtomicBool::new(false),
        }
    }

    /// Write a raw key/value pair, bypassing the codec
    pub fn insert_raw(&self, key: &[u8], value: &[u8]) {
        self.entries.write().insert(key.to_vec(), value.to_vec());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StatsError::StorageWriteFailed("store is closed".to_string()));
        }
        Ok(())
    }

    fn apply(entries: &mut BTreeMap<Vec<u8>, Vec<u8>>, dp: &DataPoint) -> Result<()> {
        let key = CounterKeyEncoder::encode(dp);
        let current = match entries.get(&key) {
            Some(value) => CounterKeyEncoder::decode_value(&key, value)?,
            None => 0,
        };
        let total = accumulate(&key, current, dp.value)?;
        entries.insert(key, CounterKeyEncoder::encode_value(total));
        Ok(())
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new(Arc::new(NoIdentity))
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, dp: &DataPoint) -> Result<()> {
        self.increment_batch(std::slice::from_ref(dp))
    }

    fn increment_batch(&self, points: &[DataPoint]) -> Result<()> {
        self.ensure_open()?;
        for dp in points {
            check_writable(dp)?;
        }

        let mut entries = self.entries.write();
        // Stage on a copy of the touched keys so a failure leaves no partial batch
        let mut staged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for dp in points.iter().filter(|dp| dp.value != 0) {
            let key = CounterKeyEncoder::encode(dp);
            if !staged.contains_key(&key) {
                if let Some(value) = entries.get(&key) {
                    staged.insert(key, value.clone());
                }
            }
            Self::apply(&mut staged, dp)?;
        }
        entries.extend(staged);
        Ok(())
    }

    fn get(
        &self,
        hour: &str,
        kind: CounterKind,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<i64>> {
        let key = CounterKeyEncoder::encode(&DataPoint::new(hour, kind, channel_id, user_id, 0));
        self.entries
            .read()
            .get(&key)
            .map(|value| CounterKeyEncoder::decode_value(&key, value))
            .transpose()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<DataPoint>> {
        self.entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| decode_resolved(key, value, self.resolver.as_ref()))
            .collect()
    }

    fn scan_all(&self) -> Result<Vec<DataPoint>> {
        self.entries
            .read()
            .iter()
            .map(|(key, value)| decode_resolved(key, value, self.resolver.as_ref()))
            .collect()
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Store that accepts every write and holds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl CounterStore for NullStore {
    fn increment(&self, _dp: &DataPoint) -> Result<()> {
        Ok(())
    }

    fn get(&self, _: &str, _: CounterKind, _: &str, _: &str) -> Result<Option<i64>> {
        Ok(None)
    }

    fn scan_prefix(&self, _prefix: &[u8]) -> Result<Vec<DataPoint>> {
        Ok(Vec::new())
    }

    fn scan_all(&self) -> Result<Vec<DataPoint>> {
        Ok(Vec::new())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityDirectory, UserInfo};

    const HOUR: &str = "2018-03-15T10";

    fn point(user: &str, value: i64) -> DataPoint {
        DataPoint::new(HOUR, CounterKind::Messages, "C1", user, value)
    }

    #[test]
    fn test_increment_accumulates() {
        let store = InMemoryCounterStore::default();
        store.increment(&point("U1", 1)).unwrap();
        store.increment(&point("U1", 4)).unwrap();
        assert_eq!(store.get(HOUR, CounterKind::Messages, "C1", "U1").unwrap(), Some(5));
        assert_eq!(store.get(HOUR, CounterKind::Messages, "C1", "U2").unwrap(), None);
    }

    #[test]
    fn test_zero_value_not_persisted() {
        let store = InMemoryCounterStore::default();
        store.increment(&point("U1", 0)).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_batch_with_repeated_key() {
        let store = InMemoryCounterStore::default();
        store
            .increment_batch(&[point("U1", 2), point("U2", 1), point("U1", 3)])
            .unwrap();
        assert_eq!(store.get(HOUR, CounterKind::Messages, "C1", "U1").unwrap(), Some(5));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_batch_leaves_no_partial_writes() {
        let store = InMemoryCounterStore::default();
        store.increment(&point("U1", 1)).unwrap();
        store.insert_raw(&CounterKeyEncoder::encode(&point("U2", 0)), b"garbage");

        let err = store
            .increment_batch(&[point("U1", 1), point("U2", 1)])
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(store.get(HOUR, CounterKind::Messages, "C1", "U1").unwrap(), Some(1));
    }

    #[test]
    fn test_scan_prefix_ordered_and_bounded() {
        let store = InMemoryCounterStore::default();
        store.increment(&point("U2", 1)).unwrap();
        store.increment(&point("U1", 1)).unwrap();
        store
            .increment(&DataPoint::new(HOUR, CounterKind::Messages, "C10", "U1", 7))
            .unwrap();

        let prefix = CounterKeyEncoder::prefix_for(HOUR, CounterKind::Messages, "C1");
        let users: Vec<_> = store
            .scan_prefix(&prefix)
            .unwrap()
            .into_iter()
            .map(|dp| dp.user_id)
            .collect();
        assert_eq!(users, vec!["U1", "U2"]);
        assert_eq!(store.scan_all().unwrap().len(), 3);
    }

    #[test]
    fn test_scan_prefix_empty() {
        let store = InMemoryCounterStore::default();
        let prefix = CounterKeyEncoder::prefix_for(HOUR, CounterKind::Link, "C1");
        assert!(store.scan_prefix(&prefix).unwrap().is_empty());
    }

    #[test]
    fn test_scan_resolves_names() {
        let directory = Arc::new(IdentityDirectory::new());
        directory.replace_users(vec![UserInfo {
            id: "U1".into(),
            name: "alice".into(),
        }]);
        let store = InMemoryCounterStore::new(directory);
        store.increment(&point("U1", 1)).unwrap();
        store.increment(&point("U2", 1)).unwrap();

        let points = store.scan_all().unwrap();
        assert_eq!(points[0].display_user(), "alice");
        assert_eq!(points[1].display_user(), "U2");
    }

    #[test]
    fn test_scan_surfaces_corruption() {
        let store = InMemoryCounterStore::default();
        store.insert_raw(b"2018-03-15T10/messages/C1", b"1");
        assert!(matches!(store.scan_all(), Err(StatsError::MalformedKey(_))));
    }

    #[test]
    fn test_closed_store_rejects_writes() {
        let store = InMemoryCounterStore::default();
        store.close().unwrap();
        let err = store.increment(&point("U1", 1)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_null_store() {
        let store = NullStore;
        store.increment(&point("U1", 1)).unwrap();
        assert!(store.scan_all().unwrap().is_empty());
        assert_eq!(store.get(HOUR, CounterKind::Messages, "C1", "U1").unwrap(), None);
    }
}
