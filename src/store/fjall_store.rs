//! fjall-backed counter store
//!
//! All counters live in a single `counters` partition whose keys are produced
//! by `CounterKeyEncoder`, so a prefix scan over `<hour>/<kind>/<channel>/`
//! returns every user of that bucket in key order.
//!
//! Read-modify-write of a key is serialized by a striped lock picked from the
//! key hash. A batch takes all of its stripes in ascending index order before
//! reading, then commits every new value in one fjall batch.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use fnv::FnvHasher;
use parking_lot::Mutex;
use tracing::{debug, error, info, Span};

use super::{accumulate, check_writable, decode_resolved, CounterStore};
use crate::config::StoreConfig;
use crate::counters::{CounterKeyEncoder, CounterKind, DataPoint};
use crate::error::{Result, StatsError};
use crate::identity::IdentityResolver;

const COUNTERS_PARTITION: &str = "counters";

pub struct FjallCounterStore {
    keyspace: Keyspace,
    counters: PartitionHandle,
    stripes: Box<[Mutex<()>]>,
    resolver: Arc<dyn IdentityResolver>,
    sync_writes: bool,
    closed: AtomicBool,
    span: Span,
}

impl FjallCounterStore {
    /// Open (or create) the store under `config.data_dir`
    pub fn open(config: &StoreConfig, resolver: Arc<dyn IdentityResolver>) -> Result<Self> {
        let span = tracing::info_span!("store", data_dir = %config.data_dir.display());
        let enter = span.enter();

        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            StatsError::StorageOpenFailed(format!(
                "create data dir '{}': {}",
                config.data_dir.display(),
                e
            ))
        })?;
        let keyspace = fjall::Config::new(&config.data_dir)
            .open()
            .map_err(|e| StatsError::StorageOpenFailed(format!("open keyspace: {e}")))?;
        let counters = keyspace
            .open_partition(COUNTERS_PARTITION, PartitionCreateOptions::default())
            .map_err(|e| StatsError::StorageOpenFailed(format!("open partition: {e}")))?;

        let stripes = (0..config.lock_stripes.max(1))
            .map(|_| Mutex::new(()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(stripes = stripes.len(), sync_writes = config.sync_writes, "counter store opened");
        drop(enter);

        Ok(FjallCounterStore {
            keyspace,
            counters,
            stripes,
            resolver,
            sync_writes: config.sync_writes,
            closed: AtomicBool::new(false),
            span,
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn stripe_for(&self, key: &[u8]) -> usize {
        let mut hasher = FnvHasher::default();
        hasher.write(key);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// The batch is visible once committed, so a failed sync must not read
    /// as retryable
    fn sync_failed(e: impl std::fmt::Display) -> StatsError {
        StatsError::StorageSyncFailed(format!("while syncing journal: {e}"))
    }

    fn write_failed(key: &[u8], e: impl std::fmt::Display) -> StatsError {
        StatsError::StorageWriteFailed(format!(
            "while updating counter '{}': {}",
            String::from_utf8_lossy(key),
            e
        ))
    }
}

impl CounterStore for FjallCounterStore {
    fn increment(&self, dp: &DataPoint) -> Result<()> {
        self.increment_batch(std::slice::from_ref(dp))
    }

    fn increment_batch(&self, points: &[DataPoint]) -> Result<()> {
        let _enter = self.span.enter();
        if self.closed.load(Ordering::Acquire) {
            return Err(StatsError::StorageWriteFailed("store is closed".to_string()));
        }
        for dp in points {
            check_writable(dp)?;
        }

        // Merge repeated keys so each is read and written once
        let mut deltas: BTreeMap<Vec<u8>, i64> = BTreeMap::new();
        for dp in points.iter().filter(|dp| dp.value != 0) {
            let key = CounterKeyEncoder::encode(dp);
            let merged = accumulate(&key, deltas.get(&key).copied().unwrap_or(0), dp.value)?;
            deltas.insert(key, merged);
        }
        if deltas.is_empty() {
            return Ok(());
        }

        let mut stripe_ids: Vec<usize> = deltas.keys().map(|k| self.stripe_for(k)).collect();
        stripe_ids.sort_unstable();
        stripe_ids.dedup();
        let _guards: Vec<_> = stripe_ids.iter().map(|&i| self.stripes[i].lock()).collect();

        let mut batch = self.keyspace.batch();
        for (key, delta) in &deltas {
            let current = match self.counters.get(key) {
                Ok(Some(value)) => CounterKeyEncoder::decode_value(key, &value)?,
                Ok(None) => 0,
                Err(e) => return Err(Self::write_failed(key, e)),
            };
            let total = accumulate(key, current, *delta)?;
            batch.insert(&self.counters, key.clone(), CounterKeyEncoder::encode_value(total));
        }

        batch.commit().map_err(|e| {
            error!(error = %e, keys = deltas.len(), "counter batch commit failed");
            StatsError::StorageWriteFailed(format!("while committing counter batch: {e}"))
        })?;
        if self.sync_writes {
            self.keyspace.persist(PersistMode::SyncAll).map_err(|e| {
                error!(error = %e, keys = deltas.len(), "journal sync failed after commit");
                Self::sync_failed(e)
            })?;
        }
        debug!(keys = deltas.len(), "counters incremented");
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
        match self.counters.get(&key) {
            Ok(Some(value)) => CounterKeyEncoder::decode_value(&key, &value).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StatsError::StorageReadFailed(format!(
                "while fetching counter '{}': {}",
                String::from_utf8_lossy(&key),
                e
            ))),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<DataPoint>> {
        let _enter = self.span.enter();
        let mut results = Vec::new();
        for item in self.counters.prefix(prefix) {
            let (key, value) = item.map_err(|e| {
                StatsError::StorageReadFailed(format!(
                    "while scanning prefix '{}': {}",
                    String::from_utf8_lossy(prefix),
                    e
                ))
            })?;
            results.push(decode_resolved(&key, &value, self.resolver.as_ref())?);
        }
        Ok(results)
    }

    fn scan_all(&self) -> Result<Vec<DataPoint>> {
        let _enter = self.span.enter();
        let mut results = Vec::new();
        for item in self.counters.iter() {
            let (key, value) = item
                .map_err(|e| StatsError::StorageReadFailed(format!("while scanning store: {e}")))?;
            results.push(decode_resolved(&key, &value, self.resolver.as_ref())?);
        }
        Ok(results)
    }

    fn close(&self) -> Result<()> {
        let _enter = self.span.enter();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(Self::sync_failed)?;
        info!("counter store closed");
        Ok(())
    }
}
