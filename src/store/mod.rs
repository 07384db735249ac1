//! Counter storage and retrieval
//!
//! `CounterStore` is the capability every store offers: atomic
//! increment-on-write, ordered prefix scans and full scans.
//!
//! Implementations:
//! - `FjallCounterStore`: production store over a fjall keyspace
//! - `InMemoryCounterStore`: ordered map, for tests
//! - `NullStore`: accepts writes and returns nothing
//!
//! Reads go through `FanOutExecutor` (one prefix scan per hour bucket) and
//! `Aggregator` (per-user sums and percentages).

mod aggregate;
mod fan_out;
mod fjall_store;
mod memory;

pub use aggregate::{join_percentages, sum_points, Aggregator, QueryEngine, QueryResponse, BASELINE_KIND};
pub use fan_out::{FanOutExecutor, DEFAULT_FAN_OUT_WORKERS, DEFAULT_RESULT_BUFFER};
pub use fjall_store::FjallCounterStore;
pub use memory::{InMemoryCounterStore, NullStore};

use tracing::debug;

use crate::counters::{CounterKeyEncoder, CounterKind, DataPoint};
use crate::error::{Result, StatsError};
use crate::identity::IdentityResolver;

/// Ordered, accumulate-on-write counter storage
pub trait CounterStore: Send + Sync + 'static {
    /// Add `dp.value` to the stored counter for `dp`'s tuple
    ///
    /// A missing key counts as zero. Zero-valued points are not persisted.
    fn increment(&self, dp: &DataPoint) -> Result<()>;

    /// Apply several increments as one unit
    fn increment_batch(&self, points: &[DataPoint]) -> Result<()> {
        for dp in points {
            self.increment(dp)?;
        }
        Ok(())
    }

    /// Current value of one counter, `None` when never incremented
    fn get(&self, hour: &str, kind: CounterKind, channel_id: &str, user_id: &str)
        -> Result<Option<i64>>;

    /// Every counter whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<DataPoint>>;

    /// Every counter in the store, in key order
    fn scan_all(&self) -> Result<Vec<DataPoint>>;

    /// Release the engine; called once during shutdown
    fn close(&self) -> Result<()>;
}

/// Reject tuples that cannot be encoded and negative values
pub(crate) fn check_writable(dp: &DataPoint) -> Result<()> {
    CounterKeyEncoder::validate(dp)?;
    if dp.value < 0 {
        return Err(StatsError::MalformedValue {
            key: String::from_utf8_lossy(&CounterKeyEncoder::encode(dp)).into_owned(),
            value: dp.value.to_string(),
        });
    }
    Ok(())
}

/// Sum an increment onto a stored value
pub(crate) fn accumulate(key: &[u8], current: i64, delta: i64) -> Result<i64> {
    current.checked_add(delta).ok_or_else(|| {
        StatsError::StorageWriteFailed(format!(
            "counter overflow at key '{}'",
            String::from_utf8_lossy(key)
        ))
    })
}

/// Decode a stored pair and attach display names
pub(crate) fn decode_resolved(
    key: &[u8],
    value: &[u8],
    resolver: &dyn IdentityResolver,
) -> Result<DataPoint> {
    let mut dp = CounterKeyEncoder::decode(key, value)?;
    if let Err(e) = resolver.resolve(&mut dp) {
        debug!(key = %String::from_utf8_lossy(key), error = %e, "while resolving data point ids");
    }
    Ok(dp)
}
