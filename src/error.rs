//! Error taxonomy for the counter store
//!
//! Query input errors (`InvalidTimestamp`, `RangeInverted`) are surfaced to the
//! caller as-is. Codec errors (`MalformedKey`, `MalformedValue`) indicate corrupt
//! stored data. `StorageWriteFailed` is the only variant a caller may retry.

use thiserror::Error;

/// Errors produced by the time range, codec, store and query layers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// A non-empty hour label or chat timestamp did not parse
    #[error("'{field}' value '{value}' is not a valid timestamp")]
    InvalidTimestamp { field: &'static str, value: String },

    /// The resolved end hour precedes the start hour
    #[error("'end' ({end}) is before 'start' ({start})")]
    RangeInverted { start: String, end: String },

    /// A stored key did not split into exactly four components
    #[error("malformed counter key '{0}'")]
    MalformedKey(String),

    /// A stored value was not a non-negative base-10 integer
    #[error("malformed counter value '{value}' at key '{key}'")]
    MalformedValue { key: String, value: String },

    /// The engine could not be opened
    #[error("storage open failed: {0}")]
    StorageOpenFailed(String),

    /// The engine rejected a write
    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    /// A committed write could not be made durable
    ///
    /// The increments are already applied; retrying would count them twice.
    #[error("storage sync failed after commit: {0}")]
    StorageSyncFailed(String),

    /// The engine failed during a read or scan
    #[error("storage read failed: {0}")]
    StorageReadFailed(String),

    /// Counter name outside the closed set of kinds
    #[error("unknown counter '{0}'")]
    UnknownCounter(String),

    #[error("channel '{0}' not found")]
    UnknownChannel(String),

    #[error("user '{0}' not found")]
    UnknownUser(String),

    /// A fan-out worker panicked or was cancelled before finishing
    #[error("query aborted: {0}")]
    QueryAborted(String),

    #[error("config: {0}")]
    Config(String),
}

impl StatsError {
    /// Whether a caller may retry the failed operation (bounded, caller-side)
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatsError::StorageWriteFailed(_))
    }

    /// Whether the error points at corrupt persisted data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StatsError::MalformedKey(_) | StatsError::MalformedValue { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_write_failures_are_retryable() {
        assert!(StatsError::StorageWriteFailed("disk".into()).is_retryable());
        assert!(!StatsError::StorageReadFailed("disk".into()).is_retryable());
        assert!(!StatsError::StorageSyncFailed("fsync".into()).is_retryable());
        assert!(!StatsError::MalformedKey("a/b".into()).is_retryable());
        assert!(!StatsError::RangeInverted {
            start: "2006-01-02T15".into(),
            end: "2006-01-02T14".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_corruption_classification() {
        assert!(StatsError::MalformedKey("x".into()).is_corruption());
        assert!(StatsError::MalformedValue {
            key: "k".into(),
            value: "v".into()
        }
        .is_corruption());
        assert!(!StatsError::UnknownCounter("likes".into()).is_corruption());
    }

    #[test]
    fn test_display_messages() {
        let err = StatsError::InvalidTimestamp {
            field: "start",
            value: "yesterday".into(),
        };
        assert_eq!(
            err.to_string(),
            "'start' value 'yesterday' is not a valid timestamp"
        );
    }
}
