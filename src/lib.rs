//! Hourly chat-activity counters
//!
//! Chat events are classified into per-user, per-channel counters bucketed by
//! UTC hour and stored in an ordered key-value engine under
//! `<hour>/<kind>/<channel>/<user>` keys. Queries over a time window scan one
//! key prefix per hour bucket concurrently, then aggregate per user.
//!
//! ```no_run
//! use std::sync::Arc;
//! use channel_stats::{
//!     Classifier, CounterKind, FjallCounterStore, Ingestor, MessageEvent, NoIdentity,
//!     QueryEngine, StatsConfig,
//! };
//!
//! # async fn run() -> channel_stats::Result<()> {
//! let config = StatsConfig::load(None)?;
//! let store = Arc::new(FjallCounterStore::open(&config.store, Arc::new(NoIdentity))?);
//!
//! let ingestor = Ingestor::new(store.clone(), Classifier::default());
//! ingestor.handle_message(&MessageEvent {
//!     channel: "C1".into(),
//!     user: "U1".into(),
//!     text: "great work".into(),
//!     ts: "1521108251.000216".into(),
//! })?;
//!
//! let engine = QueryEngine::new(store, &config.query);
//! let range = engine.time_range(Some("2018-03-15T00"), Some("2018-03-15T23"))?;
//! let sums = engine.sum_by_user(&range, CounterKind::Positive, "C1").await?;
//! # let _ = sums;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod counters;
pub mod error;
pub mod identity;
pub mod logging;
pub mod store;
pub mod time_range;

pub use config::{QueryConfig, StatsConfig, StoreConfig};
pub use counters::{
    ChatEvent, Classifier, CounterKeyEncoder, CounterKind, DataPoint, Ingestor, LexiconScorer,
    MessageEvent, PercentageResp, ReactionEvent, SentimentScorer, SumResp,
};
pub use error::{Result, StatsError};
pub use identity::{ChannelInfo, IdentityDirectory, IdentityResolver, NoIdentity, UserInfo};
pub use store::{
    Aggregator, CounterStore, FanOutExecutor, FjallCounterStore, InMemoryCounterStore, NullStore,
    QueryEngine, QueryResponse,
};
pub use time_range::TimeRange;
