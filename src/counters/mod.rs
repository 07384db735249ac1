//! Counter data model, key codec and event classification

mod classifier;
mod ingest;
mod key_encoder;
mod sentiment;
mod types;

pub use classifier::{count_words, has_emoji, has_link, Classifier, CounterIncrement};
pub use ingest::{ChatEvent, Ingestor, MessageEvent, ReactionEvent};
pub use key_encoder::CounterKeyEncoder;
pub use sentiment::{LexiconScorer, SentimentError, SentimentScorer};
pub use types::{CounterKind, DataPoint, PercentageResp, SumResp};
