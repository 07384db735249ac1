//! Chat event ingestion
//!
//! Turns message and reaction events into counter increments and applies
//! them to a store. All counters of one event land in a single batch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, Span};

use super::classifier::{Classifier, CounterIncrement};
use super::types::DataPoint;
use crate::error::Result;
use crate::store::CounterStore;
use crate::time_range::hour_from_chat_timestamp;

/// A message posted to a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub channel: String,
    pub user: String,
    #[serde(default)]
    pub text: String,
    /// Chat timestamp, `"<epoch seconds>.<micros>"`
    pub ts: String,
}

/// An emoji reaction added to an item in a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub channel: String,
    pub user: String,
    #[serde(default)]
    pub reaction: String,
    pub event_ts: String,
}

/// Either event kind, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Message(MessageEvent),
    Reaction(ReactionEvent),
}

/// Applies classified chat events to a counter store
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn CounterStore>,
    classifier: Classifier,
    span: Span,
}

impl Ingestor {
    pub fn new(store: Arc<dyn CounterStore>, classifier: Classifier) -> Self {
        Ingestor {
            store,
            classifier,
            span: tracing::info_span!("ingestor"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn handle_event(&self, event: &ChatEvent) -> Result<usize> {
        match event {
            ChatEvent::Message(msg) => self.handle_message(msg),
            ChatEvent::Reaction(reaction) => self.handle_reaction(reaction),
        }
    }

    /// Returns the number of counters touched; empty text touches none
    pub fn handle_message(&self, msg: &MessageEvent) -> Result<usize> {
        let _enter = self.span.enter();
        let hour = hour_from_chat_timestamp(&msg.ts)?;
        if msg.text.is_empty() {
            debug!(channel = %msg.channel, user = %msg.user, "skipping empty message");
            return Ok(0);
        }

        let increments = self.classifier.classify_message(&msg.text);
        debug!(channel = %msg.channel, user = %msg.user, %hour, counters = increments.len(), "message");
        self.apply(&hour, &msg.channel, &msg.user, &increments)
    }

    pub fn handle_reaction(&self, reaction: &ReactionEvent) -> Result<usize> {
        let _enter = self.span.enter();
        let hour = hour_from_chat_timestamp(&reaction.event_ts)?;
        let increments = self.classifier.classify_reaction();
        debug!(channel = %reaction.channel, user = %reaction.user, %hour, reaction = %reaction.reaction, "reaction");
        self.apply(&hour, &reaction.channel, &reaction.user, &increments)
    }

    fn apply(
        &self,
        hour: &str,
        channel_id: &str,
        user_id: &str,
        increments: &[CounterIncrement],
    ) -> Result<usize> {
        let points: Vec<DataPoint> = increments
            .iter()
            .filter(|inc| inc.amount != 0)
            .map(|inc| DataPoint::new(hour, inc.kind, channel_id, user_id, inc.amount))
            .collect();
        self.store.increment_batch(&points)?;
        Ok(points.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterKind;
    use crate::error::StatsError;
    use crate::store::InMemoryCounterStore;

    // 2018-03-15T10:04:11Z
    const TS: &str = "1521108251.000216";
    const HOUR: &str = "2018-03-15T10";

    fn setup() -> (Arc<InMemoryCounterStore>, Ingestor) {
        let store = Arc::new(InMemoryCounterStore::default());
        let ingestor = Ingestor::new(store.clone(), Classifier::default());
        (store, ingestor)
    }

    fn message(text: &str) -> MessageEvent {
        MessageEvent {
            channel: "C1".into(),
            user: "U1".into(),
            text: text.into(),
            ts: TS.into(),
        }
    }

    fn counter(store: &InMemoryCounterStore, kind: CounterKind) -> Option<i64> {
        store.get(HOUR, kind, "C1", "U1").unwrap()
    }

    #[test]
    fn test_message_increments_counters() {
        let (store, ingestor) = setup();
        let touched = ingestor
            .handle_message(&message("see https://example.com :tada:"))
            .unwrap();
        assert_eq!(touched, 4);
        assert_eq!(counter(&store, CounterKind::Messages), Some(1));
        assert_eq!(counter(&store, CounterKind::Link), Some(1));
        assert_eq!(counter(&store, CounterKind::Emoji), Some(1));
        assert_eq!(counter(&store, CounterKind::WordCount), Some(3));
        assert_eq!(counter(&store, CounterKind::Positive), None);
    }

    #[test]
    fn test_repeated_messages_accumulate() {
        let (store, ingestor) = setup();
        ingestor.handle_message(&message("one two")).unwrap();
        ingestor.handle_message(&message("three")).unwrap();
        assert_eq!(counter(&store, CounterKind::Messages), Some(2));
        assert_eq!(counter(&store, CounterKind::WordCount), Some(3));
    }

    #[test]
    fn test_empty_message_ignored() {
        let (store, ingestor) = setup();
        assert_eq!(ingestor.handle_message(&message("")).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_whitespace_message_has_no_word_count() {
        let (store, ingestor) = setup();
        ingestor.handle_message(&message("  \t ")).unwrap();
        assert_eq!(counter(&store, CounterKind::Messages), Some(1));
        assert_eq!(counter(&store, CounterKind::WordCount), None);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let (store, ingestor) = setup();
        let mut msg = message("hello");
        msg.ts = "yesterday".into();
        assert!(matches!(
            ingestor.handle_message(&msg),
            Err(StatsError::InvalidTimestamp { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reaction_counts_emoji() {
        let (store, ingestor) = setup();
        let event: ChatEvent = serde_json::from_str(&format!(
            r#"{{"type":"reaction","channel":"C1","user":"U1","reaction":"thumbsup","event_ts":"{TS}"}}"#
        ))
        .unwrap();
        assert_eq!(ingestor.handle_event(&event).unwrap(), 1);
        assert_eq!(counter(&store, CounterKind::Emoji), Some(1));
    }

    #[test]
    fn test_message_event_from_json() {
        let event: ChatEvent = serde_json::from_str(
            r#"{"type":"message","channel":"C1","user":"U1","text":"hi","ts":"1521108251.000216"}"#,
        )
        .unwrap();
        assert_eq!(event, ChatEvent::Message(message("hi")));
    }
}
