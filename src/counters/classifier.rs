//! Message classification
//!
//! Decides which counters a chat event increments. Pure apart from the
//! sentiment scorer, whose failures degrade to a neutral score.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{warn, Span};

use super::sentiment::{LexiconScorer, SentimentScorer};
use super::types::CounterKind;

/// A counter and the amount an event adds to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterIncrement {
    pub kind: CounterKind,
    pub amount: i64,
}

impl CounterIncrement {
    pub fn unit(kind: CounterKind) -> Self {
        CounterIncrement { kind, amount: 1 }
    }
}

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(http://|https://)").expect("link pattern is valid"));

static EMOJI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("emoji pattern is valid"));

/// True if the text contains an `http://` or `https://` scheme
pub fn has_link(text: &str) -> bool {
    LINK_RE.is_match(text)
}

/// True if the text contains a `:shortcode:` emoji
pub fn has_emoji(text: &str) -> bool {
    EMOJI_RE.is_match(text)
}

/// Count whitespace-delimited words (space, tab and newline separate words)
pub fn count_words(text: &str) -> i64 {
    let mut in_word = false;
    let mut count = 0;
    for byte in text.bytes() {
        if matches!(byte, b' ' | b'\n' | b'\t') {
            in_word = false;
        } else if !in_word {
            in_word = true;
            count += 1;
        }
    }
    count
}

/// Maps chat events to counter increments
#[derive(Clone)]
pub struct Classifier {
    scorer: Arc<dyn SentimentScorer>,
    span: Span,
}

impl Classifier {
    pub fn new(scorer: Arc<dyn SentimentScorer>) -> Self {
        Classifier {
            scorer,
            span: tracing::info_span!("classifier"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Sentiment score of `text`; scorer errors and panics yield 0
    pub fn sentiment(&self, text: &str) -> i32 {
        let _enter = self.span.enter();
        match catch_unwind(AssertUnwindSafe(|| self.scorer.score(text))) {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                warn!(error = %e, "sentiment scoring failed; treating as neutral");
                0
            }
            Err(_) => {
                warn!("sentiment scorer panicked; treating as neutral");
                0
            }
        }
    }

    /// Counters incremented by one message; empty text increments nothing
    pub fn classify_message(&self, text: &str) -> Vec<CounterIncrement> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut increments = vec![CounterIncrement::unit(CounterKind::Messages)];

        let score = self.sentiment(text);
        if score > 0 {
            increments.push(CounterIncrement::unit(CounterKind::Positive));
        } else if score < 0 {
            increments.push(CounterIncrement::unit(CounterKind::Negative));
        }

        if has_link(text) {
            increments.push(CounterIncrement::unit(CounterKind::Link));
        }
        if has_emoji(text) {
            increments.push(CounterIncrement::unit(CounterKind::Emoji));
        }

        let words = count_words(text);
        if words > 0 {
            increments.push(CounterIncrement {
                kind: CounterKind::WordCount,
                amount: words,
            });
        }
        increments
    }

    /// Counters incremented by one emoji reaction
    pub fn classify_reaction(&self) -> Vec<CounterIncrement> {
        vec![CounterIncrement::unit(CounterKind::Emoji)]
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Arc::new(LexiconScorer::new()))
    }
}
