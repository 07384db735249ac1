//! Sentiment scoring seam
//!
//! The classifier only needs the sign of a score. Scorers are fallible and may
//! even panic; the classifier treats both as a neutral score.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("sentiment scorer failed: {0}")]
    Failed(String),
}

/// External sentiment classifier: positive score = positive message
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Result<i32, SentimentError>;
}

/// Word-valence scorer over a small AFINN-style lexicon
pub struct LexiconScorer {
    valences: HashMap<&'static str, i32>,
}

const LEXICON: &[(&str, i32)] = &[
    ("amazing", 4),
    ("awesome", 4),
    ("bad", -3),
    ("best", 3),
    ("better", 2),
    ("broken", -1),
    ("cool", 1),
    ("crap", -3),
    ("fail", -2),
    ("fantastic", 4),
    ("fun", 4),
    ("glad", 3),
    ("good", 3),
    ("great", 3),
    ("happy", 3),
    ("hate", -3),
    ("horrible", -3),
    ("like", 2),
    ("love", 3),
    ("nice", 3),
    ("no", -1),
    ("perfect", 3),
    ("sad", -2),
    ("sorry", -1),
    ("terrible", -3),
    ("thanks", 2),
    ("thank", 2),
    ("ugh", -2),
    ("ugly", -3),
    ("worst", -3),
    ("wrong", -2),
    ("yay", 2),
];

impl LexiconScorer {
    pub fn new() -> Self {
        LexiconScorer {
            valences: LEXICON.iter().copied().collect(),
        }
    }

    /// Extend or override the built-in lexicon
    pub fn with_word(mut self, word: &'static str, valence: i32) -> Self {
        self.valences.insert(word, valence);
        self
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Result<i32, SentimentError> {
        let score = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|word| !word.is_empty())
            .map(|word| {
                self.valences
                    .get(word.to_lowercase().as_str())
                    .copied()
                    .unwrap_or(0)
            })
            .sum();
        Ok(score)
    }
}
