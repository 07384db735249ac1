//! Core counter types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

/// Closed set of per-user, per-channel, per-hour counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterKind {
    /// One per non-empty message
    Messages,
    /// One per message with a positive sentiment score
    Positive,
    /// One per message with a negative sentiment score
    Negative,
    /// One per message containing an http(s) link
    Link,
    /// One per message containing an emoji shortcode, or per reaction
    Emoji,
    /// Running total of words across messages
    WordCount,
}

impl CounterKind {
    pub const ALL: [CounterKind; 6] = [
        CounterKind::Messages,
        CounterKind::Positive,
        CounterKind::Negative,
        CounterKind::Link,
        CounterKind::Emoji,
        CounterKind::WordCount,
    ];

    /// Name used in stored keys and query parameters
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Messages => "messages",
            CounterKind::Positive => "positive",
            CounterKind::Negative => "negative",
            CounterKind::Link => "link",
            CounterKind::Emoji => "emoji",
            CounterKind::WordCount => "word-count",
        }
    }

    /// Human readable description of what the counter measures
    pub fn describe(&self) -> &'static str {
        match self {
            CounterKind::Messages => "The number of messages seen in channel",
            CounterKind::Positive => {
                "The number of messages that had positive sentiment seen in channel"
            }
            CounterKind::Negative => {
                "The number of messages that had negative sentiment seen in channel"
            }
            CounterKind::Link => "The number of messages that contain an http link",
            CounterKind::Emoji => "The number of messages or reactions that contain an emoji",
            CounterKind::WordCount => "The number of words counted in the channel",
        }
    }

    /// Whether each qualifying event adds exactly 1
    pub fn is_unit_increment(&self) -> bool {
        !matches!(self, CounterKind::WordCount)
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CounterKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StatsError::UnknownCounter(s.to_string()))
    }
}

/// One stored counter: the value of `kind` for `user_id` in `channel_id`
/// during `hour`
///
/// `user_name` / `channel_name` are display fields filled in on read by the
/// identity resolver; they are never part of the stored key or value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub hour: String,
    pub kind: CounterKind,
    pub channel_id: String,
    pub user_id: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl DataPoint {
    pub fn new(
        hour: impl Into<String>,
        kind: CounterKind,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        value: i64,
    ) -> Self {
        DataPoint {
            hour: hour.into(),
            kind,
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            value,
            channel_name: None,
            user_name: None,
        }
    }

    /// Same tuple, different kind and value
    pub fn with_kind(&self, kind: CounterKind, value: i64) -> Self {
        DataPoint {
            kind,
            value,
            channel_name: None,
            user_name: None,
            ..self.clone()
        }
    }

    /// Resolved user name, or the raw ID when resolution failed
    pub fn display_user(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }

    /// Resolved channel name, or the raw ID when resolution failed
    pub fn display_channel(&self) -> &str {
        self.channel_name.as_deref().unwrap_or(&self.channel_id)
    }
}

/// Per-user sum of one counter over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumResp {
    pub user: String,
    pub sum: i64,
}

/// Share of a user's messages that incremented a counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentageResp {
    /// Name of the user
    pub user: String,
    /// Total number of messages used in the percent calculation
    pub total: i64,
    /// Total of the requested counter used in the percent calculation
    pub count: i64,
    /// floor(count / total * 100)
    #[serde(rename = "percentage")]
    pub percent: i64,
}
