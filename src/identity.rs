//! Identity resolution
//!
//! Maps chat channel/user IDs to display names and back. The listings come
//! from the chat client; this module only holds and queries them. Lookup
//! failures never fail a read: the data point keeps its raw IDs.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Span};

use crate::counters::DataPoint;
use crate::error::{Result, StatsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
}

/// Lookup of display names by ID and IDs by name
pub trait IdentityResolver: Send + Sync {
    fn channel_name(&self, id: &str) -> Result<String>;
    fn user_name(&self, id: &str) -> Result<String>;
    fn channel_id(&self, name: &str) -> Result<String>;
    fn user_id(&self, name: &str) -> Result<String>;

    /// Fill in the display fields of `dp`, returning the first lookup error
    ///
    /// Fields that resolve are set even when the other lookup fails.
    fn resolve(&self, dp: &mut DataPoint) -> Result<()> {
        let channel = self.channel_name(&dp.channel_id);
        let user = self.user_name(&dp.user_id);
        dp.channel_name = channel.as_ref().ok().cloned();
        dp.user_name = user.as_ref().ok().cloned();
        channel.and(user).map(|_| ())
    }
}

/// Resolver that knows no one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentityResolver for NoIdentity {
    fn channel_name(&self, id: &str) -> Result<String> {
        Err(StatsError::UnknownChannel(id.to_string()))
    }

    fn user_name(&self, id: &str) -> Result<String> {
        Err(StatsError::UnknownUser(id.to_string()))
    }

    fn channel_id(&self, name: &str) -> Result<String> {
        Err(StatsError::UnknownChannel(name.to_string()))
    }

    fn user_id(&self, name: &str) -> Result<String> {
        Err(StatsError::UnknownUser(name.to_string()))
    }
}

#[derive(Default)]
struct Listing {
    by_id: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

impl Listing {
    fn replace(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        self.by_id.clear();
        self.by_name.clear();
        for (id, name) in entries {
            self.by_name.insert(name.clone(), id.clone());
            self.by_id.insert(id, name);
        }
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// In-memory bidirectional directory of channels and users
pub struct IdentityDirectory {
    channels: RwLock<Listing>,
    users: RwLock<Listing>,
    span: Span,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        IdentityDirectory {
            channels: RwLock::new(Listing::default()),
            users: RwLock::new(Listing::default()),
            span: tracing::info_span!("identity"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Replace the whole channel listing
    pub fn replace_channels(&self, channels: Vec<ChannelInfo>) {
        let _enter = self.span.enter();
        let mut listing = self.channels.write();
        listing.replace(channels.into_iter().map(|c| {
            debug!(id = %c.id, name = %c.name, "found channel");
            (c.id, c.name)
        }));
        info!(count = listing.len(), "channel listing updated");
    }

    /// Replace the whole user listing
    pub fn replace_users(&self, users: Vec<UserInfo>) {
        let _enter = self.span.enter();
        let mut listing = self.users.write();
        listing.replace(users.into_iter().map(|u| {
            debug!(id = %u.id, name = %u.name, "found user");
            (u.id, u.name)
        }));
        info!(count = listing.len(), "user listing updated");
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

impl Default for IdentityDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver for IdentityDirectory {
    fn channel_name(&self, id: &str) -> Result<String> {
        self.channels
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StatsError::UnknownChannel(id.to_string()))
    }

    fn user_name(&self, id: &str) -> Result<String> {
        self.users
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| StatsError::UnknownUser(id.to_string()))
    }

    fn channel_id(&self, name: &str) -> Result<String> {
        self.channels
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| StatsError::UnknownChannel(name.to_string()))
    }

    fn user_id(&self, name: &str) -> Result<String> {
        self.users
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| StatsError::UnknownUser(name.to_string()))
    }
}
