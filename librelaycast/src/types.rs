//! Core types for Relaycast

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A watched upstream account and the chat topic its posts are routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Upstream handle, without the leading `@`
    pub handle: String,
    /// Destination topic (Telegram `message_thread_id`)
    pub topic_id: String,
}

impl Account {
    pub fn new(handle: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            topic_id: topic_id.into(),
        }
    }
}

/// A post fetched from upstream, ready to be forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub text: String,
    /// Handle of the account that authored the post
    pub account: String,
    /// Canonical permalink
    pub url: String,
}

impl Post {
    /// Build a post for `account`, deriving the x.com permalink from the id
    pub fn new(id: impl Into<String>, text: impl Into<String>, account: impl Into<String>) -> Self {
        let id = id.into();
        let account = account.into();
        let url = permalink(&account, &id);
        Self {
            id,
            text: text.into(),
            account,
            url,
        }
    }
}

/// Canonical permalink for a post
pub fn permalink(handle: &str, post_id: &str) -> String {
    format!("https://x.com/{}/status/{}", handle, post_id)
}

/// Post ids already forwarded, per account handle
///
/// Ids are kept in insertion order. Membership is all that matters for
/// deduplication; the order only makes the persisted record readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedSet(BTreeMap<String, Vec<String>>);

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids recorded for `handle`, as a set (empty if the account is unknown)
    pub fn ids_for(&self, handle: &str) -> HashSet<String> {
        self.0
            .get(handle)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, handle: &str, post_id: &str) -> bool {
        self.0
            .get(handle)
            .is_some_and(|ids| ids.iter().any(|id| id == post_id))
    }

    /// Append `post_id` to the account's record, creating the entry if needed
    pub fn record(&mut self, handle: &str, post_id: &str) {
        self.0
            .entry(handle.to_string())
            .or_default()
            .push(post_id.to_string());
    }

    pub fn get(&self, handle: &str) -> Option<&[String]> {
        self.0.get(handle).map(Vec::as_slice)
    }

    /// Total number of recorded ids across all accounts
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> From<[(&str, &[&str]); N]> for ProcessedSet {
    fn from(entries: [(&str, &[&str]); N]) -> Self {
        let mut set = ProcessedSet::new();
        for (handle, ids) in entries {
            let record = set.0.entry(handle.to_string()).or_default();
            record.extend(ids.iter().map(|id| id.to_string()));
        }
        set
    }
}

/// Resolved upstream user ids, keyed by handle. Entries never expire.
pub type UserIdCache = HashMap<String, String>;

/// Flags for a single orchestrated run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Poll every configured account, bypassing rotation
    pub force_all: bool,
    /// Do all bookkeeping but skip the outbound delivery
    pub dry_run: bool,
}

/// Outcome of a single orchestrated run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Posts delivered (or counted as delivered in a dry run)
    pub processed_count: usize,
    /// Posts whose delivery failed; they stay unrecorded for the next run
    pub failed_count: usize,
    /// Handles polled this run, in order
    pub polled: Vec<String>,
}
