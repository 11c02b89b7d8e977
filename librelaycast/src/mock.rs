//! In-memory fakes for the relay's seams
//!
//! Compiled into every build (not only `cfg(test)`) so the integration
//! tests under `tests/` can drive the orchestrator and the fetcher without
//! network access or files. Each fake records how it was called; the
//! source and sink are cheap to clone and share their recordings, so a
//! test can keep a handle after boxing one into a [`crate::Relay`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{SourceError, StateError};
use crate::sink::PostSink;
use crate::source::{PostSource, RawPost, XApi};
use crate::state::{StateKey, StateResult, StateStore};
use crate::types::{Account, Post};

/// State store backed by a map, with injectable failures
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<StateKey, String>>,
    writes: Mutex<HashMap<StateKey, usize>>,
    failing_loads: Mutex<HashSet<StateKey>>,
    failing_stores: Mutex<HashSet<StateKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load of `key` fail with an I/O error
    pub fn fail_loads(&self, key: StateKey) {
        self.failing_loads.lock().unwrap().insert(key);
    }

    /// Make every store of `key` fail with an I/O error
    pub fn fail_stores(&self, key: StateKey) {
        self.failing_stores.lock().unwrap().insert(key);
    }

    /// Number of successful writes of `key`
    pub fn write_count(&self, key: StateKey) -> usize {
        self.writes.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    /// Raw record contents, bypassing injected failures
    pub fn raw(&self, key: StateKey) -> Option<String> {
        self.records.lock().unwrap().get(&key).cloned()
    }

    fn injected(key: StateKey, op: &str) -> StateError {
        StateError::Io(std::io::Error::other(format!(
            "injected {} failure for {}",
            op,
            key.file_name()
        )))
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: StateKey) -> StateResult<Option<String>> {
        if self.failing_loads.lock().unwrap().contains(&key) {
            return Err(Self::injected(key, "load"));
        }
        Ok(self.raw(key))
    }

    fn store(&self, key: StateKey, value: &str) -> StateResult<()> {
        if self.failing_stores.lock().unwrap().contains(&key) {
            return Err(Self::injected(key, "store"));
        }
        self.records.lock().unwrap().insert(key, value.to_string());
        *self.writes.lock().unwrap().entry(key).or_insert(0) += 1;
        Ok(())
    }
}

/// Post source serving fixed timelines
///
/// Behaves like the real fetcher's contract: already-processed ids are
/// filtered out and the remaining posts keep their order.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    timelines: Arc<Mutex<HashMap<String, Vec<Post>>>>,
    calls: Arc<Mutex<Vec<(String, HashSet<String>)>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append posts to an account's timeline
    pub fn add_posts(&self, handle: &str, posts: Vec<Post>) {
        self.timelines
            .lock()
            .unwrap()
            .entry(handle.to_string())
            .or_default()
            .extend(posts);
    }

    /// Every fetch so far: the handle and the processed ids it was given
    pub fn calls(&self) -> Vec<(String, HashSet<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Handles fetched so far, in order
    pub fn fetched_handles(&self) -> Vec<String> {
        self.calls().into_iter().map(|(handle, _)| handle).collect()
    }
}

#[async_trait]
impl PostSource for MockSource {
    async fn fetch_new(&self, account: &Account, processed: &HashSet<String>) -> Vec<Post> {
        self.calls
            .lock()
            .unwrap()
            .push((account.handle.clone(), processed.clone()));

        self.timelines
            .lock()
            .unwrap()
            .get(&account.handle)
            .map(|posts| {
                posts
                    .iter()
                    .filter(|post| !processed.contains(&post.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Sink that records every publish attempt
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish of `post_id`
    pub fn fail_post(&self, post_id: &str) {
        self.failing.lock().unwrap().insert(post_id.to_string());
    }

    /// Accept `post_id` again
    pub fn recover_post(&self, post_id: &str) {
        self.failing.lock().unwrap().remove(post_id);
    }

    /// Every attempt as (post id, topic id), including failed ones
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Ids of posts that were accepted
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostSink for MockSink {
    async fn publish(&self, post: &Post, topic_id: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push((post.id.clone(), topic_id.to_string()));

        if self.failing.lock().unwrap().contains(&post.id) {
            return false;
        }

        self.delivered.lock().unwrap().push(post.id.clone());
        true
    }
}

/// Scripted X API
///
/// Responses are queued and consumed one per call. An exhausted queue
/// answers with a 500 so a test that under-scripts fails loudly.
#[derive(Debug, Default)]
pub struct MockXApi {
    lookups: Mutex<VecDeque<Result<String, SourceError>>>,
    timelines: Mutex<VecDeque<Result<Vec<RawPost>, SourceError>>>,
    lookup_requests: Mutex<Vec<String>>,
    timeline_requests: Mutex<Vec<(String, u32)>>,
}

impl MockXApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_lookup(&self, response: Result<String, SourceError>) {
        self.lookups.lock().unwrap().push_back(response);
    }

    pub fn push_posts(&self, response: Result<Vec<RawPost>, SourceError>) {
        self.timelines.lock().unwrap().push_back(response);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookup_requests.lock().unwrap().len()
    }

    pub fn timeline_count(&self) -> usize {
        self.timeline_requests.lock().unwrap().len()
    }

    /// Timeline requests as (user id, max results)
    pub fn timeline_requests(&self) -> Vec<(String, u32)> {
        self.timeline_requests.lock().unwrap().clone()
    }

    fn unscripted() -> SourceError {
        SourceError::Api {
            status: 500,
            body: "no scripted response".to_string(),
        }
    }
}

#[async_trait]
impl XApi for MockXApi {
    async fn lookup_user_id(&self, handle: &str) -> Result<String, SourceError> {
        self.lookup_requests.lock().unwrap().push(handle.to_string());
        self.lookups
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted()))
    }

    async fn recent_posts(&self, user_id: &str, max_results: u32) -> Result<Vec<RawPost>, SourceError> {
        self.timeline_requests
            .lock()
            .unwrap()
            .push((user_id.to_string(), max_results));
        self.timelines
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted()))
    }
}
