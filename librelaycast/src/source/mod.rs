//! Upstream post source
//!
//! [`PostSource`] is the seam the relay consumes: give it an account and the
//! ids already forwarded, get back the unseen posts. [`Fetcher`] is the real
//! implementation on top of any [`XApi`], adding the user-id cache and the
//! rate-limit backoff. Nothing fails past this boundary; every error ends up
//! as "no new posts" after being logged.

use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::XConfig;
use crate::error::SourceError;
use crate::state::{StateStore, StateStoreExt};
use crate::types::{Account, Post};

pub mod oauth;
pub mod x;

pub use x::{RawPost, XApi, XClient, XUser};

#[async_trait]
pub trait PostSource: Send + Sync {
    /// New posts from `account`, in upstream order, excluding `processed`
    async fn fetch_new(&self, account: &Account, processed: &HashSet<String>) -> Vec<Post>;
}

/// Tuning for [`Fetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Size of the recent-posts window
    pub max_results: u32,
    /// Attempts per upstream call when rate limited
    pub max_attempts: u32,
    /// Backoff before retry `n` (0-based) is `backoff_base * 2^n`
    pub backoff_base: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&XConfig::default())
    }
}

impl From<&XConfig> for FetchSettings {
    fn from(config: &XConfig) -> Self {
        Self {
            max_results: config.max_results,
            max_attempts: config.max_retries,
            backoff_base: config.backoff_base(),
        }
    }
}

pub struct Fetcher<A> {
    api: A,
    store: Arc<dyn StateStore>,
    settings: FetchSettings,
}

impl<A: XApi> Fetcher<A> {
    pub fn new(api: A, store: Arc<dyn StateStore>, settings: FetchSettings) -> Self {
        Self {
            api,
            store,
            settings,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Delay before retrying after the given 0-based attempt
    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op`, retrying only on rate limits
    ///
    /// Returns `None` once attempts are exhausted or on any other error.
    async fn with_backoff<T, F, Fut>(&self, what: &str, handle: &str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.settings.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) if e.is_rate_limit() && attempt + 1 < max_attempts => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "Rate limited during {} for {} (attempt {}/{}), waiting {:?} before retry",
                        what,
                        handle,
                        attempt + 1,
                        max_attempts,
                        wait
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    error!("Error during {} for {}: {}", what, handle, e);
                    return None;
                }
            }
        }

        None
    }

    /// Cached user id, or one lookup call whose result is then cached
    async fn resolve_user_id(&self, handle: &str) -> Option<String> {
        let cached = self
            .store
            .load_user_ids()
            .remove(handle)
            .filter(|id| !id.trim().is_empty());
        if let Some(user_id) = cached {
            info!("Using cached user ID for {}: {}", handle, user_id);
            return Some(user_id);
        }

        info!("No cached user ID for {}, looking it up (uses 1 API call)", handle);
        let user_id = self
            .with_backoff("user lookup", handle, || self.api.lookup_user_id(handle))
            .await?;

        match self.store.save_user_id(handle, &user_id) {
            Ok(()) => info!("User ID for {} cached: {}", handle, user_id),
            Err(e) => error!("Error saving user ID for {}: {}", handle, e),
        }

        Some(user_id)
    }
}

#[async_trait]
impl<A: XApi> PostSource for Fetcher<A> {
    async fn fetch_new(&self, account: &Account, processed: &HashSet<String>) -> Vec<Post> {
        let handle = account.handle.as_str();

        let Some(user_id) = self.resolve_user_id(handle).await else {
            return Vec::new();
        };

        info!("Fetching posts for {} (uses 1 API call)", handle);
        let max_results = self.settings.max_results;
        let Some(recent) = self
            .with_backoff("post fetch", handle, || self.api.recent_posts(&user_id, max_results))
            .await
        else {
            return Vec::new();
        };

        recent
            .into_iter()
            .filter(|raw| !processed.contains(&raw.id))
            .map(|raw| Post::new(raw.id, raw.text, handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryStore, MockXApi};

    fn settings() -> FetchSettings {
        FetchSettings {
            max_results: 5,
            max_attempts: 3,
            backoff_base: Duration::ZERO,
        }
    }

    fn raw(id: &str) -> RawPost {
        RawPost {
            id: id.to_string(),
            text: format!("post {}", id),
            created_at: None,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let fetcher = Fetcher::new(
            MockXApi::new(),
            Arc::new(MemoryStore::new()),
            FetchSettings {
                backoff_base: Duration::from_secs(5),
                ..settings()
            },
        );

        assert_eq!(fetcher.backoff(0), Duration::from_secs(5));
        assert_eq!(fetcher.backoff(1), Duration::from_secs(10));
        assert_eq!(fetcher.backoff(2), Duration::from_secs(20));
    }

    #[test]
    fn test_default_settings_follow_config_defaults() {
        let settings = FetchSettings::default();
        assert_eq!(settings.max_results, 5);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.backoff_base, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_filters_processed_and_keeps_order() {
        let api = MockXApi::new();
        api.push_lookup(Ok("42".to_string()));
        api.push_posts(Ok(vec![raw("t3"), raw("t2"), raw("t1")]));
        let fetcher = Fetcher::new(api, Arc::new(MemoryStore::new()), settings());

        let processed = HashSet::from(["t2".to_string()]);
        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &processed).await;

        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1"]);
        assert_eq!(posts[0].url, "https://x.com/acme/status/t3");
        assert_eq!(fetcher.api().timeline_requests(), vec![("42".to_string(), 5)]);
    }

    #[tokio::test]
    async fn test_cached_user_id_skips_lookup() {
        let store = Arc::new(MemoryStore::new());
        store.save_user_id("acme", "42").unwrap();

        let api = MockXApi::new();
        api.push_posts(Ok(vec![raw("t1")]));
        let fetcher = Fetcher::new(api, store, settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert_eq!(posts.len(), 1);
        assert_eq!(fetcher.api().lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_cached_user_id_is_looked_up_again() {
        let store = Arc::new(MemoryStore::new());
        store.save_user_id("acme", "").unwrap();

        let api = MockXApi::new();
        api.push_lookup(Ok("42".to_string()));
        api.push_posts(Ok(vec![raw("t1")]));
        let fetcher = Fetcher::new(api, store.clone(), settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert_eq!(posts.len(), 1);
        assert_eq!(fetcher.api().lookup_count(), 1);
        assert_eq!(fetcher.api().timeline_requests(), vec![("42".to_string(), 5)]);
        assert_eq!(store.load_user_ids().get("acme").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_lookup_result_is_cached() {
        let store = Arc::new(MemoryStore::new());
        let api = MockXApi::new();
        api.push_lookup(Ok("42".to_string()));
        api.push_posts(Ok(vec![]));
        let fetcher = Fetcher::new(api, store.clone(), settings());

        fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert_eq!(store.load_user_ids().get("acme").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_rate_limited_lookup_is_retried() {
        let api = MockXApi::new();
        api.push_lookup(Err(SourceError::RateLimit("429".to_string())));
        api.push_lookup(Ok("42".to_string()));
        api.push_posts(Ok(vec![raw("t1")]));
        let fetcher = Fetcher::new(api, Arc::new(MemoryStore::new()), settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert_eq!(posts.len(), 1);
        assert_eq!(fetcher.api().lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_exhausts_attempts() {
        let store = Arc::new(MemoryStore::new());
        store.save_user_id("acme", "42").unwrap();
        let api = MockXApi::new();
        for _ in 0..5 {
            api.push_posts(Err(SourceError::RateLimit("429".to_string())));
        }
        let fetcher = Fetcher::new(api, store, settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert!(posts.is_empty());
        assert_eq!(fetcher.api().timeline_count(), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let api = MockXApi::new();
        api.push_lookup(Err(SourceError::Api {
            status: 500,
            body: "oops".to_string(),
        }));
        api.push_lookup(Ok("42".to_string()));
        let store = Arc::new(MemoryStore::new());
        let fetcher = Fetcher::new(api, store.clone(), settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert!(posts.is_empty());
        assert_eq!(fetcher.api().lookup_count(), 1);
        assert_eq!(fetcher.api().timeline_count(), 0);
        assert!(store.load_user_ids().is_empty());
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_fetches() {
        let store = Arc::new(MemoryStore::new());
        store.fail_stores(crate::state::StateKey::UserIds);
        let api = MockXApi::new();
        api.push_lookup(Ok("42".to_string()));
        api.push_posts(Ok(vec![raw("t1")]));
        let fetcher = Fetcher::new(api, store, settings());

        let posts = fetcher.fetch_new(&Account::new("acme", "10"), &HashSet::new()).await;

        assert_eq!(posts.len(), 1);
    }
}
