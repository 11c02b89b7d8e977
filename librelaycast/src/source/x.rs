//! X API v2 client
//!
//! Only the read endpoints the relay needs: resolve a handle to a user id,
//! list a user's most recent posts, and `users/me` for credential checks.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::XCredentials;
use crate::error::SourceError;
use crate::source::oauth::OAuth1Signer;

/// A post as returned by the timeline endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct XUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

/// Envelope shared by v2 responses: `data` is absent when nothing matched,
/// in which case `errors` usually says why
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
struct Problem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl<T> Envelope<T> {
    fn problem_summary(&self) -> Option<String> {
        self.errors
            .iter()
            .find_map(|p| p.detail.clone().or_else(|| p.title.clone()))
    }
}

/// Upstream read operations consumed by the fetcher
#[async_trait]
pub trait XApi: Send + Sync {
    /// Resolve a handle to its permanent numeric user id (1 API call)
    async fn lookup_user_id(&self, handle: &str) -> Result<String, SourceError>;

    /// Most recent posts of a user, newest first as upstream returns them
    /// (1 API call)
    async fn recent_posts(&self, user_id: &str, max_results: u32) -> Result<Vec<RawPost>, SourceError>;
}

pub struct XClient {
    http: reqwest::Client,
    api_base: String,
    signer: OAuth1Signer,
}

impl XClient {
    /// Every request is bounded by `timeout`, connect through body
    pub fn new(
        api_base: impl Into<String>,
        credentials: XCredentials,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            signer: OAuth1Signer::new(credentials),
        })
    }

    /// The authenticated user, used to verify credentials
    pub async fn me(&self) -> Result<XUser, SourceError> {
        let envelope: Envelope<XUser> = self.get_json("/2/users/me", &[]).await?;
        let summary = envelope.problem_summary();
        envelope
            .data
            .ok_or_else(|| SourceError::Decode(summary.unwrap_or_else(|| "missing user data".to_string())))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.api_base, path);
        let authorization = self.signer.authorization("GET", &url, query)?;

        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        let reset = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        check_status(status, reset, &body)?;

        serde_json::from_str(&body).map_err(|e| SourceError::Decode(e.to_string()))
    }
}

/// Map a non-success status to the matching error kind
fn check_status(status: StatusCode, reset: Option<String>, body: &str) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimit(match reset {
            Some(reset) => format!("429 Too Many Requests (resets at {})", reset),
            None => "429 Too Many Requests".to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Authentication(format!("{} - {}", status.as_u16(), body))
        }
        _ => SourceError::Api {
            status: status.as_u16(),
            body: body.to_string(),
        },
    })
}

#[async_trait]
impl XApi for XClient {
    async fn lookup_user_id(&self, handle: &str) -> Result<String, SourceError> {
        let path = format!("/2/users/by/username/{}", urlencoding::encode(handle));
        let envelope: Envelope<XUser> = self.get_json(&path, &[]).await?;
        let summary = envelope.problem_summary();

        envelope.data.map(|user| user.id).ok_or_else(|| {
            SourceError::NotFound(summary.unwrap_or_else(|| format!("no user data for {}", handle)))
        })
    }

    async fn recent_posts(&self, user_id: &str, max_results: u32) -> Result<Vec<RawPost>, SourceError> {
        let path = format!("/2/users/{}/tweets", urlencoding::encode(user_id));
        let max_results = max_results.to_string();
        let query = [
            ("tweet.fields", "created_at,text"),
            ("max_results", max_results.as_str()),
        ];

        let envelope: Envelope<Vec<RawPost>> = self.get_json(&path, &query).await?;
        if envelope.data.is_none() {
            debug!(
                "Timeline for user {} has no data: {}",
                user_id,
                envelope.problem_summary().unwrap_or_default()
            );
        }
        Ok(envelope.data.unwrap_or_default())
    }
}
