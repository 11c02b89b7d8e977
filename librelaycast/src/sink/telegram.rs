//! Telegram Bot API sink
//!
//! Posts go to one supergroup, each account's posts into its own forum
//! topic (`message_thread_id`).
//! Docs: <https://core.telegram.org/bots/api#sendmessage>

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::SinkError;
use crate::sink::{format_message, PostSink};
use crate::types::Post;

/// Every Bot API response has this shape, success or not
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, SinkError> {
        if self.ok {
            return Ok(self.result);
        }
        Err(SinkError::Rejected(format!(
            "{} {}",
            self.error_code.map(|c| c.to_string()).unwrap_or_default(),
            self.description.unwrap_or_else(|| "no description".to_string())
        )
        .trim()
        .to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct TelegramSink {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
    group_id: String,
}

impl TelegramSink {
    /// Every request is bounded by `timeout`, connect through body
    pub fn new(
        api_base: impl Into<String>,
        token: SecretString,
        group_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            group_id: group_id.into(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    /// Call a Bot API method; errors never carry the URL, which embeds the token
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        form: &[(&str, &str)],
    ) -> Result<Option<T>, SinkError> {
        debug!("Telegram {}", method);
        let response = self
            .http
            .post(self.method_url(method))
            .form(form)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SinkError::Network(e.without_url().to_string()))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body)
            .map_err(|e| SinkError::Decode(format!("{} ({}): {}", status.as_u16(), e, body)))?;

        parsed.into_result()
    }

    /// Post `text` (HTML) into a topic of the configured group
    pub async fn send_message(&self, topic_id: &str, text: &str) -> Result<(), SinkError> {
        let form = [
            ("chat_id", self.group_id.as_str()),
            ("message_thread_id", topic_id),
            ("text", text),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "false"),
        ];
        self.call::<serde_json::Value>("sendMessage", &form).await?;
        Ok(())
    }

    /// Identity of the bot, used to verify the token
    pub async fn get_me(&self) -> Result<BotInfo, SinkError> {
        self.call("getMe", &[])
            .await?
            .ok_or_else(|| SinkError::Decode("getMe returned no result".to_string()))
    }
}

#[async_trait]
impl PostSink for TelegramSink {
    async fn publish(&self, post: &Post, topic_id: &str) -> bool {
        info!(
            "Sending post {} to topic {} in group {}",
            post.id, topic_id, self.group_id
        );

        match self.send_message(topic_id, &format_message(post)).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send post {} to Telegram: {}", post.id, e);
                false
            }
        }
    }
}
