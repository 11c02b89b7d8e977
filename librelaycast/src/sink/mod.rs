//! Downstream chat sink

use async_trait::async_trait;

use crate::types::Post;

pub mod telegram;

pub use telegram::{BotInfo, TelegramSink};

#[async_trait]
pub trait PostSink: Send + Sync {
    /// Deliver one post to `topic_id`
    ///
    /// True only on explicit acknowledgment from the destination. Failures
    /// are logged and reported as false; there is no retry here.
    async fn publish(&self, post: &Post, topic_id: &str) -> bool;
}

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Undo the entity encoding X applies to post text
///
/// X writes `&`, `<` and `>` as `&amp;`, `&lt;` and `&gt;`. `&amp;` goes
/// last so `&amp;lt;` decodes once, to `&lt;`.
pub fn decode_upstream_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Message body for a forwarded post (HTML parse mode)
pub fn format_message(post: &Post) -> String {
    format!(
        "<b>New post from @{}</b>\n\n{}\n\n{}",
        escape_html(&post.account),
        escape_html(&decode_upstream_entities(&post.text)),
        post.url
    )
}
