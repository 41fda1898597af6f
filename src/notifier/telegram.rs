//! Telegram implementation of the chat notifier.
//!
//! Talks to the Bot API directly over HTTPS (`sendMessage`,
//! `createForumTopic`). Thread handles are forum topic ids rendered as
//! strings. No formatting engine, no keyboards; answers come back through
//! `bellhop answer`.

use crate::error::{BellhopError, Result};
use crate::models::{Question, TelegramConfig};
use crate::notifier::ChatNotifier;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Hard Bot API limit per message.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Hard Bot API limit for forum topic names.
const MAX_TOPIC_CHARS: usize = 128;

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ForumTopic {
    message_thread_id: i64,
}

#[derive(Debug)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: i64,
    use_topics: bool,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BellhopError::Notify("telegram bot_token is not set".to_string()))?;
        let chat_id = config
            .chat_id
            .ok_or_else(|| BellhopError::Notify("telegram chat_id is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BellhopError::Notify(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", TELEGRAM_API_BASE, token),
            chat_id,
            use_topics: config.use_topics,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BellhopError::Notify(format!("telegram {} failed: {}", method, e)))?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            BellhopError::Notify(format!("telegram {} returned unreadable body: {}", method, e))
        })?;

        if !body.ok {
            return Err(BellhopError::Notify(format!(
                "telegram {} failed ({}): {}",
                method,
                status,
                body.description
                    .unwrap_or_else(|| "no description".to_string())
            )));
        }

        body.result.ok_or_else(|| {
            BellhopError::Notify(format!("telegram {} returned no result", method))
        })
    }

    fn send_payload(&self, text: &str, thread_id: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_message(text),
        });
        // Thread handles are opaque strings at the trait boundary; Telegram
        // wants the numeric topic id. A handle that doesn't parse goes to
        // the main chat rather than failing the send.
        if let Some(tid) = thread_id.and_then(|t| t.parse::<i64>().ok()) {
            payload["message_thread_id"] = serde_json::json!(tid);
        }
        payload
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn deliver_question(
        &self,
        question: &Question,
        session_label: &str,
    ) -> Result<Option<String>> {
        let text = compose_question_text(question, session_label);

        if self.use_topics {
            let topic = format!("[{}] {}", session_label, question.title);
            match self.create_topic(&topic).await {
                Ok(thread_id) => {
                    self.send_message(&text, Some(&thread_id)).await?;
                    return Ok(Some(thread_id));
                }
                Err(e) => {
                    warn!(error = %e, "could not create question topic, posting to main chat");
                }
            }
        }

        self.send_message(&text, None).await?;
        Ok(None)
    }

    async fn send_message(&self, text: &str, thread_id: Option<&str>) -> Result<()> {
        let payload = self.send_payload(text, thread_id);
        let _: serde_json::Value = self.call("sendMessage", &payload).await?;
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<String> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "name": truncate_topic_name(name),
        });
        let topic: ForumTopic = self.call("createForumTopic", &payload).await?;
        Ok(topic.message_thread_id.to_string())
    }
}

/// Chat text for a freshly asked question.
fn compose_question_text(question: &Question, session_label: &str) -> String {
    let mut text = format!(
        "❓ [{}] {}\n\n{}",
        session_label, question.title, question.body
    );
    if let Some(context) = question.context.as_deref() {
        if !context.is_empty() {
            text.push_str("\n\n");
            text.push_str(context);
        }
    }
    text.push_str(&format!(
        "\n\nAnswer with: bellhop answer {} <text>",
        question.id
    ));
    text
}

fn truncate_message(text: &str) -> String {
    truncate_chars(text, MAX_MESSAGE_CHARS)
}

fn truncate_topic_name(name: &str) -> String {
    truncate_chars(name, MAX_TOPIC_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('…');
    cut
}
