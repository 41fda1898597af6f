//! Outbound chat notifications.
//!
//! The daemon composes notices and hands them to a [`ChatNotifier`]; which
//! provider (if any) sits behind the trait is a configuration detail. Every
//! notifier failure is soft: callers log a warning and move on, so question
//! and session state never depends on delivery.

use crate::error::{BellhopError, Result};
use crate::models::{GlobalConfig, Question};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub mod telegram;

pub use telegram::TelegramNotifier;

/// Chat-provider boundary used by the daemon.
///
/// Object-safe so the daemon holds `Arc<dyn ChatNotifier>` and tests can
/// substitute a recording double.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Deliver a newly asked question, preferably in its own thread.
    /// Returns the thread handle when one was created.
    async fn deliver_question(
        &self,
        question: &Question,
        session_label: &str,
    ) -> Result<Option<String>>;

    /// Send plain text to the default destination, or into an existing
    /// thread when `thread_id` is given.
    async fn send_message(&self, text: &str, thread_id: Option<&str>) -> Result<()>;

    /// Create a standalone thread and return its handle.
    async fn create_topic(&self, name: &str) -> Result<String>;
}

/// Notifier used when no provider is configured. Messages go to the debug
/// log and nowhere else; asking questions still works, they just have to be
/// answered through the CLI.
pub struct DisabledNotifier;

#[async_trait]
impl ChatNotifier for DisabledNotifier {
    async fn deliver_question(
        &self,
        question: &Question,
        session_label: &str,
    ) -> Result<Option<String>> {
        debug!(
            question_id = %question.id,
            %session_label,
            "notifications disabled, question not delivered"
        );
        Ok(None)
    }

    async fn send_message(&self, text: &str, _thread_id: Option<&str>) -> Result<()> {
        debug!(%text, "notifications disabled, message not delivered");
        Ok(())
    }

    async fn create_topic(&self, _name: &str) -> Result<String> {
        Err(BellhopError::Notify(
            "chat notifier is not configured".to_string(),
        ))
    }
}

/// Build the notifier described by the global config.
pub fn from_config(config: &GlobalConfig) -> Result<Arc<dyn ChatNotifier>> {
    if config.telegram.is_configured() {
        Ok(Arc::new(TelegramNotifier::new(&config.telegram)?))
    } else {
        Ok(Arc::new(DisabledNotifier))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewQuestion;

    fn question() -> Question {
        Question::new(NewQuestion {
            session_id: "sess-20260821-abcd".to_string(),
            title: "Deploy?".to_string(),
            body: "Ship the release branch?".to_string(),
            context: None,
            timeout_minutes: 60,
        })
    }

    #[tokio::test]
    async fn test_disabled_notifier_swallows_messages() {
        let notifier = DisabledNotifier;
        let thread = notifier
            .deliver_question(&question(), "proj/1")
            .await
            .unwrap();
        assert!(thread.is_none());
        notifier.send_message("hello", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_notifier_rejects_topics() {
        let notifier = DisabledNotifier;
        let err = notifier.create_topic("planning").await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_from_config_without_telegram_is_disabled() {
        let config = GlobalConfig::default();
        // Just checking it builds; the concrete type is behind the trait.
        assert!(from_config(&config).is_ok());
    }
}
