//! Global configuration model for user-level settings.
//!
//! The global config lives at `~/.bellhop/config.toml` and contains
//! user-level settings like the Telegram credentials and question defaults.

use serde::{Deserialize, Serialize};

use crate::question::DEFAULT_TIMEOUT_MINUTES;

/// Global configuration structure stored at ~/.bellhop/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    /// Telegram notifier settings. Left empty, the daemon runs with
    /// notifications disabled.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Question lifecycle defaults.
    #[serde(default)]
    pub questions: QuestionsConfig,
}

/// Telegram credentials and delivery options.
///
/// Both `bot_token` and `chat_id` must be set for the notifier to be
/// considered configured; a partially filled section is treated as disabled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Target chat id (a group or a private chat with the bot)
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Create a forum topic per question instead of posting to the main chat.
    /// Requires the target chat to be a forum-enabled supergroup.
    #[serde(default)]
    pub use_topics: bool,
}

impl TelegramConfig {
    /// Whether enough is configured to actually talk to Telegram.
    pub fn is_configured(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty()) && self.chat_id.is_some()
    }
}

/// Defaults applied to questions that don't specify their own values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    /// Minutes before an unanswered question times out
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: i64,
}

fn default_timeout_minutes() -> i64 {
    DEFAULT_TIMEOUT_MINUTES
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_global_config() {
        let config = GlobalConfig::default();
        assert!(config.telegram.bot_token.is_none());
        assert!(config.telegram.chat_id.is_none());
        assert!(!config.telegram.use_topics);
        assert_eq!(config.questions.default_timeout_minutes, 60);
    }

    #[test]
    fn test_telegram_is_configured() {
        let mut tg = TelegramConfig::default();
        assert!(!tg.is_configured());

        tg.bot_token = Some("123:abc".to_string());
        assert!(!tg.is_configured());

        tg.chat_id = Some(-1001234567890);
        assert!(tg.is_configured());

        tg.bot_token = Some(String::new());
        assert!(!tg.is_configured());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: GlobalConfig = toml::from_str(
            r#"
            [telegram]
            bot_token = "123:abc"
            chat_id = -1001234567890
            "#,
        )
        .unwrap();

        assert!(config.telegram.is_configured());
        assert!(!config.telegram.use_topics);
        assert_eq!(config.questions.default_timeout_minutes, 60);
    }

    #[test]
    fn test_parse_empty_toml() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert!(!config.telegram.is_configured());
        assert_eq!(config.questions.default_timeout_minutes, 60);
    }

    #[test]
    fn test_roundtrip() {
        let mut config = GlobalConfig::default();
        config.telegram.bot_token = Some("123:abc".to_string());
        config.telegram.chat_id = Some(42);
        config.telegram.use_topics = true;
        config.questions.default_timeout_minutes = 15;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: GlobalConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(parsed.telegram.chat_id, Some(42));
        assert!(parsed.telegram.use_topics);
        assert_eq!(parsed.questions.default_timeout_minutes, 15);
    }
}
