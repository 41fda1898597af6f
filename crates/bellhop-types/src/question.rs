use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Default timeout applied when a question is asked without one.
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 60;

/// Question status enum representing the lifecycle states of a blocking question.
///
/// `pending` is the only non-terminal state; every transition out of it is
/// final. A question never re-enters `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Answered,
    TimedOut,
    Cancelled,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status ends the question's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for QuestionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(QuestionStatus::Pending),
            "answered" => Ok(QuestionStatus::Answered),
            "timed_out" => Ok(QuestionStatus::TimedOut),
            "cancelled" => Ok(QuestionStatus::Cancelled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A blocking question asked by an agent session and routed to a human
/// through the chat channel.
///
/// Questions are persisted in the daemon's question store so a pending
/// question survives a daemon restart; its deadline is always computed from
/// the persisted `created_at`, never reset on recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Question {
    /// Unique identifier: q-<8char>
    pub id: String,
    /// Session that asked the question (the session may be gone by answer time)
    pub session_id: String,
    /// Short summary shown in chat and in session listings
    pub title: String,
    /// Full question text
    pub body: String,
    /// Optional extra context displayed beneath the body
    pub context: Option<String>,
    /// Chat thread handle when the notifier delivered into a thread
    pub thread_id: Option<String>,
    /// The human's answer, set on the pending -> answered transition
    pub answer: Option<String>,
    /// Timestamp when the answer was recorded
    pub answered_at: Option<String>,
    /// Timestamp when the question was created
    pub created_at: String,
    /// Minutes after `created_at` at which the question times out
    pub timeout_minutes: i64,
    /// Current status: pending, answered, timed_out, cancelled
    pub status: String,
}

impl Question {
    /// Build a fresh pending question from ask input.
    pub fn new(input: NewQuestion) -> Self {
        Self {
            id: crate::ids::generate_question_id(),
            session_id: input.session_id,
            title: input.title,
            body: input.body,
            context: input.context,
            thread_id: None,
            answer: None,
            answered_at: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            timeout_minutes: input.timeout_minutes,
            status: QuestionStatus::Pending.as_str().to_string(),
        }
    }

    /// Parse the status string to QuestionStatus enum
    pub fn status_enum(&self) -> QuestionStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.status_enum() == QuestionStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status_enum().is_terminal()
    }

    /// Parse `created_at`. None when the persisted timestamp is corrupt.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The instant at which an unanswered question times out, derived from
    /// the persisted creation time.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.created_at_utc()
            .map(|t| t + chrono::Duration::minutes(self.timeout_minutes))
    }
}

/// Input for asking a new question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub session_id: String,
    pub title: String,
    pub body: String,
    pub context: Option<String>,
    pub timeout_minutes: i64,
}

impl Default for NewQuestion {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            title: String::new(),
            body: String::new(),
            context: None,
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}
