use serde::{Deserialize, Serialize};

/// Session status as reported by the owning adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Busy,
    Waiting,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Waiting => "waiting",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "busy" => Ok(SessionStatus::Busy),
            "waiting" => Ok(SessionStatus::Waiting),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered agent session.
///
/// Sessions live only in daemon memory; they are created by
/// `register_session` and removed on unregister or when the owning
/// connection drops. Questions reference sessions by id but outlive them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier: sess-<date>-<4char>
    pub id: String,
    /// Human-facing label: "<project>/<n>", unique among live sessions
    pub label: String,
    /// Short project name the label was derived from
    pub project: String,
    /// Current status: idle, busy, waiting
    pub status: String,
    /// Title of the question being waited on; only set while status is waiting
    pub question_title: Option<String>,
    /// Timestamp when the session registered
    pub connected_at: String,
}

impl Session {
    /// Parse the status string to SessionStatus enum
    pub fn status_enum(&self) -> SessionStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn is_waiting(&self) -> bool {
        self.status_enum() == SessionStatus::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Busy,
            SessionStatus::Waiting,
        ] {
            let parsed: SessionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Waiting).unwrap();
        assert_eq!(json, r#""waiting""#);
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionStatus::Waiting);
    }
}
