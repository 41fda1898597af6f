use thiserror::Error;

/// Process exit codes used by the CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const CONFLICT: i32 = 4;
    pub const TIMED_OUT: i32 = 5;
    pub const INTERNAL: i32 = 1;
}

#[derive(Error, Debug)]
pub enum BellhopError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Question already resolved: {0} is {1}")]
    QuestionAlreadyResolved(String, String),

    #[error("Question timed out: {0}")]
    QuestionTimedOut(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Global config error: {0}")]
    GlobalConfig(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to connect to daemon: {0}")]
    DaemonConnection(String),

    #[error("Daemon protocol error: {0}")]
    DaemonProtocol(String),

    /// An error response from the daemon; the wire code is kept so exit
    /// codes survive the IPC hop.
    #[error("{message}")]
    DaemonRemote { code: String, message: String },
}

impl BellhopError {
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors (bad arguments, invalid input)
            BellhopError::InvalidArgument(_) => exit_codes::USER_ERROR,

            // Not found errors
            BellhopError::SessionNotFound(_) | BellhopError::QuestionNotFound(_) => {
                exit_codes::NOT_FOUND
            }

            // Conflict errors (ownership, double registration, late answers)
            BellhopError::Conflict(_)
            | BellhopError::Forbidden(_)
            | BellhopError::QuestionAlreadyResolved(_, _) => exit_codes::CONFLICT,

            // A blocking question that ran out its deadline
            BellhopError::QuestionTimedOut(_) => exit_codes::TIMED_OUT,

            // Errors reported by the daemon keep their wire category
            BellhopError::DaemonRemote { code, .. } => match code.as_str() {
                "not_found" => exit_codes::NOT_FOUND,
                "already_resolved" | "forbidden" | "conflict" => exit_codes::CONFLICT,
                "invalid_request" | "invalid_params" | "unknown_method" => {
                    exit_codes::USER_ERROR
                }
                _ => exit_codes::INTERNAL,
            },

            // Internal errors
            BellhopError::Database(_)
            | BellhopError::Io(_)
            | BellhopError::Json(_)
            | BellhopError::Notify(_)
            | BellhopError::GlobalConfig(_)
            | BellhopError::Toml(_)
            | BellhopError::DaemonConnection(_)
            | BellhopError::DaemonProtocol(_) => exit_codes::INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, BellhopError>;
