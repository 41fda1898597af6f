//! IPC protocol types and framing for daemon communication.
//!
//! This module defines the Request/Response types and the newline-delimited
//! JSON protocol used for adapter-daemon communication over Unix domain
//! sockets.
//!
//! ## Protocol Format
//!
//! Each message is one JSON object followed by a single `\n`. JSON string
//! escaping guarantees a serialized message never contains a raw newline, so
//! the terminator is unambiguous. Requests may be pipelined and responses may
//! arrive out of request order; correlation is by `id` alone.

use bellhop_types::{NewQuestion, Question, Session, SessionStatus};
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::BellhopError;

/// Maximum bytes buffered while waiting for a line terminator. A connection
/// that exceeds this without sending `\n` is closed rather than buffered
/// without bound.
pub const MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

/// Longest wait accepted by `check_question_answers`, in seconds.
pub const MAX_WAIT_SECONDS: u64 = 300;

/// IPC Request envelope sent from adapter to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-generated identifier, unique per connection
    pub id: u64,
    /// The method to invoke, with its parameters
    #[serde(flatten)]
    pub method: Method,
}

impl Request {
    /// Create a new request with the given ID and method
    pub fn new(id: u64, method: Method) -> Self {
        Self { id, method }
    }
}

/// Machine-readable error category carried in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The line was not a decodable request envelope
    InvalidRequest,
    /// The method name is not in the supported set
    UnknownMethod,
    /// The method is known but its params did not decode
    InvalidParams,
    NotFound,
    AlreadyResolved,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnknownMethod => "unknown_method",
            Self::InvalidParams => "invalid_params",
            Self::NotFound => "not_found",
            Self::AlreadyResolved => "already_resolved",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error payload of a failed response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

/// IPC Response envelope sent from daemon to adapter.
///
/// Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Method-specific payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure details when the request did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Create a successful response with a result payload
    pub fn ok(id: u64, result: impl Serialize) -> Self {
        Self {
            id,
            result: Some(serde_json::to_value(result).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    /// Create a successful response with an empty result object
    pub fn ok_empty(id: u64) -> Self {
        Self {
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }

    /// Create an error response without a machine-readable code
    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ResponseError {
                message: message.into(),
                code: None,
            }),
        }
    }

    /// Create an error response with a code
    pub fn err_code(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ResponseError {
                message: message.into(),
                code: Some(code),
            }),
        }
    }

    /// Map a service error onto the wire taxonomy
    pub fn from_error(id: u64, err: &BellhopError) -> Self {
        let code = match err {
            BellhopError::SessionNotFound(_) | BellhopError::QuestionNotFound(_) => {
                ErrorCode::NotFound
            }
            BellhopError::QuestionAlreadyResolved(_, _) => ErrorCode::AlreadyResolved,
            BellhopError::Forbidden(_) => ErrorCode::Forbidden,
            BellhopError::Conflict(_) => ErrorCode::Conflict,
            BellhopError::InvalidArgument(_) => ErrorCode::InvalidParams,
            _ => ErrorCode::Internal,
        };
        Self::err_code(id, code, err.to_string())
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Methods supported by the daemon.
///
/// The enum is the dispatch table: the `method` tag carries the name and
/// `params` carries the method-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Method {
    // Daemon control
    /// Check if daemon is alive
    Ping,
    /// Request daemon shutdown
    Shutdown,

    // Session registry
    /// Register this connection's session
    RegisterSession(RegisterSessionParams),
    /// Remove a session owned by this connection
    UnregisterSession { session_id: String },
    /// Update the reported status of an owned session
    UpdateSessionStatus(UpdateSessionStatusParams),
    /// List live sessions
    ListSessions,

    // Questions
    /// Create a pending question and deliver it to chat
    AskBlockingQuestion(AskQuestionParams),
    /// Long-poll for resolved questions
    CheckQuestionAnswers(CheckAnswersParams),
    /// Record a human answer for a pending question
    MarkQuestionAnswered { question_id: String, answer: String },
    /// Cancel a pending question
    CancelQuestion {
        question_id: String,
        reason: Option<String>,
    },
    /// List questions known to the daemon
    ListQuestions { session_id: Option<String> },

    // Chat passthrough
    /// Send text to the chat channel (or a thread within it)
    SendMessage {
        text: String,
        thread_id: Option<String>,
    },
    /// Send a status line tagged with the session's label
    SendStatusUpdate { session_id: String, text: String },
    /// Create a chat thread and return its handle
    CreateTopic { name: String },
}

/// Method names accepted on the wire, used to classify decode failures.
pub const METHOD_NAMES: &[&str] = &[
    "ping",
    "shutdown",
    "register_session",
    "unregister_session",
    "update_session_status",
    "list_sessions",
    "ask_blocking_question",
    "check_question_answers",
    "mark_question_answered",
    "cancel_question",
    "list_questions",
    "send_message",
    "send_status_update",
    "create_topic",
];

/// Parameters for `register_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSessionParams {
    /// Project root directory the session works in; its basename names the label
    pub project_root: String,
}

/// Parameters for `update_session_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSessionStatusParams {
    pub session_id: String,
    pub status: SessionStatus,
    /// Title shown while waiting; ignored unless status is `waiting`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_title: Option<String>,
}

/// Parameters for `ask_blocking_question`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionParams {
    pub session_id: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Minutes until the question times out; daemon default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<i64>,
}

impl AskQuestionParams {
    /// Convert to the service-level input, applying the default timeout.
    pub fn into_new_question(self, default_timeout_minutes: i64) -> NewQuestion {
        NewQuestion {
            session_id: self.session_id,
            title: self.title,
            body: self.body,
            context: self.context,
            timeout_minutes: self.timeout_minutes.unwrap_or(default_timeout_minutes),
        }
    }
}

/// Parameters for `check_question_answers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAnswersParams {
    pub session_id: String,
    /// Explicit questions to watch; empty means every question owned by the session
    #[serde(default)]
    pub question_ids: Vec<String>,
    /// Long-poll budget in seconds, clamped to [`MAX_WAIT_SECONDS`]; 0 polls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<u64>,
}

/// Result of `register_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSessionResult {
    pub session_id: String,
    pub label: String,
}

/// Result of `ask_blocking_question`: the created (still pending) question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskQuestionResult {
    pub question: Question,
}

/// Result of `check_question_answers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAnswersResult {
    /// Questions that reached a terminal state, now collected
    pub answers: Vec<Question>,
    /// Targeted questions still pending when the wait expired
    pub pending: Vec<String>,
}

/// Result of `mark_question_answered` and `cancel_question`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResult {
    /// False when the question was already terminal (idempotent no-op)
    pub resolved: bool,
    /// The question's status after the call
    pub status: String,
}

/// Result of `create_topic`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicResult {
    pub thread_id: String,
}

/// Result of `list_sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResult {
    pub sessions: Vec<Session>,
}

/// Result of `list_questions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListQuestionsResult {
    pub questions: Vec<Question>,
}

/// Result of `ping`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub pending_questions: usize,
}

/// A request line that failed to decode, with enough salvaged detail to
/// answer in-band instead of dropping the connection.
#[derive(Debug, Clone)]
pub struct DecodeError {
    /// Request id recovered from the envelope, 0 when unrecoverable
    pub id: u64,
    pub code: ErrorCode,
    pub message: String,
}

/// Loose envelope used to salvage the id and method of an undecodable request
#[derive(Debug, Default, Deserialize)]
struct RawEnvelope {
    id: Option<u64>,
    method: Option<String>,
}

/// Decode one request line.
///
/// A malformed line never takes the connection down: the error carries the
/// salvaged request id and a category the server turns into an error
/// response.
pub fn decode_request(line: &[u8]) -> Result<Request, DecodeError> {
    match serde_json::from_slice::<Request>(line) {
        Ok(request) => Ok(request),
        Err(err) => {
            let envelope: RawEnvelope = serde_json::from_slice(line).unwrap_or_default();
            let id = envelope.id.unwrap_or(0);
            match envelope.method {
                Some(name) if !METHOD_NAMES.contains(&name.as_str()) => Err(DecodeError {
                    id,
                    code: ErrorCode::UnknownMethod,
                    message: format!("unknown method: {}", name),
                }),
                Some(name) => Err(DecodeError {
                    id,
                    code: ErrorCode::InvalidParams,
                    message: format!("invalid params for {}: {}", name, err),
                }),
                None => Err(DecodeError {
                    id,
                    code: ErrorCode::InvalidRequest,
                    message: format!("invalid request: {}", err),
                }),
            }
        }
    }
}

/// Incremental reader for newline-delimited messages with a buffer ceiling.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    /// Prefix of `buf` already scanned for a terminator
    scanned: usize,
}

impl<R: AsyncReadExt + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` on clean EOF (no buffered bytes).
    ///
    /// # Errors
    ///
    /// - `InvalidData` once more than [`MAX_LINE_BYTES`] are buffered with no
    ///   terminator in sight; the caller is expected to close the connection.
    /// - `UnexpectedEof` when the peer vanishes mid-line.
    pub async fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
                let end = self.scanned + pos;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop(); // '\n'
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.scanned = 0;
                return Ok(Some(line));
            }
            self.scanned = self.buf.len();

            if self.buf.len() > MAX_LINE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "line exceeds {} bytes without a terminator",
                        MAX_LINE_BYTES
                    ),
                ));
            }

            let mut chunk = [0u8; 8192];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-line",
                ));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Serialize a message and write it as one newline-terminated line.
///
/// # Errors
///
/// Returns an error if the serialized message exceeds MAX_LINE_BYTES or if
/// writing fails.
pub async fn write_line<W: AsyncWriteExt + Unpin, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> io::Result<()> {
    let mut data =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if data.len() > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "message too large: {} bytes (max {})",
                data.len(),
                MAX_LINE_BYTES
            ),
        ));
    }
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize and write a request line.
pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
) -> io::Result<()> {
    write_line(writer, request).await
}

/// Serialize and write a response line.
pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
) -> io::Result<()> {
    write_line(writer, response).await
}

/// Read and deserialize the next response line. `Ok(None)` on clean EOF.
pub async fn read_response<R: AsyncReadExt + Unpin>(
    reader: &mut LineReader<R>,
) -> io::Result<Option<Response>> {
    let Some(line) = reader.next_line().await? else {
        return Ok(None);
    };
    serde_json::from_slice(&line)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
