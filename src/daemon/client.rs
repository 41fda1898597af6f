//! DaemonClient for adapter-to-daemon communication.
//!
//! This module provides the client side of the IPC protocol: typed methods
//! for each daemon operation over a Unix domain socket. Requests may be
//! pipelined from concurrent tasks; a background reader task routes each
//! response to its caller by id, so a long-poll in flight never blocks
//! other calls on the same connection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::daemon::protocol::{
    AskQuestionParams, AskQuestionResult, CheckAnswersParams, CheckAnswersResult,
    CreateTopicResult, LineReader, ListQuestionsResult, ListSessionsResult, Method, PingResult,
    RegisterSessionParams, RegisterSessionResult, Request, ResolveResult, Response,
    ResponseError, UpdateSessionStatusParams, read_response, write_request,
};
use crate::error::{BellhopError, Result};
use crate::models::{Question, Session, SessionStatus};
use crate::services::global_config as global_config_service;

/// In-flight request table shared with the reader task.
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Response>>,
    /// Set when the reader task ends; new calls fail fast.
    closed: bool,
}

/// Client for communicating with the bellhop daemon.
///
/// The DaemonClient connects to the daemon's Unix socket and provides typed
/// methods for each IPC method. Calls take `&self` and may overlap; response
/// correlation is by request id, not arrival order.
///
/// # Example
///
/// ```ignore
/// use bellhop::daemon::client::DaemonClient;
///
/// let client = DaemonClient::connect().await?;
/// let status = client.ping().await?;
/// println!("Daemon version: {}", status.version);
/// ```
pub struct DaemonClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<Mutex<Pending>>,
    request_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl DaemonClient {
    /// Connect to the daemon serving the current runtime scope.
    ///
    /// # Errors
    ///
    /// Returns `DaemonConnection` error if the daemon is not running or the
    /// socket cannot be connected to.
    pub async fn connect() -> Result<Self> {
        let socket_path = global_config_service::socket_path()?;
        Self::connect_to(&socket_path).await
    }

    /// Connect to a daemon at an explicit socket path.
    pub async fn connect_to(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            BellhopError::DaemonConnection(format!(
                "Failed to connect to daemon at {:?}: {}",
                socket_path, e
            ))
        })?;
        Ok(Self::from_stream(stream))
    }

    /// Create a DaemonClient from an existing Unix stream.
    ///
    /// This is useful for testing where you want to talk to a fake daemon
    /// over a socketpair rather than the scope socket.
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(Mutex::new(Pending {
            waiters: HashMap::new(),
            closed: false,
        }));

        // Reader task: route each response line to the call that awaits it
        let table = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut reader = LineReader::new(read_half);
            loop {
                match read_response(&mut reader).await {
                    Ok(Some(response)) => {
                        let waiter = table.lock().unwrap().waiters.remove(&response.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                tracing::debug!(id = response.id, "response with no waiter");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("daemon stream ended: {}", e);
                        break;
                    }
                }
            }
            // Dropping the waiters fails every in-flight call fast
            let mut table = table.lock().unwrap();
            table.closed = true;
            table.waiters.clear();
        });

        Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            request_id: AtomicU64::new(1),
            reader,
        }
    }

    /// Send a request and wait for its response.
    ///
    /// 1. Assigns a unique request id and registers a waiter for it
    /// 2. Serializes and sends the request line
    /// 3. Suspends until the reader task delivers the matching response
    async fn call(&self, method: Method) -> Result<Response> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);

        let rx = {
            let mut pending = self.pending.lock().unwrap();
            if pending.closed {
                return Err(BellhopError::DaemonConnection(
                    "daemon connection is closed".to_string(),
                ));
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.insert(id, tx);
            rx
        };

        let request = Request::new(id, method);
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_request(&mut *writer, &request).await {
                self.pending.lock().unwrap().waiters.remove(&id);
                return Err(BellhopError::DaemonConnection(format!(
                    "Failed to send request: {}",
                    e
                )));
            }
        }

        rx.await.map_err(|_| {
            BellhopError::DaemonConnection(
                "daemon connection lost while waiting for response".to_string(),
            )
        })
    }

    /// Ping the daemon to check if it is running.
    ///
    /// Returns version, uptime, and live session/question counts.
    pub async fn ping(&self) -> Result<PingResult> {
        expect(self.call(Method::Ping).await?)
    }

    /// Request daemon shutdown.
    ///
    /// This gracefully shuts down the daemon process.
    pub async fn shutdown(&self) -> Result<()> {
        expect_ok(self.call(Method::Shutdown).await?)
    }

    /// Register a session for this connection.
    ///
    /// Returns the session id and its short label ("proj/1").
    pub async fn register_session(&self, project_root: &str) -> Result<RegisterSessionResult> {
        let response = self
            .call(Method::RegisterSession(RegisterSessionParams {
                project_root: project_root.to_string(),
            }))
            .await?;
        expect(response)
    }

    /// Remove a session owned by this connection.
    pub async fn unregister_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .call(Method::UnregisterSession {
                session_id: session_id.to_string(),
            })
            .await?;
        expect_ok(response)
    }

    /// Update the reported status of an owned session.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        question_title: Option<String>,
    ) -> Result<Session> {
        let response = self
            .call(Method::UpdateSessionStatus(UpdateSessionStatusParams {
                session_id: session_id.to_string(),
                status,
                question_title,
            }))
            .await?;
        expect(response)
    }

    /// List live sessions.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let result: ListSessionsResult = expect(self.call(Method::ListSessions).await?)?;
        Ok(result.sessions)
    }

    /// Create a pending question and have the daemon deliver it to chat.
    ///
    /// Returns the created (still pending) question. Blocking semantics live
    /// in the adapter, which polls [`Self::check_question_answers`].
    pub async fn ask_blocking_question(&self, params: AskQuestionParams) -> Result<Question> {
        let result: AskQuestionResult =
            expect(self.call(Method::AskBlockingQuestion(params)).await?)?;
        Ok(result.question)
    }

    /// Long-poll for resolved questions.
    ///
    /// # Arguments
    ///
    /// * `session_id` - The calling session
    /// * `question_ids` - Explicit targets; empty means every question owned
    ///   by the session
    /// * `wait_seconds` - Long-poll budget, clamped by the daemon; 0 polls
    pub async fn check_question_answers(
        &self,
        session_id: &str,
        question_ids: Vec<String>,
        wait_seconds: Option<u64>,
    ) -> Result<CheckAnswersResult> {
        let response = self
            .call(Method::CheckQuestionAnswers(CheckAnswersParams {
                session_id: session_id.to_string(),
                question_ids,
                wait_seconds,
            }))
            .await?;
        expect(response)
    }

    /// Record a human answer for a pending question.
    ///
    /// `resolved` is false when the question was already terminal.
    pub async fn mark_question_answered(
        &self,
        question_id: &str,
        answer: &str,
    ) -> Result<ResolveResult> {
        let response = self
            .call(Method::MarkQuestionAnswered {
                question_id: question_id.to_string(),
                answer: answer.to_string(),
            })
            .await?;
        expect(response)
    }

    /// Cancel a pending question.
    pub async fn cancel_question(
        &self,
        question_id: &str,
        reason: Option<&str>,
    ) -> Result<ResolveResult> {
        let response = self
            .call(Method::CancelQuestion {
                question_id: question_id.to_string(),
                reason: reason.map(String::from),
            })
            .await?;
        expect(response)
    }

    /// List questions known to the daemon, optionally for one session.
    pub async fn list_questions(&self, session_id: Option<&str>) -> Result<Vec<Question>> {
        let response = self
            .call(Method::ListQuestions {
                session_id: session_id.map(String::from),
            })
            .await?;
        let result: ListQuestionsResult = expect(response)?;
        Ok(result.questions)
    }

    /// Send text to the chat channel, or into a thread within it.
    pub async fn send_message(&self, text: &str, thread_id: Option<&str>) -> Result<()> {
        let response = self
            .call(Method::SendMessage {
                text: text.to_string(),
                thread_id: thread_id.map(String::from),
            })
            .await?;
        expect_ok(response)
    }

    /// Send a status line tagged with the session's label.
    pub async fn send_status_update(&self, session_id: &str, text: &str) -> Result<()> {
        let response = self
            .call(Method::SendStatusUpdate {
                session_id: session_id.to_string(),
                text: text.to_string(),
            })
            .await?;
        expect_ok(response)
    }

    /// Create a chat thread and return its handle.
    pub async fn create_topic(&self, name: &str) -> Result<String> {
        let response = self
            .call(Method::CreateTopic {
                name: name.to_string(),
            })
            .await?;
        let result: CreateTopicResult = expect(response)?;
        Ok(result.thread_id)
    }
}

impl Drop for DaemonClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Unwrap a response into its typed result payload.
fn expect<T: DeserializeOwned>(response: Response) -> Result<T> {
    match response.error {
        Some(error) => Err(remote_error(error)),
        None => {
            let body = response
                .result
                .ok_or_else(|| BellhopError::DaemonProtocol("Missing response body".into()))?;
            Ok(serde_json::from_value(body)?)
        }
    }
}

/// Unwrap a response that carries no payload of interest.
fn expect_ok(response: Response) -> Result<()> {
    match response.error {
        Some(error) => Err(remote_error(error)),
        None => Ok(()),
    }
}

/// Surface an error response without losing its wire code.
fn remote_error(error: ResponseError) -> BellhopError {
    BellhopError::DaemonRemote {
        code: error
            .code
            .map(|c| c.as_str().to_string())
            .unwrap_or_default(),
        message: error.message,
    }
}
