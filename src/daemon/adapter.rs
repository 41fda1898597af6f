//! Session adapter: the per-caller face of the daemon.
//!
//! An `Adapter` owns one registered session and tags every request with it.
//! It layers the blocking semantics the IPC protocol deliberately lacks:
//! `ask_blocking` submits a question and long-polls until a terminal
//! outcome, and any unexpectedly lost connection is rebuilt with bounded
//! backoff before the failed call is retried once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;

use crate::daemon::auto_start;
use crate::daemon::client::DaemonClient;
use crate::daemon::protocol::{AskQuestionParams, CheckAnswersResult, MAX_WAIT_SECONDS};
use crate::error::{BellhopError, Result};
use crate::models::{Question, Session, SessionStatus};
use crate::services::global_config as global_config_service;

/// First reconnect delay; doubled per attempt.
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(200);
/// Ceiling on a single reconnect delay.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);
/// Reconnect attempts before the adapter gives up.
const RECONNECT_MAX_ATTEMPTS: u32 = 6;

/// Slack past a question's own deadline before `ask_blocking` stops
/// waiting on the daemon to report the timeout itself.
const DEADLINE_GRACE_SECONDS: i64 = 30;

/// A registered session and its connection to the daemon.
///
/// The adapter is the layer agent integrations embed: it ensures a daemon is
/// running for the current scope, registers a session, and exposes the
/// session-tagged operations. Dropping the adapter (or the process dying)
/// is safe; the daemon reaps the session when the connection closes.
pub struct Adapter {
    client: DaemonClient,
    socket_path: PathBuf,
    project_root: String,
    session_id: String,
    label: String,
}

impl Adapter {
    /// Connect to the scope's daemon, starting one if none is listening,
    /// and register a session for `project_root`.
    pub async fn connect(project_root: &str) -> Result<Self> {
        let socket_path = global_config_service::socket_path()?;
        let client = auto_start::ensure_daemon().await?;
        Self::register(client, socket_path, project_root).await
    }

    /// Attach to a daemon already listening at `socket_path`.
    ///
    /// Unlike [`Adapter::connect`] this never spawns a daemon; it is the
    /// entry point for tests and embedders that manage the daemon process
    /// themselves.
    pub async fn attach(socket_path: &Path, project_root: &str) -> Result<Self> {
        let client = DaemonClient::connect_to(socket_path).await?;
        Self::register(client, socket_path.to_path_buf(), project_root).await
    }

    async fn register(
        client: DaemonClient,
        socket_path: PathBuf,
        project_root: &str,
    ) -> Result<Self> {
        let registered = client.register_session(project_root).await?;
        tracing::debug!(
            session_id = %registered.session_id,
            label = %registered.label,
            "session registered"
        );
        Ok(Self {
            client,
            socket_path,
            project_root: project_root.to_string(),
            session_id: registered.session_id,
            label: registered.label,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The short label the daemon assigned, e.g. "proj/1".
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ask a question and block until it reaches a terminal state.
    ///
    /// The question is submitted, then `check_question_answers` is polled
    /// with the maximum wait until the daemon reports an outcome. A timeout
    /// is a terminal outcome delivered through the returned question's
    /// status; only a daemon that stays silent past the question's deadline
    /// plus grace turns into a `QuestionTimedOut` error.
    pub async fn ask_blocking(
        &mut self,
        title: &str,
        body: &str,
        context: Option<String>,
        timeout_minutes: Option<i64>,
    ) -> Result<Question> {
        let params = AskQuestionParams {
            session_id: self.session_id.clone(),
            title: title.to_string(),
            body: body.to_string(),
            context,
            timeout_minutes,
        };

        let question = match self.client.ask_blocking_question(params.clone()).await {
            Err(e) if is_connection_error(&e) => {
                self.reconnect().await?;
                // The reconnect registered a fresh session
                let params = AskQuestionParams {
                    session_id: self.session_id.clone(),
                    ..params
                };
                self.client.ask_blocking_question(params).await?
            }
            other => other?,
        };

        // Backstop deadline in case the daemon never reports the timeout
        let deadline = question
            .deadline()
            .unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(question.timeout_minutes))
            + chrono::Duration::seconds(DEADLINE_GRACE_SECONDS);

        loop {
            let remaining = (deadline - Utc::now()).num_seconds().max(0) as u64;
            let wait = remaining.min(MAX_WAIT_SECONDS);

            let result = self.check_question(&question.id, wait).await?;
            if let Some(resolved) = result.answers.into_iter().find(|q| q.id == question.id) {
                return Ok(resolved);
            }

            if !result.pending.contains(&question.id) {
                // Neither resolved nor pending: the daemon no longer knows
                // this question (collected elsewhere or state lost)
                return Err(BellhopError::QuestionNotFound(question.id));
            }

            if Utc::now() >= deadline {
                return Err(BellhopError::QuestionTimedOut(question.id));
            }
        }
    }

    /// One long-poll round for a single question, with reconnect-and-retry.
    async fn check_question(&mut self, question_id: &str, wait: u64) -> Result<CheckAnswersResult> {
        let ids = vec![question_id.to_string()];
        match self
            .client
            .check_question_answers(&self.session_id, ids.clone(), Some(wait))
            .await
        {
            Err(e) if is_connection_error(&e) => {
                self.reconnect().await?;
                // Explicit ids survive the session change
                self.client
                    .check_question_answers(&self.session_id, ids, Some(wait))
                    .await
            }
            other => other,
        }
    }

    /// Update the session's reported status.
    pub async fn update_status(
        &mut self,
        status: SessionStatus,
        question_title: Option<String>,
    ) -> Result<Session> {
        match self
            .client
            .update_session_status(&self.session_id, status, question_title.clone())
            .await
        {
            Err(e) if is_connection_error(&e) => {
                self.reconnect().await?;
                self.client
                    .update_session_status(&self.session_id, status, question_title)
                    .await
            }
            other => other,
        }
    }

    /// Send a status line tagged with this session's label.
    pub async fn send_status_update(&mut self, text: &str) -> Result<()> {
        match self.client.send_status_update(&self.session_id, text).await {
            Err(e) if is_connection_error(&e) => {
                self.reconnect().await?;
                self.client.send_status_update(&self.session_id, text).await
            }
            other => other,
        }
    }

    /// Best-effort unregister, then drop the connection. The daemon's
    /// connection-drop reaping is the authoritative fallback.
    pub async fn close(self) {
        if let Err(e) = self.client.unregister_session(&self.session_id).await {
            tracing::debug!("unregister on close failed: {}", e);
        }
    }

    /// Rebuild the connection after an unexpected loss.
    ///
    /// Retries with exponential backoff (200ms base, doubled per attempt,
    /// capped at 5s, at most 6 attempts) and registers a fresh session on
    /// success; the old session was reaped when the connection dropped.
    /// Exhausting the attempts is fatal for the adapter.
    async fn reconnect(&mut self) -> Result<()> {
        tracing::warn!(session_id = %self.session_id, "daemon connection lost, reconnecting");

        for attempt in 0..RECONNECT_MAX_ATTEMPTS {
            sleep(backoff_delay(attempt)).await;

            match DaemonClient::connect_to(&self.socket_path).await {
                Ok(client) => {
                    let registered = client.register_session(&self.project_root).await?;
                    self.client = client;
                    self.session_id = registered.session_id;
                    self.label = registered.label;
                    tracing::info!(label = %self.label, "reconnected to daemon");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(attempt, "reconnect attempt failed: {}", e);
                }
            }
        }

        Err(BellhopError::DaemonConnection(format!(
            "daemon unreachable after {} reconnect attempts",
            RECONNECT_MAX_ATTEMPTS
        )))
    }
}

fn is_connection_error(err: &BellhopError) -> bool {
    matches!(err, BellhopError::DaemonConnection(_))
}

/// Delay before reconnect attempt `attempt` (zero-based).
fn backoff_delay(attempt: u32) -> Duration {
    RECONNECT_BASE_DELAY
        .saturating_mul(1u32 << attempt.min(31))
        .min(RECONNECT_MAX_DELAY)
}
