//! Ask a blocking question from the command line.
//!
//! Registers a session for the duration of the call, submits the question,
//! and blocks until a terminal outcome. The answer goes to stdout so the
//! command composes in scripts; progress goes to stderr.

use crate::daemon::Adapter;
use crate::error::{BellhopError, Result};
use crate::models::QuestionStatus;

pub async fn ask(
    title: &str,
    body: Option<String>,
    context: Option<String>,
    timeout_minutes: Option<i64>,
    project_root: Option<String>,
) -> Result<()> {
    let project_root = match project_root {
        Some(root) => root,
        None => std::env::current_dir()?.to_string_lossy().to_string(),
    };

    let mut adapter = Adapter::connect(&project_root).await?;
    eprintln!("Asking as {}; waiting for an answer...", adapter.label());

    let body = body.unwrap_or_else(|| title.to_string());
    let outcome = adapter
        .ask_blocking(title, &body, context, timeout_minutes)
        .await;
    adapter.close().await;

    let question = outcome?;
    match question.status_enum() {
        QuestionStatus::Answered => {
            println!("{}", question.answer.as_deref().unwrap_or(""));
            Ok(())
        }
        QuestionStatus::TimedOut => Err(BellhopError::QuestionTimedOut(question.id)),
        QuestionStatus::Cancelled => Err(BellhopError::Conflict(format!(
            "question {} was cancelled",
            question.id
        ))),
        // ask_blocking only returns terminal questions
        QuestionStatus::Pending => Err(BellhopError::DaemonProtocol(format!(
            "question {} returned while still pending",
            question.id
        ))),
    }
}
