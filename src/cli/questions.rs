//! Question commands: list, show, answer, cancel.
//!
//! Answer and cancel stand in for the chat-side controls; they connect to
//! the daemon (starting it if needed, which recovers any persisted pending
//! questions) and resolve questions by id.

use crate::daemon::ensure_daemon;
use crate::error::{BellhopError, Result};
use crate::output::{self, OutputFormat};

/// List questions known to the daemon
pub async fn list(session_id: Option<&str>, format: OutputFormat) -> Result<()> {
    let client = ensure_daemon().await?;
    let questions = client.list_questions(session_id).await?;

    match format {
        OutputFormat::Json => println!("{}", output::to_json(&questions)?),
        OutputFormat::Table => print!("{}", output::format_questions(&questions)),
    }
    Ok(())
}

/// Show a single question
pub async fn show(question_id: &str, format: OutputFormat) -> Result<()> {
    let client = ensure_daemon().await?;
    let questions = client.list_questions(None).await?;
    let question = questions
        .into_iter()
        .find(|q| q.id == question_id)
        .ok_or_else(|| BellhopError::QuestionNotFound(question_id.to_string()))?;

    match format {
        OutputFormat::Json => println!("{}", output::to_json(&question)?),
        OutputFormat::Table => print!("{}", output::format_question(&question)),
    }
    Ok(())
}

/// Record an answer for a pending question
pub async fn answer(question_id: &str, answer: &str) -> Result<()> {
    let client = ensure_daemon().await?;
    let result = client.mark_question_answered(question_id, answer).await?;

    if result.resolved {
        println!("Answer recorded for {}.", question_id);
    } else {
        println!("Question {} was already {}.", question_id, result.status);
    }
    Ok(())
}

/// Cancel a pending question
pub async fn cancel(question_id: &str, reason: Option<&str>) -> Result<()> {
    let client = ensure_daemon().await?;
    let result = client.cancel_question(question_id, reason).await?;

    if result.resolved {
        println!("Question {} cancelled.", question_id);
    } else {
        println!("Question {} was already {}.", question_id, result.status);
    }
    Ok(())
}
