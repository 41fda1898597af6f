//! Question lifecycle service.
//!
//! Owns every live question: the persisted rows, the in-memory active set,
//! the timeout timers, and the keyed waiter registry behind
//! `check_question_answers`. Every transition out of `pending` is arbitrated
//! by the store's status guard, so answer/timeout/cancel races have exactly
//! one winner; losers surface as "already resolved", never as a second
//! transition.
//!
//! Ordering contracts:
//! - a question is persisted before its chat delivery is attempted;
//! - a transition is persisted before any waiter is woken;
//! - the timeout notice is sent while the question is still pending, so the
//!   chat channel always learns why a question disappeared.

use crate::daemon::protocol::MAX_WAIT_SECONDS;
use crate::db;
use crate::error::{BellhopError, Result};
use crate::models::{NewQuestion, Question, QuestionStatus};
use crate::notifier::ChatNotifier;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a terminal question may sit uncollected before the sweeper
/// deletes it. Askers poll at least every `MAX_WAIT_SECONDS`, so anything
/// older than this has no one coming back for it.
const UNCOLLECTED_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Live state for one question.
struct QuestionEntry {
    question: Question,
    /// Oneshot per long-poller, fired with the terminal question. Keyed to
    /// this entry only; resolving one question never wakes another's
    /// waiters.
    waiters: Vec<oneshot::Sender<Question>>,
    /// Timeout timer handle, aborted when another transition wins.
    timer: Option<JoinHandle<()>>,
    /// When the question reached a terminal status; drives the sweeper.
    resolved_at: Option<Instant>,
}

impl QuestionEntry {
    fn new(question: Question) -> Self {
        Self {
            question,
            waiters: Vec::new(),
            timer: None,
            resolved_at: None,
        }
    }
}

/// The daemon's question state machine.
///
/// Cheap to clone; all clones share state. The lock is a plain
/// `std::sync::Mutex` held only for map access, never across an await.
#[derive(Clone)]
pub struct QuestionService {
    pool: SqlitePool,
    notifier: Arc<dyn ChatNotifier>,
    inner: Arc<Mutex<HashMap<String, QuestionEntry>>>,
}

impl QuestionService {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn ChatNotifier>) -> Self {
        Self {
            pool,
            notifier,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Ask a new question on behalf of a session.
    ///
    /// The row is persisted before delivery is attempted, so a crash between
    /// the two recovers the question instead of losing it. Delivery failure
    /// downgrades to a warning; the question stays pending and answerable
    /// through the CLI.
    pub async fn ask(&self, input: NewQuestion, session_label: &str) -> Result<Question> {
        let question = Question::new(input);
        db::questions::insert(&self.pool, &question).await?;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.insert(question.id.clone(), QuestionEntry::new(question.clone()));
        }
        self.start_timer(&question);

        let thread_id = match self
            .notifier
            .deliver_question(&question, session_label)
            .await
        {
            Ok(thread) => thread,
            Err(e) => {
                warn!(question_id = %question.id, error = %e, "question not delivered to chat");
                None
            }
        };

        if let Some(thread) = thread_id {
            if let Err(e) = db::questions::set_thread(&self.pool, &question.id, &thread).await {
                warn!(question_id = %question.id, error = %e, "failed to record thread id");
            }
            let mut inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.get_mut(&question.id) {
                entry.question.thread_id = Some(thread);
            }
        }

        debug!(question_id = %question.id, %session_label, "question asked");
        Ok(self.get(&question.id).unwrap_or(question))
    }

    /// Record a human answer: `pending -> answered`.
    ///
    /// The update is persisted before any waiter wakes, then a best-effort
    /// confirmation goes to the question's thread. Answering a resolved
    /// question is an idempotent no-op reported as "already resolved".
    pub async fn deliver_answer(&self, question_id: &str, answer: &str) -> Result<Question> {
        self.require_pending(question_id)?;

        let now = chrono::Utc::now().to_rfc3339();
        let won = db::questions::mark_terminal(
            &self.pool,
            question_id,
            QuestionStatus::Answered.as_str(),
            Some(answer),
            Some(&now),
        )
        .await?;
        if !won {
            return Err(self.already_resolved(question_id).await);
        }

        let (question, waiters) = self.finish_transition(
            question_id,
            QuestionStatus::Answered,
            Some(answer.to_string()),
            Some(now),
        );
        let question = match question {
            Some(q) => q,
            None => db::questions::get(&self.pool, question_id)
                .await?
                .ok_or_else(|| BellhopError::QuestionNotFound(question_id.to_string()))?,
        };

        for waiter in waiters {
            let _ = waiter.send(question.clone());
        }

        let notifier = self.notifier.clone();
        let thread = question.thread_id.clone();
        let title = question.title.clone();
        tokio::spawn(async move {
            let text = format!("✅ Answer recorded for \"{}\"", title);
            if let Err(e) = notifier.send_message(&text, thread.as_deref()).await {
                warn!(error = %e, "answer confirmation not delivered");
            }
        });

        info!(question_id = %question.id, "question answered");
        Ok(question)
    }

    /// Timer path: `pending -> timed_out`.
    ///
    /// The "timed out" notice goes out while the question is still pending.
    /// An answer landing during the notice send wins the race and the
    /// timeout becomes a no-op. Returns whether the timeout won.
    pub(crate) async fn time_out(&self, question_id: &str, timeout_minutes: i64) -> bool {
        let (title, thread_id) = {
            let inner = self.inner.lock().unwrap();
            match inner.get(question_id) {
                Some(entry) if entry.question.is_pending() => (
                    entry.question.title.clone(),
                    entry.question.thread_id.clone(),
                ),
                _ => return false,
            }
        };

        let text = format!(
            "⏰ Question \"{}\" timed out after {} minutes",
            title, timeout_minutes
        );
        if let Err(e) = self.notifier.send_message(&text, thread_id.as_deref()).await {
            warn!(question_id = %question_id, error = %e, "timeout notice not delivered");
        }

        let won = match db::questions::mark_terminal(
            &self.pool,
            question_id,
            QuestionStatus::TimedOut.as_str(),
            None,
            None,
        )
        .await
        {
            Ok(won) => won,
            Err(e) => {
                // Leave the row pending; recovery re-arms the timer.
                warn!(question_id = %question_id, error = %e, "failed to persist timeout");
                return false;
            }
        };
        if !won {
            debug!(question_id = %question_id, "timeout lost the race to an answer");
            return false;
        }

        // Aborting our own timer handle is fine: no awaits remain below.
        let (question, waiters) =
            self.finish_transition(question_id, QuestionStatus::TimedOut, None, None);
        if let Some(question) = question {
            for waiter in waiters {
                let _ = waiter.send(question.clone());
            }
        }

        info!(question_id = %question_id, timeout_minutes, "question timed out");
        true
    }

    /// `pending -> cancelled`. The reason shows up in the chat notice and
    /// the log, never in the stored row.
    pub async fn cancel(&self, question_id: &str, reason: Option<&str>) -> Result<Question> {
        self.require_pending(question_id)?;

        let won = db::questions::mark_terminal(
            &self.pool,
            question_id,
            QuestionStatus::Cancelled.as_str(),
            None,
            None,
        )
        .await?;
        if !won {
            return Err(self.already_resolved(question_id).await);
        }

        let (question, waiters) =
            self.finish_transition(question_id, QuestionStatus::Cancelled, None, None);
        let question = match question {
            Some(q) => q,
            None => db::questions::get(&self.pool, question_id)
                .await?
                .ok_or_else(|| BellhopError::QuestionNotFound(question_id.to_string()))?,
        };

        for waiter in waiters {
            let _ = waiter.send(question.clone());
        }

        let notifier = self.notifier.clone();
        let thread = question.thread_id.clone();
        let text = match reason {
            Some(reason) => format!("🚫 Question \"{}\" cancelled: {}", question.title, reason),
            None => format!("🚫 Question \"{}\" cancelled", question.title),
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.send_message(&text, thread.as_deref()).await {
                warn!(error = %e, "cancellation notice not delivered");
            }
        });

        info!(question_id = %question.id, reason = reason.unwrap_or(""), "question cancelled");
        Ok(question)
    }

    /// Long-poll for outcomes.
    ///
    /// Explicit ids target questions directly (ownership is not re-checked,
    /// so a restarted session can still collect its earlier questions); an
    /// empty list targets everything currently owned by `session_id`. Ids
    /// that exist nowhere appear in neither result list. Terminal questions
    /// are returned and collected: removed from memory and store.
    pub async fn check_answers(
        &self,
        session_id: &str,
        question_ids: &[String],
        wait_seconds: Option<u64>,
    ) -> Result<(Vec<Question>, Vec<String>)> {
        let targets = self.resolve_targets(session_id, question_ids);
        if targets.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // Anything already terminal short-circuits the wait.
        let (answers, pending) = self.split_targets(&targets);
        if !answers.is_empty() || pending.is_empty() {
            self.collect(&answers).await;
            return Ok((answers, pending));
        }

        let wait = effective_wait(wait_seconds);
        if !wait.is_zero() {
            let mut receivers = self.register_waiters(&pending);
            let deadline = tokio::time::Instant::now() + wait;

            // Wake on the first resolution among the targets; receivers that
            // error were collected elsewhere, keep waiting on the rest.
            while !receivers.is_empty() {
                let next = futures::future::select_all(receivers);
                tokio::select! {
                    (outcome, _, rest) = next => {
                        receivers = rest;
                        if outcome.is_ok() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        receivers = Vec::new();
                    }
                }
            }
        }

        let (answers, pending) = self.split_targets(&targets);
        self.collect(&answers).await;
        Ok((answers, pending))
    }

    /// Rebuild live state from the store after a restart.
    ///
    /// Terminal leftovers are pruned, pending rows get their entries and
    /// timers back with deadlines computed from the persisted `created_at`.
    /// Questions already past their deadline time out immediately through
    /// the normal notify-first path.
    pub async fn recover(&self) -> Result<usize> {
        let pruned = db::questions::prune_terminal(&self.pool).await?;
        if pruned > 0 {
            info!(pruned, "pruned terminal questions from the store");
        }

        let pending = db::questions::list_pending(&self.pool).await?;
        let count = pending.len();
        {
            let mut inner = self.inner.lock().unwrap();
            for question in &pending {
                inner.insert(question.id.clone(), QuestionEntry::new(question.clone()));
            }
        }
        for question in &pending {
            self.start_timer(question);
        }

        if count > 0 {
            info!(count, "recovered pending questions");
        }
        Ok(count)
    }

    /// Drop terminal questions nobody collected within the retention window,
    /// from memory and store both. With collection doing the same on the hot
    /// path, the store converges to pending-only rows.
    pub async fn sweep(&self) {
        self.sweep_older_than(UNCOLLECTED_RETENTION).await;
    }

    pub(crate) async fn sweep_older_than(&self, retention: Duration) {
        let expired: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            inner
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .resolved_at
                        .is_some_and(|at| at.elapsed() >= retention)
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in expired {
            self.inner.lock().unwrap().remove(&id);
            if let Err(e) = db::questions::delete(&self.pool, &id).await {
                warn!(question_id = %id, error = %e, "failed to delete swept question");
            }
            debug!(question_id = %id, "swept uncollected terminal question");
        }
    }

    pub fn get(&self, question_id: &str) -> Option<Question> {
        self.inner
            .lock()
            .unwrap()
            .get(question_id)
            .map(|entry| entry.question.clone())
    }

    /// All live questions (pending and uncollected), oldest first.
    pub fn list(&self) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .map(|entry| entry.question.clone())
            .collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        questions
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.question.is_pending())
            .count()
    }

    /// Arm the timeout timer from the question's persisted creation time.
    /// An already-elapsed deadline fires immediately.
    fn start_timer(&self, question: &Question) {
        let Some(deadline) = question.deadline() else {
            warn!(question_id = %question.id, "unparseable created_at, timeout timer not armed");
            return;
        };
        let delay = (deadline - chrono::Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let service = self.clone();
        let question_id = question.id.clone();
        let timeout_minutes = question.timeout_minutes;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.time_out(&question_id, timeout_minutes).await;
        });

        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(&question.id) {
            Some(entry) if entry.question.is_pending() => entry.timer = Some(handle),
            // A transition won while the timer was being set up.
            _ => handle.abort(),
        }
    }

    /// Reject callers early when the question is missing or already
    /// terminal. The store guard remains the arbiter for races that slip
    /// past this check.
    fn require_pending(&self, question_id: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        match inner.get(question_id) {
            Some(entry) if entry.question.is_pending() => Ok(()),
            Some(entry) => Err(BellhopError::QuestionAlreadyResolved(
                question_id.to_string(),
                entry.question.status.clone(),
            )),
            None => Err(BellhopError::QuestionNotFound(question_id.to_string())),
        }
    }

    /// The store refused the transition; report the status that beat us.
    async fn already_resolved(&self, question_id: &str) -> BellhopError {
        let status = match db::questions::get(&self.pool, question_id).await {
            Ok(Some(question)) => question.status,
            _ => "resolved".to_string(),
        };
        BellhopError::QuestionAlreadyResolved(question_id.to_string(), status)
    }

    /// Sync memory with a transition the store has already committed, abort
    /// the timer, and hand back the waiters to wake.
    fn finish_transition(
        &self,
        question_id: &str,
        status: QuestionStatus,
        answer: Option<String>,
        answered_at: Option<String>,
    ) -> (Option<Question>, Vec<oneshot::Sender<Question>>) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.get_mut(question_id) else {
            return (None, Vec::new());
        };

        entry.question.status = status.as_str().to_string();
        entry.question.answer = answer;
        entry.question.answered_at = answered_at;
        entry.resolved_at = Some(Instant::now());
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let waiters = std::mem::take(&mut entry.waiters);
        (Some(entry.question.clone()), waiters)
    }

    /// Target id set for a check: explicit ids verbatim, or every question
    /// owned by the session when no ids were given.
    fn resolve_targets(&self, session_id: &str, question_ids: &[String]) -> Vec<String> {
        if !question_ids.is_empty() {
            return question_ids.to_vec();
        }
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner
            .values()
            .filter(|entry| entry.question.session_id == session_id)
            .map(|entry| entry.question.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Partition targets into terminal questions and still-pending ids.
    /// Unknown ids land in neither.
    fn split_targets(&self, targets: &[String]) -> (Vec<Question>, Vec<String>) {
        let inner = self.inner.lock().unwrap();
        let mut answers = Vec::new();
        let mut pending = Vec::new();
        for id in targets {
            match inner.get(id) {
                Some(entry) if entry.question.is_terminal() => {
                    answers.push(entry.question.clone())
                }
                Some(_) => pending.push(id.clone()),
                None => {}
            }
        }
        (answers, pending)
    }

    /// Register one oneshot waiter per pending target.
    fn register_waiters(&self, pending: &[String]) -> Vec<oneshot::Receiver<Question>> {
        let mut inner = self.inner.lock().unwrap();
        let mut receivers = Vec::with_capacity(pending.len());
        for id in pending {
            if let Some(entry) = inner.get_mut(id) {
                let (tx, rx) = oneshot::channel();
                entry.waiters.push(tx);
                receivers.push(rx);
            }
        }
        receivers
    }

    /// Collection: a terminal outcome handed to a caller leaves the daemon.
    async fn collect(&self, answers: &[Question]) {
        for question in answers {
            self.inner.lock().unwrap().remove(&question.id);
            if let Err(e) = db::questions::delete(&self.pool, &question.id).await {
                warn!(question_id = %question.id, error = %e, "failed to delete collected question");
            }
        }
    }
}

/// Clamp a requested wait to the long-poll ceiling.
fn effective_wait(wait_seconds: Option<u64>) -> Duration {
    Duration::from_secs(wait_seconds.unwrap_or(MAX_WAIT_SECONDS).min(MAX_WAIT_SECONDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{create_pool, run_migrations};
    use crate::notifier::test_support::{Notice, RecordingNotifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    async fn service_with(
        notifier: Arc<dyn ChatNotifier>,
    ) -> (TempDir, SqlitePool, QuestionService) {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&dir.path().join("questions.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let service = QuestionService::new(pool.clone(), notifier);
        (dir, pool, service)
    }

    async fn service() -> (TempDir, SqlitePool, QuestionService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let (dir, pool, service) = service_with(notifier.clone()).await;
        (dir, pool, service, notifier)
    }

    fn input(session_id: &str, title: &str) -> NewQuestion {
        NewQuestion {
            session_id: session_id.to_string(),
            title: title.to_string(),
            body: "details".to_string(),
            context: None,
            timeout_minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_ask_persists_even_when_delivery_fails() {
        let (_dir, pool, service, notifier) = service().await;
        notifier.set_fail(true);

        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();

        assert!(question.is_pending());
        let stored = db::questions::get(&pool, &question.id).await.unwrap();
        assert!(stored.is_some());
        assert!(service.get(&question.id).is_some());
    }

    #[tokio::test]
    async fn test_ask_records_thread_id() {
        let notifier = Arc::new(RecordingNotifier::with_thread("42"));
        let (_dir, pool, service) = service_with(notifier.clone()).await;

        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();

        assert_eq!(question.thread_id.as_deref(), Some("42"));
        let stored = db::questions::get(&pool, &question.id).await.unwrap().unwrap();
        assert_eq!(stored.thread_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_answer_resolves_question() {
        let (_dir, pool, service, _) = service().await;
        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();

        let answered = service.deliver_answer(&question.id, "yes, ship it").await.unwrap();

        assert_eq!(answered.status, "answered");
        assert_eq!(answered.answer.as_deref(), Some("yes, ship it"));
        assert!(answered.answered_at.is_some());

        // Persisted before collection.
        let stored = db::questions::get(&pool, &question.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "answered");
    }

    #[tokio::test]
    async fn test_second_answer_is_already_resolved() {
        let (_dir, _pool, service, _) = service().await;
        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();

        service.deliver_answer(&question.id, "yes").await.unwrap();
        let err = service.deliver_answer(&question.id, "no").await.unwrap_err();

        assert!(matches!(err, BellhopError::QuestionAlreadyResolved(_, _)));
        // The first answer stands.
        assert_eq!(service.get(&question.id).unwrap().answer.as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_answer_unknown_question_is_not_found() {
        let (_dir, _pool, service, _) = service().await;
        let err = service.deliver_answer("q-missing1", "yes").await.unwrap_err();
        assert!(matches!(err, BellhopError::QuestionNotFound(_)));
    }

    #[tokio::test]
    async fn test_check_collects_terminal_question() {
        let (_dir, pool, service, _) = service().await;
        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();
        service.deliver_answer(&question.id, "yes").await.unwrap();

        let (answers, pending) = service
            .check_answers("sess-1", &[question.id.clone()], Some(0))
            .await
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer.as_deref(), Some("yes"));
        assert!(pending.is_empty());

        // Collected: gone from memory and store; a second check sees nothing.
        assert!(service.get(&question.id).is_none());
        assert!(db::questions::get(&pool, &question.id).await.unwrap().is_none());
        let (answers, pending) = service
            .check_answers("sess-1", &[question.id.clone()], Some(0))
            .await
            .unwrap();
        assert!(answers.is_empty());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_check_wakes_promptly_on_answer() {
        let (_dir, _pool, service, _) = service().await;
        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();

        let answerer = service.clone();
        let id = question.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            answerer.deliver_answer(&id, "yes").await.unwrap();
        });

        let started = Instant::now();
        let (answers, pending) = service
            .check_answers("sess-1", &[question.id.clone()], Some(60))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(answers.len(), 1);
        assert!(pending.is_empty());
        // Woken by the answer, not by the 60s wait elapsing.
        assert!(elapsed >= Duration::from_millis(250), "woke too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10), "woke too late: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_no_cross_question_wake() {
        let (_dir, _pool, service, _) = service().await;
        let a = service.ask(input("sess-1", "A?"), "proj/1").await.unwrap();
        let b = service.ask(input("sess-1", "B?"), "proj/1").await.unwrap();

        let answerer = service.clone();
        let b_id = b.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            answerer.deliver_answer(&b_id, "yes").await.unwrap();
        });

        // Waiting on A only: B's resolution must not wake this call.
        let started = Instant::now();
        let (answers, pending) = service
            .check_answers("sess-1", &[a.id.clone()], Some(1))
            .await
            .unwrap();

        assert!(answers.is_empty());
        assert_eq!(pending, vec![a.id.clone()]);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_check_with_mixed_targets_returns_resolved_half() {
        let (_dir, _pool, service, _) = service().await;
        let a = service.ask(input("sess-1", "A?"), "proj/1").await.unwrap();
        let b = service.ask(input("sess-1", "B?"), "proj/1").await.unwrap();
        service.deliver_answer(&b.id, "yes").await.unwrap();

        let (answers, pending) = service
            .check_answers("sess-1", &[a.id.clone(), b.id.clone()], Some(0))
            .await
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].id, b.id);
        assert_eq!(pending, vec![a.id.clone()]);
    }

    #[tokio::test]
    async fn test_unknown_ids_in_neither_list() {
        let (_dir, _pool, service, _) = service().await;
        let (answers, pending) = service
            .check_answers("sess-1", &["q-missing1".to_string()], Some(0))
            .await
            .unwrap();
        assert!(answers.is_empty());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ids_target_the_session() {
        let (_dir, _pool, service, _) = service().await;
        let mine = service.ask(input("sess-1", "Mine?"), "proj/1").await.unwrap();
        let theirs = service.ask(input("sess-2", "Theirs?"), "other/1").await.unwrap();

        let (answers, pending) = service.check_answers("sess-1", &[], Some(0)).await.unwrap();
        assert!(answers.is_empty());
        assert_eq!(pending, vec![mine.id.clone()]);

        // The other session's question was untouched.
        assert!(service.get(&theirs.id).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_answer_and_timeout_have_one_winner() {
        let (_dir, _pool, service, _) = service().await;
        let question = service.ask(input("sess-1", "Race?"), "proj/1").await.unwrap();

        let (answer_result, timeout_won) = tokio::join!(
            service.deliver_answer(&question.id, "yes"),
            service.time_out(&question.id, 60),
        );

        // Exactly one transition won.
        assert_ne!(answer_result.is_ok(), timeout_won);
        let final_status = service.get(&question.id).unwrap().status;
        if timeout_won {
            assert_eq!(final_status, "timed_out");
        } else {
            assert_eq!(final_status, "answered");
        }
    }

    #[tokio::test]
    async fn test_timeout_resolves_waiters() {
        let (_dir, _pool, service, notifier) = service().await;
        let question = service.ask(input("sess-1", "Slow?"), "proj/1").await.unwrap();

        let timer = service.clone();
        let id = question.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            timer.time_out(&id, 60).await;
        });

        let (answers, pending) = service
            .check_answers("sess-1", &[question.id.clone()], Some(30))
            .await
            .unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].status, "timed_out");
        assert!(pending.is_empty());

        let messages = notifier.messages();
        assert!(messages.iter().any(|m| m.contains("timed out after 60 minutes")));
    }

    /// Notifier that records whether the question was still pending at the
    /// moment the timeout notice was sent.
    struct ProbeNotifier {
        service: Mutex<Option<QuestionService>>,
        question_id: Mutex<Option<String>>,
        pending_at_notice: AtomicBool,
    }

    impl ProbeNotifier {
        fn new() -> Self {
            Self {
                service: Mutex::new(None),
                question_id: Mutex::new(None),
                pending_at_notice: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ChatNotifier for ProbeNotifier {
        async fn deliver_question(
            &self,
            _question: &Question,
            _session_label: &str,
        ) -> Result<Option<String>> {
            Ok(None)
        }

        async fn send_message(&self, text: &str, _thread_id: Option<&str>) -> Result<()> {
            if text.contains("timed out") {
                let service = self.service.lock().unwrap().clone();
                let id = self.question_id.lock().unwrap().clone();
                if let (Some(service), Some(id)) = (service, id) {
                    let pending = service.get(&id).map(|q| q.is_pending()).unwrap_or(false);
                    self.pending_at_notice.store(pending, Ordering::SeqCst);
                }
            }
            Ok(())
        }

        async fn create_topic(&self, _name: &str) -> Result<String> {
            Ok("topic-1".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_notice_sent_before_removal() {
        let probe = Arc::new(ProbeNotifier::new());
        let (_dir, _pool, service) = service_with(probe.clone()).await;
        *probe.service.lock().unwrap() = Some(service.clone());

        let question = service.ask(input("sess-1", "Slow?"), "proj/1").await.unwrap();
        *probe.question_id.lock().unwrap() = Some(question.id.clone());

        assert!(service.time_out(&question.id, 60).await);
        assert!(probe.pending_at_notice.load(Ordering::SeqCst));
        assert_eq!(service.get(&question.id).unwrap().status, "timed_out");
    }

    #[tokio::test]
    async fn test_cancel_resolves_question() {
        let (_dir, _pool, service, notifier) = service().await;
        let question = service.ask(input("sess-1", "Moot?"), "proj/1").await.unwrap();

        let cancelled = service
            .cancel(&question.id, Some("task abandoned"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, "cancelled");

        let err = service.cancel(&question.id, None).await.unwrap_err();
        assert!(matches!(err, BellhopError::QuestionAlreadyResolved(_, _)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let messages = notifier.messages();
        assert!(messages.iter().any(|m| m.contains("task abandoned")));
    }

    #[tokio::test]
    async fn test_recover_restores_pending_and_prunes_terminal() {
        let (_dir, pool, service, _) = service().await;
        let keep = service.ask(input("sess-1", "Keep?"), "proj/1").await.unwrap();
        let done = service.ask(input("sess-1", "Done?"), "proj/1").await.unwrap();
        service.deliver_answer(&done.id, "yes").await.unwrap();

        // A fresh service over the same store, as after a daemon restart.
        let restarted = QuestionService::new(pool.clone(), Arc::new(RecordingNotifier::new()));
        let recovered = restarted.recover().await.unwrap();
        assert_eq!(recovered, 1);

        let question = restarted.get(&keep.id).unwrap();
        assert!(question.is_pending());
        // Deadline derives from the original creation time, not the restart.
        assert_eq!(question.created_at, keep.created_at);

        // The uncollected answered row was pruned.
        assert!(db::questions::get(&pool, &done.id).await.unwrap().is_none());
        assert!(restarted.get(&done.id).is_none());
    }

    #[tokio::test]
    async fn test_recover_times_out_expired_question() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (_dir, pool, _service) = service_with(notifier.clone()).await;

        // A question whose deadline passed while the daemon was down.
        let mut question = Question::new(input("sess-1", "Stale?"));
        question.created_at = (chrono::Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        db::questions::insert(&pool, &question).await.unwrap();

        let restarted = QuestionService::new(pool.clone(), notifier.clone());
        restarted.recover().await.unwrap();

        // The timer fires immediately; give it a moment.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(restarted.get(&question.id).unwrap().status, "timed_out");
        assert!(notifier.messages().iter().any(|m| m.contains("timed out")));
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_uncollected() {
        let (_dir, pool, service, _) = service().await;
        let stale = service.ask(input("sess-1", "Stale?"), "proj/1").await.unwrap();
        let live = service.ask(input("sess-1", "Live?"), "proj/1").await.unwrap();
        service.deliver_answer(&stale.id, "yes").await.unwrap();

        service.sweep_older_than(Duration::ZERO).await;

        assert!(service.get(&stale.id).is_none());
        assert!(db::questions::get(&pool, &stale.id).await.unwrap().is_none());
        // Pending questions are never swept.
        assert!(service.get(&live.id).is_some());
    }

    #[tokio::test]
    async fn test_answer_confirmation_goes_to_thread() {
        let notifier = Arc::new(RecordingNotifier::with_thread("42"));
        let (_dir, _pool, service) = service_with(notifier.clone()).await;

        let question = service.ask(input("sess-1", "Deploy?"), "proj/1").await.unwrap();
        service.deliver_answer(&question.id, "yes").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let confirmation = notifier
            .notices()
            .into_iter()
            .find_map(|n| match n {
                Notice::Message { text, thread_id } if text.contains("Answer recorded") => {
                    Some(thread_id)
                }
                _ => None,
            })
            .expect("confirmation notice");
        assert_eq!(confirmation.as_deref(), Some("42"));
    }

    #[test]
    fn test_effective_wait_clamps() {
        assert_eq!(effective_wait(None), Duration::from_secs(300));
        assert_eq!(effective_wait(Some(9999)), Duration::from_secs(300));
        assert_eq!(effective_wait(Some(5)), Duration::from_secs(5));
        assert_eq!(effective_wait(Some(0)), Duration::ZERO);
    }
}
