//! Shared daemon state handed to every connection task.

use crate::daemon::questions::QuestionService;
use crate::daemon::registry::SessionRegistry;
use crate::notifier::ChatNotifier;
use bellhop_types::GlobalConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

/// Everything a request handler can touch, bundled behind one `Arc`.
pub struct DaemonState {
    pub registry: SessionRegistry,
    pub questions: QuestionService,
    pub notifier: Arc<dyn ChatNotifier>,
    /// Timeout applied to questions that do not carry their own.
    pub default_timeout_minutes: i64,
    started: Instant,
    shutdown: Notify,
}

impl DaemonState {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn ChatNotifier>, config: &GlobalConfig) -> Self {
        Self {
            registry: SessionRegistry::new(notifier.clone()),
            questions: QuestionService::new(pool, notifier.clone()),
            notifier,
            default_timeout_minutes: config.questions.default_timeout_minutes,
            started: Instant::now(),
            shutdown: Notify::new(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Ask the main loop to exit. The permit sticks, so a request that lands
    /// before the loop is listening is not lost.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once a shutdown has been requested over IPC.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}
