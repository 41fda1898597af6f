//! In-memory session registry.
//!
//! Sessions are connection-scoped: each IPC connection may register at most
//! one session, and only the owning connection may mutate or remove it.
//! Sessions are deliberately not persisted; a daemon restart begins with an
//! empty registry and adapters re-register when they reconnect. Questions
//! reference sessions by id and survive independently.

use crate::error::{BellhopError, Result};
use crate::models::{Session, SessionStatus};
use crate::notifier::ChatNotifier;
use bellhop_types::ids::{
    format_session_label, generate_session_id, parse_session_label, short_project_name,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct RegistryInner {
    /// session id -> session
    sessions: HashMap<String, Session>,
    /// connection id -> session id owned by that connection
    by_client: HashMap<Uuid, String>,
}

/// Registry of live adapter sessions.
///
/// Cheap to clone; all clones share state. The lock is a plain
/// `std::sync::Mutex` held only for map access and never across an await:
/// chat notices are spawned fire-and-forget after the lock is released.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    notifier: Arc<dyn ChatNotifier>,
}

impl SessionRegistry {
    pub fn new(notifier: Arc<dyn ChatNotifier>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            notifier,
        }
    }

    /// Register a session for a connection.
    ///
    /// The label is `<project>/<n>` with the smallest free `n` among live
    /// sessions of the same project, so freed suffixes are reused. A
    /// connection may hold at most one session; a second register on the
    /// same connection is a conflict.
    pub fn register(&self, client_id: Uuid, project_root: &str) -> Result<Session> {
        let session = {
            let mut inner = self.inner.lock().unwrap();

            if let Some(existing) = inner.by_client.get(&client_id) {
                return Err(BellhopError::Conflict(format!(
                    "connection already registered session {}",
                    existing
                )));
            }

            let project = short_project_name(project_root);
            let suffix = smallest_free_suffix(&inner.sessions, &project);
            let label = format_session_label(&project, suffix);

            let mut id = generate_session_id();
            while inner.sessions.contains_key(&id) {
                id = generate_session_id();
            }

            let session = Session {
                id,
                label,
                project,
                status: SessionStatus::Idle.as_str().to_string(),
                question_title: None,
                connected_at: chrono::Utc::now().to_rfc3339(),
            };

            inner.by_client.insert(client_id, session.id.clone());
            inner.sessions.insert(session.id.clone(), session.clone());
            session
        };

        debug!(session_id = %session.id, label = %session.label, "session registered");
        self.notify(format!("🔗 Connected — {}", session.label));
        Ok(session)
    }

    /// Remove a session. Only the owning connection may unregister it.
    pub fn unregister(&self, client_id: Uuid, session_id: &str) -> Result<()> {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            self.check_ownership(&inner, client_id, session_id)?;
            inner.by_client.remove(&client_id);
            inner.sessions.remove(session_id)
        };

        if let Some(session) = removed {
            debug!(session_id = %session.id, label = %session.label, "session unregistered");
            self.notify(format!("🔌 Disconnected — {}", session.label));
        }
        Ok(())
    }

    /// Update a session's status. Cross-session updates are forbidden.
    ///
    /// `question_title` is retained only while the status is `waiting`; any
    /// other status clears it.
    pub fn update_status(
        &self,
        client_id: Uuid,
        session_id: &str,
        status: SessionStatus,
        question_title: Option<String>,
    ) -> Result<Session> {
        let mut inner = self.inner.lock().unwrap();
        self.check_ownership(&inner, client_id, session_id)?;

        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| BellhopError::SessionNotFound(session_id.to_string()))?;

        session.status = status.as_str().to_string();
        session.question_title = if status == SessionStatus::Waiting {
            question_title
        } else {
            None
        };

        Ok(session.clone())
    }

    /// Reap a connection's session when the connection drops for any reason.
    ///
    /// Registry-wise this is an unregister; the session's outstanding
    /// questions are untouched and stay pending until answered or timed out.
    pub fn handle_disconnect(&self, client_id: Uuid) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let Some(session_id) = inner.by_client.remove(&client_id) else {
                return;
            };
            inner.sessions.remove(&session_id)
        };

        if let Some(session) = removed {
            debug!(session_id = %session.id, label = %session.label, "session reaped on disconnect");
            self.notify(format!("🔌 Disconnected — {}", session.label));
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(session_id).cloned()
    }

    /// All live sessions, ordered by label for stable listings.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.label.cmp(&b.label));
        sessions
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Error unless `client_id` owns `session_id`. An existing session
    /// owned by someone else is forbidden, a missing one is not found.
    fn check_ownership(
        &self,
        inner: &RegistryInner,
        client_id: Uuid,
        session_id: &str,
    ) -> Result<()> {
        if inner.by_client.get(&client_id).map(String::as_str) == Some(session_id) {
            return Ok(());
        }
        if inner.sessions.contains_key(session_id) {
            Err(BellhopError::Forbidden(format!(
                "session {} belongs to another connection",
                session_id
            )))
        } else {
            Err(BellhopError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Fire-and-forget chat notice. Never blocks the caller, never fails.
    fn notify(&self, text: String) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_message(&text, None).await {
                warn!(error = %e, "session notice not delivered");
            }
        });
    }
}

/// Smallest suffix >= 1 not taken by a live session of the same project.
fn smallest_free_suffix(sessions: &HashMap<String, Session>, project: &str) -> u32 {
    let mut taken: Vec<u32> = sessions
        .values()
        .filter(|s| s.project == project)
        .filter_map(|s| parse_session_label(&s.label).ok().map(|(_, n)| n))
        .collect();
    taken.sort_unstable();

    let mut candidate = 1;
    for n in taken {
        if n == candidate {
            candidate += 1;
        } else if n > candidate {
            break;
        }
    }
    candidate
}
