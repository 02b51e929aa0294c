//! Shared Application State
//!
//! Holds the in-memory registry of live exam sessions. Sessions are not
//! persisted: an attempt exists exactly as long as its handle is in this map
//! and is discarded on explicit end/reset.

use crate::config::Config;
use avex_core::clock::{Clock, SystemClock};
use avex_core::exam::{ExamType, ExamTypeConfig};
use avex_core::session::SessionStateMachine;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A live exam session: the state machine plus its identity.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub exam_type: ExamType,
    pub machine: Arc<Mutex<SessionStateMachine>>,
}

/// The shared application state, created once at startup and passed to all
/// handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        AppState {
            config,
            clock: Arc::new(SystemClock),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a session for an exam type and confirms it ready to start.
    pub async fn create_session(&self, exam_type: ExamType) -> SessionHandle {
        let exam_config = Arc::new(ExamTypeConfig::builtin(exam_type));
        let mut machine =
            SessionStateMachine::new(exam_config, self.clock.clone(), self.config.execution);
        machine.confirm_ready();

        let handle = SessionHandle {
            id: Uuid::new_v4(),
            exam_type,
            machine: Arc::new(Mutex::new(machine)),
        };
        self.sessions
            .write()
            .await
            .insert(handle.id, handle.clone());
        handle
    }

    pub async fn get_session(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Discards a session handle. The attempt is gone once this returns.
    pub async fn remove_session(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.write().await.remove(&id)
    }
}
