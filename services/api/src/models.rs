//! API Models
//!
//! This module defines the REST request/response structures and their
//! `utoipa` schemas. Session state itself lives in `avex-core`; these types
//! are the presentation-layer views of it.

use avex_core::session::{ExamSession, Lifecycle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    /// Exam type identifier: "eplis" or "sdea".
    #[schema(example = "eplis")]
    pub exam_type: String,
}

/// A candidate-facing control action routed through the state machine.
#[derive(Deserialize, ToSchema, Debug)]
pub struct ActionPayload {
    #[schema(example = "advanceToNext")]
    pub action: String,
    pub target_section: Option<u32>,
    pub target_subsection: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ExamTypeInfo {
    #[schema(example = "eplis")]
    pub exam_type: String,
    pub total_sections: u32,
    pub duration_minutes: u32,
}

/// Read-only snapshot of a live session.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct SessionSnapshot {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(example = "eplis")]
    pub exam_type: String,
    #[schema(example = "in_progress")]
    pub lifecycle: String,
    pub current_section: Option<u32>,
    pub current_subsection: Option<String>,
    pub completed_sections: Vec<u32>,
    pub completed_subsections: Vec<String>,
    pub progress_percent: u8,
    pub progression_locked: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    /// Seconds left on the exam clock; `None` before start, 0 once elapsed.
    pub remaining_seconds: Option<i64>,
    pub total_sections: u32,
}

impl SessionSnapshot {
    pub fn from_session(id: Uuid, session: &ExamSession) -> Self {
        SessionSnapshot {
            id,
            exam_type: session.exam_type.to_string(),
            lifecycle: lifecycle_str(session.lifecycle).to_string(),
            current_section: session.current_section,
            current_subsection: session.current_subsection.clone(),
            completed_sections: session.completed_sections.iter().copied().collect(),
            completed_subsections: session.completed_subsections.iter().cloned().collect(),
            progress_percent: session.progress_percent,
            progression_locked: session.progression_locked,
            started_at: session.started_at,
            duration_minutes: session.duration_minutes,
            remaining_seconds: session.started_at.map(|at| {
                let total = i64::from(session.duration_minutes) * 60;
                let elapsed = (Utc::now() - at).num_seconds();
                (total - elapsed).max(0)
            }),
            total_sections: session.total_sections,
        }
    }
}

fn lifecycle_str(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::NotStarted => "not_started",
        Lifecycle::Ready => "ready",
        Lifecycle::InProgress => "in_progress",
        Lifecycle::Completed => "completed",
    }
}

/// Outcome of a control action plus the resulting session snapshot.
#[derive(Serialize, ToSchema, Debug)]
pub struct ControlResponse {
    /// "applied", or "dropped:<reason>" for silent no-ops.
    #[schema(example = "applied")]
    pub outcome: String,
    pub session: SessionSnapshot,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
