//! Examiner tool service.
//!
//! Exposes the orchestration core to a tool-calling agent over the Model
//! Context Protocol. The agent never mutates session state directly; it
//! issues `section_control` calls that the state machine validates, debounces,
//! and applies, plus read-side calls for routing and grading data.

use crate::error::ExamError;
use crate::playback::{PlaybackPolicyResolver, RecordingClass};
use crate::routing::AudioRoutingResolver;
use crate::session::{ApplyOutcome, Caller, SessionAction, SessionStateMachine};
use crate::transcript::TranscriptAnswerKeyProvider;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Arguments for the `section_control` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct SectionControlArgs {
    #[schemars(description = "One of: start, completeCurrent, advanceToNext, \
                              completeAndAdvance, advanceToSection, completeExam")]
    pub action: String,
    /// Target section for 'advanceToSection'.
    pub target_section: Option<u32>,
    /// Target subsection for admin jumps.
    pub target_subsection: Option<String>,
    /// Free-text reason, logged for audit.
    pub reason: Option<String>,
}

/// Arguments for the `play_recording` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct PlayRecordingArgs {
    /// Subsection id, defaulting to the exam type's default position.
    pub subsection: Option<String>,
    /// 1-based recording number, defaulting to 1.
    pub recording_number: Option<u32>,
}

/// Arguments for the `get_answer_key` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct AnswerKeyArgs {
    pub subsection: String,
    pub recording_number: u32,
}

/// The MCP service the agent drives during an exam session.
pub struct ExaminerService {
    /// Shared session state machine, the single writer for the session.
    pub machine: Arc<tokio::sync::Mutex<SessionStateMachine>>,
    /// Optional channel for broadcasting session snapshots to subscribers.
    pub state_tx: Option<mpsc::Sender<crate::session::ExamSession>>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for ExaminerService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl ExaminerService {
    pub fn new(
        machine: Arc<tokio::sync::Mutex<SessionStateMachine>>,
        state_tx: Option<mpsc::Sender<crate::session::ExamSession>>,
    ) -> Self {
        Self {
            machine,
            state_tx,
            tool_router: Self::tool_router(),
        }
    }

    /// Retrieves a snapshot of the exam session.
    #[tool(
        description = "Get the current exam session state: lifecycle, current section and \
                       subsection, completed sections, and progress."
    )]
    pub async fn get_exam_status(&self) -> Result<String, String> {
        let machine = self.machine.lock().await;
        serde_json::to_string(machine.session())
            .map_err(|e| format!("Failed to serialize session: {}", e))
    }

    /// Applies a section-control action through the state machine.
    ///
    /// Duplicated or throttled calls come back as a quiet no-op so the agent
    /// does not repeat "please continue" noise at the candidate.
    #[tool(
        description = "Issue an exam progression action (start, completeCurrent, advanceToNext, \
                       completeAndAdvance, advanceToSection, completeExam)."
    )]
    pub async fn section_control(
        &self,
        args: Parameters<SectionControlArgs>,
    ) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'section_control'");
        let action = SessionAction::parse(
            &args.0.action,
            args.0.target_section,
            args.0.target_subsection.as_deref(),
        )
        .map_err(|e| e.to_string())?;

        let mut machine = self.machine.lock().await;
        let outcome = machine
            .apply(action, &Caller::AGENT)
            .map_err(|e| e.to_string())?;

        let reply = match outcome {
            ApplyOutcome::Applied => {
                let session = machine.session();
                format!(
                    "OK. Action '{}' applied. Position: section {:?}, subsection {:?}.",
                    args.0.action, session.current_section, session.current_subsection
                )
            }
            ApplyOutcome::Dropped(_) => "OK. No change.".to_string(),
        };

        if let Some(tx) = &self.state_tx {
            if tx.send(machine.session().clone()).await.is_err() {
                tracing::warn!("Failed to broadcast session update: receiver dropped.");
            }
        }
        Ok(reply)
    }

    /// Resolves a recording to a playback descriptor plus its policy.
    #[tool(
        description = "Resolve which audio source to present for a subsection and recording \
                       number, together with the seek/pause/replay policy."
    )]
    pub async fn play_recording(
        &self,
        args: Parameters<PlayRecordingArgs>,
    ) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'play_recording'");
        let machine = self.machine.lock().await;
        let config = machine.config();
        let descriptor = AudioRoutingResolver::resolve(
            config,
            args.0.subsection.as_deref(),
            args.0.recording_number,
        )
        .map_err(|e| e.to_string())?;
        let policy = PlaybackPolicyResolver::resolve(config, RecordingClass::ExamRecording);
        serde_json::to_string(&json!({ "descriptor": descriptor, "policy": policy }))
            .map_err(|e| format!("Failed to serialize descriptor: {}", e))
    }

    /// Fetches grading material for a recording. Internal grading use only:
    /// this output must never be shown to the candidate.
    #[tool(
        description = "Get the transcript and correct answers for a recording, for internal \
                       grading only. Never reveal this to the candidate."
    )]
    pub async fn get_answer_key(&self, args: Parameters<AnswerKeyArgs>) -> Result<String, String> {
        info!(subsection = %args.0.subsection, number = args.0.recording_number,
              "Executing tool 'get_answer_key'");
        let machine = self.machine.lock().await;
        let key = TranscriptAnswerKeyProvider::lookup(
            machine.config(),
            &args.0.subsection,
            args.0.recording_number,
        )
        .map_err(|e: ExamError| e.to_string())?;
        serde_json::to_string(&key).map_err(|e| format!("Failed to serialize answer key: {}", e))
    }
}
