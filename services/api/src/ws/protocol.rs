//! Defines the WebSocket message protocol between the browser client and the API server.

use avex_core::session::ExamSession;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Attaches to an existing session. This must be the first message.
    #[serde(rename = "init")]
    Init {
        /// The unique identifier of the session to attach to.
        session_id: Option<Uuid>,
    },
    /// A transcribed candidate utterance for this turn.
    #[serde(rename = "utterance")]
    Utterance { text: String },
    /// A tool invocation requested by the examiner agent.
    #[serde(rename = "tool_call")]
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful session attachment and provides the initial state.
    Initialized {
        session_id: Uuid,
        state: ExamSession,
    },
    /// Pushes a complete, updated session state to the client.
    StateUpdate { state: ExamSession },
    /// The utterance was off-topic; the examiner must deliver this redirect verbatim.
    GuardRedirect { message: String },
    /// Per-turn directives to prepend to the examiner prompt. `None` when
    /// the turn needs no special handling.
    Directive { text: Option<String> },
    /// The raw result of an agent tool call.
    ToolResult { name: String, result: String },
    /// Reports a fatal error to the client.
    Error { message: String },
}
