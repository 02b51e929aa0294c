//! Per-turn gate: runs the topic guard and directive builder for each
//! inbound candidate utterance before anything reaches the agent.

use crate::ws::{protocol::ServerMessage, session::send_msg};
use anyhow::Result;
use avex_core::TurnGate;
use avex_core::session::SessionStateMachine;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Evaluates one utterance against the session's current position.
///
/// Off-topic turns are answered with a redirect and never reach the agent.
/// On-topic turns produce an optional directive the client splices into the
/// examiner prompt for this turn only.
pub async fn handle_turn(
    machine: &Arc<Mutex<SessionStateMachine>>,
    socket_tx: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    text: &str,
) -> Result<()> {
    let gate = {
        let machine = machine.lock().await;
        let session = machine.session();
        let section = session.current_section.unwrap_or(1);
        let subsection = session.current_subsection.clone();
        avex_core::evaluate_turn(machine.config(), section, subsection.as_deref(), text)
    };

    let mut sink = socket_tx.lock().await;
    match gate {
        TurnGate::Redirect { message } => {
            info!("Utterance blocked by topic guard.");
            send_msg(&mut sink, ServerMessage::GuardRedirect { message }).await?;
        }
        TurnGate::Proceed { directive } => {
            send_msg(&mut sink, ServerMessage::Directive { text: directive }).await?;
        }
    }
    Ok(())
}
