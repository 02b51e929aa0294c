//! Manages the primary WebSocket connection lifecycle for an exam session.

use super::{
    protocol::{ClientMessage, ServerMessage},
    turn::handle_turn,
};
use crate::state::{AppState, SessionHandle};
use anyhow::{Context, Result, anyhow};
use avex_core::agent::ExaminerService;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, RawContent},
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// This function is the entry point for a new connection. It performs the
/// initial handshake to attach to a session from the registry and then spawns
/// the main session loop.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let socket_tx_arc = Arc::new(Mutex::new(socket_tx));

    // The first message from the client must be an `init` message.
    let handle = if let Some(Ok(ws_msg)) = socket_rx.next().await {
        match ws_msg {
            Message::Text(text) => attach_session(&text, &state).await,
            _ => Err(anyhow!("First message was not a text `init` message.")),
        }
    } else {
        info!("Client disconnected before sending init message.");
        return;
    };

    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            // If initialization fails, send an error and terminate.
            error!("Session initialization failed: {:?}", e);
            let mut sink = socket_tx_arc.lock().await;
            let _ = send_msg(
                &mut sink,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    let session_id = handle.id;
    tracing::Span::current().record("session_id", &session_id.to_string());

    // Send the `Initialized` message to the client to confirm success.
    let initial_state = handle.machine.lock().await.session().clone();
    if send_msg(
        &mut *socket_tx_arc.lock().await,
        ServerMessage::Initialized {
            session_id,
            state: initial_state,
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    // Spawn the main session loop in a separate, instrumented task.
    let session_span = tracing::info_span!("exam_runtime", %session_id, exam_type = %handle.exam_type);
    tokio::spawn(
        async move {
            if let Err(e) = run_exam_session(socket_tx_arc, socket_rx, handle).await {
                error!(error = ?e, "Exam session terminated with error.");
            }
            info!("Exam session finished.");
        }
        .instrument(session_span),
    );
}

/// Parses the `init` message and looks up the session in the registry.
async fn attach_session(init_text: &str, state: &Arc<AppState>) -> Result<SessionHandle> {
    let init_msg: ClientMessage = serde_json::from_str(init_text)?;
    let session_id = if let ClientMessage::Init { session_id } = init_msg {
        session_id.context("`session_id` is required for `init`")?
    } else {
        return Err(anyhow!("First message must be `init`"));
    };

    state
        .get_session(session_id)
        .await
        .with_context(|| format!("session {session_id} not found"))
}

/// The main event loop for an active WebSocket session.
///
/// Listens for candidate utterances and agent tool calls from the client, and
/// for session state updates from the tool service, and relays both sides.
async fn run_exam_session(
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut socket_rx: SplitStream<WebSocket>,
    handle: SessionHandle,
) -> Result<()> {
    let machine = handle.machine.clone();
    let (state_update_tx, mut state_update_rx) = mpsc::channel(8);
    let examiner_service = ExaminerService::new(machine.clone(), Some(state_update_tx));
    let (server_transport, client_transport) = tokio::io::duplex(4096);

    // Spawn the agent's tool-handling service.
    let tool_handle = tokio::spawn(async move {
        if let Ok(service) = examiner_service.serve(server_transport).await {
            let _ = service.waiting().await;
        }
    });
    let mcp_client = ().serve(client_transport).await?;

    loop {
        tokio::select! {
            // Handle messages from the client WebSocket.
            Some(msg_result) = socket_rx.next() => {
                match msg_result {
                    Ok(ws_msg) => match ws_msg {
                        Message::Text(text) => {
                            if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                                match msg {
                                    ClientMessage::Utterance { text } => {
                                        handle_turn(&machine, &socket_tx, &text).await?;
                                    }
                                    ClientMessage::ToolCall { name, arguments } => {
                                        let result = call_tool(&mcp_client, &name, arguments).await;
                                        let result = match result {
                                            Ok(text) => text,
                                            Err(e) => {
                                                warn!("Tool call `{name}` failed: {e:?}");
                                                format!("{{\"error\": \"{e}\"}}")
                                            }
                                        };
                                        let mut sink = socket_tx.lock().await;
                                        send_msg(&mut sink, ServerMessage::ToolResult { name, result }).await?;
                                    }
                                    ClientMessage::Init { .. } => {
                                        warn!("Ignoring unexpected `init` post-handshake.");
                                    }
                                }
                            }
                        },
                        Message::Close(_) => {
                            info!("Client sent close frame. Shutting down session.");
                            break;
                        },
                        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {},
                    },
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            // Relay state updates produced by agent tool calls.
            Some(new_state) = state_update_rx.recv() => {
                send_msg(&mut *socket_tx.lock().await, ServerMessage::StateUpdate { state: new_state }).await?;
            },
            // If all channels close, exit the loop.
            else => break,
        }
    }

    tool_handle.abort();
    info!("WebSocket connection closed and exam session terminated.");
    Ok(())
}

/// Invokes one agent tool over the in-process MCP transport.
async fn call_tool(
    mcp_client: &rmcp::service::RunningService<rmcp::service::RoleClient, ()>,
    name: &str,
    arguments: serde_json::Value,
) -> Result<String> {
    let result = mcp_client
        .peer()
        .call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: arguments.as_object().cloned(),
        })
        .await?;

    let annotated_content = result
        .content
        .context("Tool call returned no content")?
        .pop()
        .context("Content list was empty")?;
    match annotated_content.raw {
        RawContent::Text(text_content) => Ok(text_content.text),
        _ => Err(anyhow!("Unexpected content type from tool")),
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
