//! WebSocket Session Management
//!
//! This module contains the core logic for handling real-time exam sessions
//! over WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `turn`: Runs the topic guard and directive builder on each candidate utterance.

pub mod protocol;
pub mod session;
mod turn;

pub use session::ws_handler;
