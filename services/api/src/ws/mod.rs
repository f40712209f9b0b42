//! WebSocket Session Management
//!
//! This module contains the logic for serving voice sessions over WebSockets:
//!
//! - `session`: Manages the connection lifecycle, from upgrade to registry cleanup.
//! - `sink`: Writes session events back to the client as JSON text frames.

pub mod session;
mod sink;

pub use session::ws_handler;
pub use sink::WsEventSink;
