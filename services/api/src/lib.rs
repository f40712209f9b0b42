//! PANDA9000 API Library Crate
//!
//! This library contains the web-facing half of the voice assistant: the
//! configuration layer, the application state, the HTTP handlers, the
//! WebSocket connection loop and the routing. The binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod ws;
