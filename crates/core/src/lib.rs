//! PANDA Core Library Crate
//!
//! Transport-agnostic pieces of the voice gateway: the client/gateway wire
//! protocol, per-connection conversation state, the connection registry, the
//! remote speech and chat adapters, the voice effect stage and the session
//! orchestrator that chains them together for every spoken turn.

pub mod conversation;
pub mod error;
mod http;
pub mod llm_client;
pub mod orchestrator;
pub mod prompt;
pub mod protocol;
pub mod registry;
pub mod stt;
pub mod tts;
pub mod voice_effect;
