//! Conversational completion backends.
//!
//! Every backend answers the same question: given the system prompt and the
//! conversation so far, what does the assistant say next. The wire shape of
//! each remote service differs and is normalized by its client.

pub mod anthropic;
pub mod gateway;
pub mod local;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use gateway::{GatewayClient, GatewayConfig};
pub use local::{LocalClient, LocalConfig};

use crate::conversation::{ChatMessage, Role};
use async_trait::async_trait;
use serde::Serialize;

/// Reply used when a backend cannot be reached or answers with garbage.
pub const APOLOGY: &str = "I encountered an error processing your request.";

/// Reply used when a backend answers successfully but without any text.
pub const NO_TEXT_REPLY: &str = "I couldn't process that request.";

pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// A generic client for a conversational completion endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produces the assistant's next message. Never fails; remote faults
    /// become [`APOLOGY`].
    async fn complete(&self, history: &[ChatMessage], system_prompt: &str) -> String;
}

/// A message as OpenAI-style chat endpoints expect it, with the system prompt inline.
#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct WireMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Prepends the system prompt to the history for backends without a separate `system` field.
pub(crate) fn with_system_prompt<'a>(
    system_prompt: &'a str,
    history: &'a [ChatMessage],
) -> Vec<WireMessage<'a>> {
    std::iter::once(WireMessage {
        role: "system",
        content: system_prompt,
    })
    .chain(history.iter().map(|m| WireMessage {
        role: match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: &m.content,
    }))
    .collect()
}
