//! Per-connection conversation state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a message in the conversation history.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single entry of the prompt history sent to the completion backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where the connection currently is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Transcribing,
    Thinking,
    Speaking,
}

/// State owned by one client connection.
///
/// While `active` is false the session is in single query mode and the
/// history is emptied at the end of every turn.
#[derive(Debug, Default)]
pub struct ConversationSession {
    messages: Vec<ChatMessage>,
    active: bool,
    phase: TurnPhase,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Switches to live-session mode with an empty history.
    pub fn start_live(&mut self) {
        self.messages.clear();
        self.active = true;
    }

    /// Switches back to single query mode with an empty history.
    pub fn end_live(&mut self) {
        self.messages.clear();
        self.active = false;
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    pub(crate) fn set_phase(&mut self, phase: TurnPhase) {
        self.phase = phase;
    }
}
