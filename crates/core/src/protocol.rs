//! Defines the WebSocket message protocol between the browser client and the gateway.

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Actions sent from the client (browser) to the gateway.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Enters live-session mode with an empty conversation.
    StartSession,
    /// Leaves live-session mode and forgets the conversation.
    EndSession,
    /// One recorded utterance.
    Audio {
        /// Base64 encoded audio as captured by the browser.
        #[serde(default)]
        audio: String,
    },
    /// Any action the gateway does not know about. Ignored.
    #[serde(other)]
    Unrecognized,
}

/// Progress reported to the client while a turn is processed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Transcribing,
    Thinking,
    Speaking,
    Listening,
    Idle,
}

/// Messages sent from the gateway to the client (browser).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Confirms that live-session mode is on.
    SessionStarted,
    /// Confirms that live-session mode is off.
    SessionEnded,
    /// The gateway moved to a new stage of the current turn.
    Status { status: Status },
    /// What the gateway heard. May be empty.
    Transcript { text: String },
    /// What the assistant is about to say.
    Response { text: String },
    /// The spoken reply, base64 encoded on the wire.
    Audio {
        #[serde(with = "base64_bytes")]
        audio: Bytes,
    },
}

impl SessionEvent {
    pub fn status(status: Status) -> Self {
        Self::Status { status }
    }
}

/// Decodes the base64 payload of an `audio` action.
pub fn decode_audio(payload: &str) -> Result<Bytes, base64::DecodeError> {
    STANDARD.decode(payload.trim()).map(Bytes::from)
}

mod base64_bytes {
    use super::*;
    use serde::{Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(audio: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(audio))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map(Bytes::from).map_err(D::Error::custom)
    }
}
