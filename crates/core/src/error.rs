//! Errors raised by the remote speech and chat adapters.
//!
//! These never reach the session state machine: each adapter converts them to
//! its fallback value and logs them.

/// Failure of a single outbound request to a remote endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
}
