//! Manages the WebSocket connection lifecycle for a voice session.

use super::sink::WsEventSink;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{Stream, StreamExt};
use panda_core::{
    orchestrator::{EventSink, SessionOrchestrator},
    protocol::ClientAction,
    registry::{ConnectionId, SessionHandle},
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Registers a fresh conversation for the connection and serves it until the
/// client goes away. The registration is dropped on every exit path, which
/// removes the conversation from the registry.
#[instrument(name = "ws_connection", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", &connection_id.to_string());

    let registration = match state.registry.register(connection_id) {
        Ok(registration) => registration,
        Err(e) => {
            error!("Could not register connection: {}", e);
            return;
        }
    };
    info!(
        connections = state.registry.len(),
        "New WebSocket connection."
    );

    let (socket_tx, socket_rx) = socket.split();
    let mut sink = WsEventSink(socket_tx);
    run_connection(
        &state.orchestrator,
        registration.session(),
        socket_rx,
        &mut sink,
    )
    .await;

    drop(registration);
    info!(
        connections = state.registry.len(),
        "WebSocket connection closed."
    );
}

/// The receive loop of one connection.
///
/// Frames are handled strictly one after another, so a turn always finishes
/// before the next action is read.
pub async fn run_connection<R, S>(
    orchestrator: &SessionOrchestrator,
    session: &SessionHandle,
    mut socket_rx: R,
    sink: &mut S,
) where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    S: EventSink + ?Sized,
{
    while let Some(msg_result) = socket_rx.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame; audio must be sent as an `audio` action.");
                continue;
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        };

        let action = match serde_json::from_str::<ClientAction>(text.as_str()) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed client frame.");
                continue;
            }
        };
        let mut session = session.lock().await;
        if let Err(e) = orchestrator.handle(&mut session, action, sink).await {
            warn!(error = %e, "Could not deliver event; closing connection.");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use panda_core::{
        conversation::{ChatMessage, ConversationSession},
        llm_client::ChatBackend,
        orchestrator::SinkError,
        protocol::{SessionEvent, Status},
        stt::Transcriber,
        tts::Synthesizer,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    const AUDIO_B64: &str = "aGVsbG8=";

    struct Scripted {
        transcript: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transcriber for Scripted {
        async fn transcribe(&self, _audio: Bytes) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.transcript.to_string()
        }
    }

    struct Echo;

    #[async_trait]
    impl ChatBackend for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn complete(&self, history: &[ChatMessage], _system_prompt: &str) -> String {
            format!("heard {} message(s)", history.len())
        }
    }

    struct Silence;

    #[async_trait]
    impl Synthesizer for Silence {
        async fn synthesize(&self, _text: &str) -> Bytes {
            Bytes::from_static(b"mp3")
        }
    }

    struct ClosedSink;

    #[async_trait]
    impl EventSink for ClosedSink {
        async fn emit(&mut self, _event: SessionEvent) -> Result<(), SinkError> {
            Err(SinkError::Closed("peer went away".to_string()))
        }
    }

    fn orchestrator(transcript: &'static str) -> (SessionOrchestrator, Arc<Scripted>) {
        let transcriber = Arc::new(Scripted {
            transcript,
            calls: AtomicUsize::new(0),
        });
        let orchestrator = SessionOrchestrator::new(
            transcriber.clone(),
            Arc::new(Echo),
            Arc::new(Silence),
            "test persona",
        );
        (orchestrator, transcriber)
    }

    fn session() -> SessionHandle {
        Arc::new(Mutex::new(ConversationSession::new()))
    }

    fn text(json: &str) -> Result<Message, axum::Error> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn audio_frame() -> Result<Message, axum::Error> {
        text(&format!(r#"{{"action":"audio","audio":"{AUDIO_B64}"}}"#))
    }

    #[tokio::test]
    async fn test_live_turn_is_streamed_in_order() {
        let (orchestrator, _) = orchestrator("what is the weather");
        let session = session();
        let frames = futures_util::stream::iter(vec![
            text(r#"{"action":"start_session"}"#),
            audio_frame(),
        ]);
        let mut events: Vec<SessionEvent> = Vec::new();

        run_connection(&orchestrator, &session, frames, &mut events).await;

        assert_eq!(
            events,
            vec![
                SessionEvent::SessionStarted,
                SessionEvent::status(Status::Transcribing),
                SessionEvent::Transcript {
                    text: "what is the weather".to_string()
                },
                SessionEvent::status(Status::Thinking),
                SessionEvent::Response {
                    text: "heard 1 message(s)".to_string()
                },
                SessionEvent::status(Status::Speaking),
                SessionEvent::Audio {
                    audio: Bytes::from_static(b"mp3")
                },
                SessionEvent::status(Status::Listening),
            ]
        );
        let session = session.lock().await;
        assert!(session.is_active());
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_and_binary_frames_are_skipped() {
        let (orchestrator, transcriber) = orchestrator("hello");
        let session = session();
        let frames = futures_util::stream::iter(vec![
            text("not json at all"),
            text(r#"{"action":"dance"}"#),
            Ok(Message::Binary(Bytes::from_static(b"\x00\x01"))),
            Ok(Message::Ping(Bytes::new())),
            audio_frame(),
        ]);
        let mut events: Vec<SessionEvent> = Vec::new();

        run_connection(&orchestrator, &session, frames, &mut events).await;

        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::status(Status::Idle))
        );
        assert!(session.lock().await.messages().is_empty());
    }

    #[tokio::test]
    async fn test_close_frame_stops_reading() {
        let (orchestrator, transcriber) = orchestrator("hello");
        let session = session();
        let frames = futures_util::stream::iter(vec![
            Ok(Message::Close(None)),
            audio_frame(),
        ]);
        let mut events: Vec<SessionEvent> = Vec::new();

        run_connection(&orchestrator, &session, frames, &mut events).await;

        assert!(events.is_empty());
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_receive_error_stops_reading() {
        let (orchestrator, transcriber) = orchestrator("hello");
        let session = session();
        let frames = futures_util::stream::iter(vec![
            Err(axum::Error::new(std::io::Error::other("connection reset"))),
            audio_frame(),
        ]);
        let mut events: Vec<SessionEvent> = Vec::new();

        run_connection(&orchestrator, &session, frames, &mut events).await;

        assert!(events.is_empty());
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_stops_reading() {
        let (orchestrator, transcriber) = orchestrator("hello");
        let session = session();
        let frames = futures_util::stream::iter(vec![audio_frame(), audio_frame()]);

        run_connection(&orchestrator, &session, frames, &mut ClosedSink).await;

        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    }
}
