//! Drives one connection's conversation through transcription, completion and synthesis.
//!
//! A turn is the processing of a single `audio` action. The orchestrator runs
//! it to completion before the caller reads the next action, and every event
//! of a turn leaves through the [`EventSink`] in the order the client expects:
//!
//! ```text
//! status(transcribing) -> transcript -> status(thinking) -> response
//!     -> status(speaking) -> audio -> status(listening | idle)
//! ```

use crate::{
    conversation::{ConversationSession, TurnPhase},
    llm_client::ChatBackend,
    protocol::{ClientAction, SessionEvent, Status, decode_audio},
    stt::Transcriber,
    tts::Synthesizer,
    voice_effect::AudioPostProcessor,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Spoken phrase that ends a live session.
pub const END_PHRASE: &str = "goodbye";

/// What the assistant says when a live session is ended by voice.
pub const FAREWELL: &str = "Goodbye. Ending our session.";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("client connection closed: {0}")]
    Closed(String),
}

/// Destination of the events produced for one connection.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: SessionEvent) -> Result<(), SinkError>;
}

/// Collects events in memory.
#[async_trait]
impl EventSink for Vec<SessionEvent> {
    async fn emit(&mut self, event: SessionEvent) -> Result<(), SinkError> {
        self.push(event);
        Ok(())
    }
}

/// Whether `transcript` asks to end the session.
pub fn is_end_phrase(transcript: &str) -> bool {
    transcript.to_lowercase().contains(END_PHRASE)
}

/// The per-connection handler, shared by all connections.
///
/// It holds no conversation state of its own; each call operates on the
/// session passed in by the connection that owns it.
#[derive(Clone)]
pub struct SessionOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    chat: Arc<dyn ChatBackend>,
    synthesizer: Arc<dyn Synthesizer>,
    voice_effect: Option<Arc<dyn AudioPostProcessor>>,
    system_prompt: Arc<str>,
}

impl SessionOrchestrator {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        chat: Arc<dyn ChatBackend>,
        synthesizer: Arc<dyn Synthesizer>,
        system_prompt: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            transcriber,
            chat,
            synthesizer,
            voice_effect: None,
            system_prompt: system_prompt.into(),
        }
    }

    /// Runs every synthesized reply through `effect` before it is sent.
    pub fn with_voice_effect(mut self, effect: Arc<dyn AudioPostProcessor>) -> Self {
        self.voice_effect = Some(effect);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Applies one client action to `session`.
    ///
    /// Only a failing sink is reported as an error: it means the client is
    /// gone and the connection should be closed. Every other fault degrades
    /// the turn and is handled here.
    pub async fn handle<S>(
        &self,
        session: &mut ConversationSession,
        action: ClientAction,
        sink: &mut S,
    ) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        match action {
            ClientAction::StartSession => {
                session.start_live();
                info!("Live session started");
                sink.emit(SessionEvent::SessionStarted).await
            }
            ClientAction::EndSession => {
                session.end_live();
                info!("Live session ended by client");
                sink.emit(SessionEvent::SessionEnded).await
            }
            ClientAction::Audio { audio } => {
                let result = self.run_turn(session, &audio, sink).await;
                transition(session, TurnPhase::Idle);
                result
            }
            ClientAction::Unrecognized => {
                debug!("Ignoring unrecognized client action");
                Ok(())
            }
        }
    }

    async fn run_turn<S>(
        &self,
        session: &mut ConversationSession,
        payload: &str,
        sink: &mut S,
    ) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        if session.phase() != TurnPhase::Idle {
            warn!(phase = ?session.phase(), "Audio received while a turn was in progress");
        }

        let audio = match decode_audio(payload) {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "Could not decode audio payload; ignoring it");
                return Ok(());
            }
        };

        sink.emit(SessionEvent::status(Status::Transcribing)).await?;
        transition(session, TurnPhase::Transcribing);
        let transcript = self.transcriber.transcribe(audio).await;
        sink.emit(SessionEvent::Transcript {
            text: transcript.clone(),
        })
        .await?;

        if transcript.trim().is_empty() {
            debug!("Nothing was heard; turn finished");
            transition(session, TurnPhase::Idle);
            return sink.emit(SessionEvent::status(Status::Idle)).await;
        }

        if session.is_active() && is_end_phrase(&transcript) {
            return self.say_farewell(session, sink).await;
        }

        sink.emit(SessionEvent::status(Status::Thinking)).await?;
        session.add_user_message(transcript);
        transition(session, TurnPhase::Thinking);
        let reply = self
            .chat
            .complete(session.messages(), &self.system_prompt)
            .await;
        session.add_assistant_message(reply.clone());

        sink.emit(SessionEvent::Response {
            text: reply.clone(),
        })
        .await?;
        sink.emit(SessionEvent::status(Status::Speaking)).await?;
        transition(session, TurnPhase::Speaking);
        let audio = self.speak(&reply).await;
        sink.emit(SessionEvent::Audio { audio }).await?;

        transition(session, TurnPhase::Idle);
        if session.is_active() {
            sink.emit(SessionEvent::status(Status::Listening)).await
        } else {
            session.clear_history();
            sink.emit(SessionEvent::status(Status::Idle)).await
        }
    }

    /// Ends the live session by voice. The completion backend is not consulted.
    async fn say_farewell<S>(
        &self,
        session: &mut ConversationSession,
        sink: &mut S,
    ) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        session.end_live();
        info!("Live session ended by end phrase");

        sink.emit(SessionEvent::Response {
            text: FAREWELL.to_string(),
        })
        .await?;
        sink.emit(SessionEvent::status(Status::Speaking)).await?;
        transition(session, TurnPhase::Speaking);
        let audio = self.speak(FAREWELL).await;
        sink.emit(SessionEvent::Audio { audio }).await?;
        transition(session, TurnPhase::Idle);
        sink.emit(SessionEvent::SessionEnded).await
    }

    /// Synthesizes `text`, applying the voice effect when one is configured.
    ///
    /// A failed effect is logged and the unprocessed audio is used instead.
    async fn speak(&self, text: &str) -> Bytes {
        let audio = self.synthesizer.synthesize(text).await;
        let Some(effect) = &self.voice_effect else {
            return audio;
        };
        if audio.is_empty() {
            return audio;
        }
        match effect.process(audio.clone()).await {
            Ok(processed) => processed,
            Err(e) => {
                error!(error = %e, "Voice effect failed; sending unprocessed audio");
                audio
            }
        }
    }
}

fn transition(session: &mut ConversationSession, to: TurnPhase) {
    let from = session.phase();
    if from != to {
        debug!(?from, ?to, "Turn phase changed");
        session.set_phase(to);
    }
}
