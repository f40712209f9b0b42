use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use panda_core::{
    orchestrator::{EventSink, SinkError},
    protocol::SessionEvent,
};

/// Writes session events to the client as JSON text frames.
pub struct WsEventSink(pub SplitSink<WebSocket, Message>);

#[async_trait]
impl EventSink for WsEventSink {
    async fn emit(&mut self, event: SessionEvent) -> Result<(), SinkError> {
        let serialized = serde_json::to_string(&event)?;
        self.0
            .send(Message::Text(serialized.into()))
            .await
            .map_err(|e| SinkError::Closed(e.to_string()))
    }
}
