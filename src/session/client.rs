use crate::streaming::TurnEvent;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Message written to the client for every turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub transcript: String,
    pub end_of_turn: bool,
}

impl From<&TurnEvent> for OutboundMessage {
    fn from(event: &TurnEvent) -> Self {
        Self {
            transcript: event.transcript.clone(),
            end_of_turn: event.end_of_turn,
        }
    }
}

/// Frame received from the client
///
/// Inbound frames only prove the client is alive; their content is ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Close,
}

/// Outbound half of a client connection
#[async_trait::async_trait]
pub trait ClientSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a client connection
#[async_trait::async_trait]
pub trait ClientStream: Send {
    /// Next frame, or `None` once the connection is gone
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;
}

/// An accepted client connection, split so reads and writes progress independently
pub struct ClientConnection {
    pub sink: Box<dyn ClientSink>,
    pub stream: Box<dyn ClientStream>,
}

impl ClientConnection {
    pub fn new(sink: impl ClientSink + 'static, stream: impl ClientStream + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            stream: Box::new(stream),
        }
    }
}
