use crate::session::{ClientConnection, ClientSink, ClientStream, InboundFrame};
use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

/// Outbound half of an axum websocket
pub struct WsClientSink(SplitSink<WebSocket, Message>);

/// Inbound half of an axum websocket
pub struct WsClientStream(SplitStream<WebSocket>);

/// Split an upgraded websocket into a bridge client connection
pub fn client_connection(socket: WebSocket) -> ClientConnection {
    let (sink, stream) = socket.split();
    ClientConnection::new(WsClientSink(sink), WsClientStream(stream))
}

#[async_trait::async_trait]
impl ClientSink for WsClientSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .context("Failed to send websocket message")
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await.context("Failed to close websocket")
    }
}

#[async_trait::async_trait]
impl ClientStream for WsClientStream {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        let message = self.0.next().await?;

        Some(
            message
                .map(|message| match message {
                    Message::Text(text) => InboundFrame::Text(text.to_string()),
                    Message::Binary(data) => InboundFrame::Binary(data.to_vec()),
                    Message::Ping(_) | Message::Pong(_) => InboundFrame::Ping,
                    Message::Close(_) => InboundFrame::Close,
                })
                .context("Failed to read websocket message"),
        )
    }
}
