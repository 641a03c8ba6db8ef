use super::events::{EventReceiver, EventSender, StreamingError, StreamingEvent};
use super::messages::{parse_server_message, ClientMessage, SessionParameters, StreamingParameters};
use super::TranscriptionSession;
use crate::audio::AudioFrame;
use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Normal websocket closure
const CLOSE_NORMAL: u16 = 1000;

/// How long the writer gets to flush the close frame
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StreamingClientOptions {
    /// Secret used in the `Authorization` header
    pub api_key: String,
    /// Host of the streaming endpoint, e.g. "streaming.assemblyai.com"
    pub api_host: String,
    /// How long `disconnect(true)` waits for the server to finish the session
    pub disconnect_timeout: Duration,
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// AssemblyAI Universal Streaming (v3) session over a websocket
///
/// Audio and control messages go through an unbounded outbound queue drained
/// by a writer task, so `stream` and `set_params` never wait on the network.
/// A reader task decodes server messages into `StreamingEvent`s.
pub struct AssemblyAiSession {
    options: StreamingClientOptions,
    connection: Mutex<Option<Connection>>,
}

impl AssemblyAiSession {
    pub fn new(options: StreamingClientOptions) -> Self {
        Self {
            options,
            connection: Mutex::new(None),
        }
    }

    /// Websocket URL for the given parameters
    ///
    /// A bare host gets `wss://`; a host with an explicit scheme is used as is.
    pub fn url(&self, params: &StreamingParameters) -> String {
        let host = self.options.api_host.trim_end_matches('/');
        let base = if host.starts_with("ws://") || host.starts_with("wss://") {
            host.to_string()
        } else {
            format!("wss://{}", host)
        };
        format!("{}/v3/ws?{}", base, params.query_string())
    }

    async fn enqueue(&self, message: Message) -> Result<()> {
        let guard = self.connection.lock().await;
        let connection = guard.as_ref().context("Session is not connected")?;
        connection
            .outbound
            .send(message)
            .map_err(|_| anyhow!("Backend connection is closed"))
    }
}

#[async_trait::async_trait]
impl TranscriptionSession for AssemblyAiSession {
    async fn connect(&self, params: &StreamingParameters) -> Result<EventReceiver> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            bail!("Session already connected");
        }

        info!(
            "Connecting to AssemblyAI at {} ({}Hz, format_turns={})",
            self.options.api_host, params.sample_rate, params.format_turns
        );

        let url = self.url(params);
        let mut request = url
            .as_str()
            .into_client_request()
            .context("Invalid streaming URL")?;
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&self.options.api_key)
                .context("API key is not a valid header value")?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .context("Failed to connect to AssemblyAI")?;

        info!("Connected to AssemblyAI successfully");

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_messages(sink, outbound_rx));
        let reader = tokio::spawn(read_events(stream, event_tx));

        *guard = Some(Connection {
            outbound,
            reader,
            writer,
        });

        Ok(event_rx)
    }

    async fn stream(&self, frame: &AudioFrame) -> Result<()> {
        self.enqueue(Message::Binary(frame.to_pcm_bytes().into())).await
    }

    async fn set_params(&self, params: &SessionParameters) -> Result<()> {
        let payload = serde_json::to_string(&ClientMessage::UpdateConfiguration(params.clone()))?;
        debug!("Updating session configuration: {}", payload);
        self.enqueue(Message::Text(payload.into())).await
    }

    async fn disconnect(&self, terminate: bool) -> Result<()> {
        // Release the lock before waiting so concurrent stream() calls fail fast
        let connection = self.connection.lock().await.take();
        let Some(Connection {
            outbound,
            mut reader,
            mut writer,
        }) = connection
        else {
            debug!("Disconnect requested but session is not connected");
            return Ok(());
        };

        info!("Disconnecting from AssemblyAI (terminate={})", terminate);

        if terminate {
            let payload = serde_json::to_string(&ClientMessage::Terminate)?;
            if outbound.send(Message::Text(payload.into())).is_ok() {
                // The server answers with Termination and then closes
                match tokio::time::timeout(self.options.disconnect_timeout, &mut reader).await {
                    Ok(_) => debug!("AssemblyAI closed the session"),
                    Err(_) => warn!(
                        "No session termination within {:?}, closing anyway",
                        self.options.disconnect_timeout
                    ),
                }
            }
        }

        let _ = outbound.send(Message::Close(None));
        drop(outbound);

        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            warn!("AssemblyAI writer did not finish, aborting");
            writer.abort();
        }
        reader.abort();

        info!("Disconnected from AssemblyAI");

        Ok(())
    }

    fn name(&self) -> &str {
        "AssemblyAI"
    }
}

async fn write_messages(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!("AssemblyAI write failed: {}", e);
            return;
        }
        if closing {
            break;
        }
    }

    let _ = sink.close().await;
    debug!("AssemblyAI writer task stopped");
}

async fn read_events(mut stream: SplitStream<WsStream>, events: EventSender) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_server_message(&text) {
                Ok(Some(event)) => {
                    // Keep reading after the receiver is gone so a pending
                    // Terminate handshake can still complete.
                    let _ = events.send(event);
                }
                Ok(None) => debug!("Ignoring backend message: {}", text.as_str()),
                Err(e) => warn!("Failed to parse backend message: {:#}", e),
            },
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    let code = u16::from(frame.code);
                    if code != CLOSE_NORMAL {
                        let _ = events.send(StreamingEvent::Error(StreamingError {
                            code: Some(code),
                            message: frame.reason.to_string(),
                        }));
                    }
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(StreamingEvent::Error(StreamingError {
                    code: None,
                    message: e.to_string(),
                }));
                break;
            }
        }
    }

    debug!("AssemblyAI reader task stopped");
}
