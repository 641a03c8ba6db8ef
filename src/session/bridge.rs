use super::client::{ClientConnection, ClientStream, InboundFrame};
use super::config::SessionConfig;
use super::feed::{feed_audio, FeedStats};
use super::session::{close_client, Session};
use super::stats::SessionStats;
use crate::audio::AudioBackend;
use crate::streaming::{EventReceiver, TranscriptionSession};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Failure to bring a session up
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to connect to transcription backend: {0}")]
    Connect(String),
    #[error("Failed to start audio source: {0}")]
    AudioStart(String),
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The client closed the connection or went away
    ClientDisconnected,
    /// Reading from the client failed
    ClientError(String),
    /// The backend sent its Termination event
    BackendTerminated { audio_duration_seconds: f64 },
    /// The backend event stream ended without a Termination event
    BackendClosed,
    /// The audio source ran out
    AudioExhausted(FeedStats),
    /// Streaming audio to the backend failed
    AudioFailed(String),
}

/// Starts bridged sessions for accepted client connections
pub struct SessionBridge {
    config: SessionConfig,
}

impl SessionBridge {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect the backend and start streaming audio for a new client
    ///
    /// On failure nothing keeps running: the client connection is closed,
    /// no audio task exists and no turn has been sent.
    pub async fn start(
        &self,
        client: ClientConnection,
        backend: Arc<dyn TranscriptionSession>,
        mut audio: Box<dyn AudioBackend>,
    ) -> Result<ActiveSession, BridgeError> {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let ClientConnection { mut sink, stream } = client;

        info!(
            "Starting session {} ({} backend, {} audio)",
            connection_id,
            backend.name(),
            audio.name()
        );

        let params = self.config.streaming_parameters();
        let events = match backend.connect(&params).await {
            Ok(events) => events,
            Err(e) => {
                error!("Session {}: backend connect failed: {:#}", connection_id, e);
                close_client(&mut *sink, self.config.client_write_timeout).await;
                return Err(BridgeError::Connect(format!("{:#}", e)));
            }
        };

        let audio_rx = match audio.start().await {
            Ok(rx) => rx,
            Err(e) => {
                error!("Session {}: audio source failed: {:#}", connection_id, e);
                if let Err(e) = backend.disconnect(false).await {
                    warn!("Failed to disconnect backend: {:#}", e);
                }
                close_client(&mut *sink, self.config.client_write_timeout).await;
                return Err(BridgeError::AudioStart(format!("{:#}", e)));
            }
        };

        let session = Arc::new(Session::new(
            connection_id,
            self.config.clone(),
            backend,
            sink,
        ));

        // Spawn the audio feed task
        let shutdown = session.shutdown_signal();
        let (done_tx, done_rx) = oneshot::channel();
        let feed_session = Arc::clone(&session);

        let feed_task = tokio::spawn(async move {
            let outcome = feed_audio(audio, audio_rx, Arc::clone(&feed_session), shutdown).await;

            if let Err(e) = &outcome {
                if feed_session.is_running() {
                    error!("Audio feed failed: {:#}", e);
                } else {
                    debug!("Audio feed ended during teardown: {:#}", e);
                }
            }

            let _ = done_tx.send(outcome);
        });

        session.attach_feed(feed_task).await;

        info!("Session {} started", session.connection_id());

        Ok(ActiveSession {
            session,
            events,
            inbound: stream,
            feed_done: Some(done_rx),
        })
    }
}

/// A running session and the three sources it is supervised by
pub struct ActiveSession {
    session: Arc<Session>,
    events: EventReceiver,
    inbound: Box<dyn ClientStream>,
    feed_done: Option<oneshot::Receiver<Result<FeedStats>>>,
}

impl ActiveSession {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Handle backend events until the client leaves, the backend ends the
    /// session or the audio feed stops
    ///
    /// Events are applied in the order the backend produced them. Inbound
    /// client frames only serve as a liveness signal. When the audio stops,
    /// the backend session is terminated here and its last turns are still
    /// forwarded before this returns.
    pub async fn await_completion(&mut self) -> SessionEnd {
        let ActiveSession {
            session,
            events,
            inbound,
            feed_done,
        } = self;

        loop {
            tokio::select! {
                frame = inbound.next_frame() => match frame {
                    Some(Ok(InboundFrame::Close)) | None => {
                        info!("Client {} disconnected", session.connection_id());
                        return SessionEnd::ClientDisconnected;
                    }
                    Some(Ok(_)) => {
                        debug!("Client {} is alive", session.connection_id());
                    }
                    Some(Err(e)) => {
                        warn!("Client {} read failed: {:#}", session.connection_id(), e);
                        return SessionEnd::ClientError(format!("{:#}", e));
                    }
                },

                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(end) = session.handle_event(event).await {
                            return end;
                        }
                    }
                    None => {
                        warn!("Backend event stream closed for session {}", session.connection_id());
                        return SessionEnd::BackendClosed;
                    }
                },

                outcome = wait_for_feed(feed_done) => {
                    let end = match outcome {
                        Ok(stats) => SessionEnd::AudioExhausted(stats),
                        Err(e) => SessionEnd::AudioFailed(format!("{:#}", e)),
                    };
                    drain_final_events(session, events).await;
                    return end;
                }
            }
        }
    }

    /// Tear the session down; only the first call has an effect
    pub async fn teardown(&self) -> bool {
        self.session.teardown().await
    }

    /// Await completion, tear down and report final statistics
    pub async fn finish(mut self) -> (SessionEnd, SessionStats) {
        let end = self.await_completion().await;
        info!("Session {} ending: {:?}", self.session.connection_id(), end);

        self.session.teardown().await;
        let stats = self.session.stats().await;

        (end, stats)
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if !self.session.is_running() {
            return;
        }

        // Dropped without teardown (e.g. the handler was cancelled)
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let session = Arc::clone(&self.session);
            runtime.spawn(async move {
                session.teardown().await;
            });
        }
    }
}

/// Terminate the backend once the audio has stopped and apply the events it
/// still sends, until Termination, the end of the stream or the timeout
async fn drain_final_events(session: &Session, events: &mut EventReceiver) {
    let timeout = session.final_events_timeout();

    let drain = async {
        while let Some(event) = events.recv().await {
            if session.handle_event(event).await.is_some() {
                return true;
            }
        }
        false
    };

    let (_, drained) = tokio::join!(session.close_backend(), tokio::time::timeout(timeout, drain));

    match drained {
        Ok(true) => debug!("Session {} received Termination", session.connection_id()),
        Ok(false) => debug!("Backend event stream closed for session {}", session.connection_id()),
        Err(_) => warn!(
            "No Termination for session {} within {:?}",
            session.connection_id(),
            timeout
        ),
    }
}

async fn wait_for_feed(
    feed_done: &mut Option<oneshot::Receiver<Result<FeedStats>>>,
) -> Result<FeedStats> {
    let Some(rx) = feed_done.as_mut() else {
        return std::future::pending().await;
    };

    let outcome = rx
        .await
        .unwrap_or_else(|_| Err(anyhow!("Audio feed task ended without reporting")));
    *feed_done = None;
    outcome
}
