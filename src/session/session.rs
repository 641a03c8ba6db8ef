use super::bridge::SessionEnd;
use super::client::{ClientSink, OutboundMessage};
use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::streaming::{
    BeginEvent, SessionParameters, StreamingError, StreamingEvent, TerminationEvent,
    TranscriptionSession, TurnEvent,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State of one bridged transcription session
///
/// Shared between the supervision loop, the audio feed task and whoever
/// triggers teardown. Everything mutable is atomic or behind a mutex.
pub struct Session {
    /// Local identifier of the client connection
    connection_id: String,

    /// Session configuration
    config: SessionConfig,

    /// Backend connection for this session
    backend: Arc<dyn TranscriptionSession>,

    /// Outbound half of the client connection
    client: Mutex<Box<dyn ClientSink>>,

    /// When the client connected
    started_at: chrono::DateTime<chrono::Utc>,

    /// Cleared exactly once, by the first teardown
    is_running: AtomicBool,

    /// Set by the first backend disconnect
    backend_closed: AtomicBool,

    /// Set at most once, false -> true
    formatting_enabled: AtomicBool,

    turns_forwarded: AtomicUsize,
    write_failures: AtomicUsize,
    frames_streamed: AtomicUsize,

    /// Identifier from the backend's Begin event
    backend_session_id: Mutex<Option<String>>,

    /// Audio duration from the backend's Termination event
    audio_duration_seconds: Mutex<Option<f64>>,

    /// Handle for the audio feed task
    feed_task: Mutex<Option<JoinHandle<()>>>,

    /// Tells the audio feed to stop
    feed_shutdown: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(
        connection_id: String,
        config: SessionConfig,
        backend: Arc<dyn TranscriptionSession>,
        client: Box<dyn ClientSink>,
    ) -> Self {
        let (feed_shutdown, _) = watch::channel(false);
        let formatting_enabled = AtomicBool::new(config.format_turns);

        Self {
            connection_id,
            config,
            backend,
            client: Mutex::new(client),
            started_at: Utc::now(),
            is_running: AtomicBool::new(true),
            backend_closed: AtomicBool::new(false),
            formatting_enabled,
            turns_forwarded: AtomicUsize::new(0),
            write_failures: AtomicUsize::new(0),
            frames_streamed: AtomicUsize::new(0),
            backend_session_id: Mutex::new(None),
            audio_duration_seconds: Mutex::new(None),
            feed_task: Mutex::new(None),
            feed_shutdown,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn formatting_enabled(&self) -> bool {
        self.formatting_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn final_events_timeout(&self) -> Duration {
        self.config.final_events_timeout
    }

    pub(crate) fn backend(&self) -> &Arc<dyn TranscriptionSession> {
        &self.backend
    }

    pub(crate) fn record_frame(&self) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.feed_shutdown.subscribe()
    }

    pub(crate) async fn attach_feed(&self, task: JoinHandle<()>) {
        let mut handle = self.feed_task.lock().await;
        *handle = Some(task);
    }

    /// Apply one backend event
    ///
    /// Returns the reason to end the session when the event finishes it.
    pub async fn handle_event(&self, event: StreamingEvent) -> Option<SessionEnd> {
        match event {
            StreamingEvent::Begin(event) => {
                self.on_begin(event).await;
                None
            }
            StreamingEvent::Turn(event) => {
                self.on_turn(&event).await;
                None
            }
            StreamingEvent::Termination(event) => {
                let audio_duration_seconds = event.audio_duration_seconds;
                self.on_termination(event).await;
                Some(SessionEnd::BackendTerminated {
                    audio_duration_seconds,
                })
            }
            StreamingEvent::Error(error) => {
                self.on_error(&error);
                None
            }
        }
    }

    async fn on_begin(&self, event: BeginEvent) {
        info!("Session started: {} (connection {})", event.id, self.connection_id);
        if let Some(expires_at) = event.expires_at {
            debug!("Backend session expires at {}", expires_at.to_rfc3339());
        }

        let mut id = self.backend_session_id.lock().await;
        *id = Some(event.id);
    }

    /// Forward a turn to the client, then enable formatting if this was the
    /// first unformatted end of turn
    pub async fn on_turn(&self, event: &TurnEvent) {
        let message = OutboundMessage::from(event);
        match serde_json::to_string(&message) {
            Ok(payload) => self.send_to_client(payload).await,
            Err(e) => error!("Failed to serialize turn message: {}", e),
        }

        if event.end_of_turn && !event.turn_is_formatted {
            self.enable_formatting().await;
        }
    }

    async fn on_termination(&self, event: TerminationEvent) {
        info!(
            "Session terminated: {}s processed ({}s session)",
            event.audio_duration_seconds, event.session_duration_seconds
        );

        let mut duration = self.audio_duration_seconds.lock().await;
        *duration = Some(event.audio_duration_seconds);
    }

    fn on_error(&self, error: &StreamingError) {
        error!("Error occurred: {} (connection {})", error, self.connection_id);
    }

    async fn send_to_client(&self, payload: String) {
        let mut client = self.client.lock().await;
        let outcome =
            tokio::time::timeout(self.config.client_write_timeout, client.send_text(payload)).await;

        match outcome {
            Ok(Ok(())) => {
                self.turns_forwarded.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                self.write_failures.fetch_add(1, Ordering::SeqCst);
                warn!("Failed to send turn to client {}: {:#}", self.connection_id, e);
            }
            Err(_) => {
                self.write_failures.fetch_add(1, Ordering::SeqCst);
                warn!(
                    "Timed out sending turn to client {} after {:?}",
                    self.connection_id, self.config.client_write_timeout
                );
            }
        }
    }

    async fn enable_formatting(&self) {
        if self
            .formatting_enabled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        info!("Unformatted end of turn, requesting formatted turns");

        // Enqueued only; the backend applies it to later turns
        if let Err(e) = self
            .backend
            .set_params(&SessionParameters::format_turns(true))
            .await
        {
            warn!("Failed to enable turn formatting: {:#}", e);
        }
    }

    /// Disconnect the backend, stop the audio feed and close the client
    ///
    /// Only the first call does anything; it returns true. Failures are
    /// logged and never returned.
    pub async fn teardown(&self) -> bool {
        if self
            .is_running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Session {} already torn down", self.connection_id);
            return false;
        }

        info!("Tearing down session {}", self.connection_id);

        self.close_backend().await;
        self.stop_feed().await;

        {
            let mut client = self.client.lock().await;
            close_client(&mut **client, self.config.client_write_timeout).await;
        }

        info!("Session {} torn down", self.connection_id);

        true
    }

    /// Terminate the backend session; later calls return immediately
    pub(crate) async fn close_backend(&self) {
        if self.backend_closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.backend.disconnect(true).await {
            warn!("Failed to disconnect {} backend: {:#}", self.backend.name(), e);
        }
    }

    async fn stop_feed(&self) {
        let _ = self.feed_shutdown.send(true);

        let task = self.feed_task.lock().await.take();
        let Some(mut task) = task else {
            return;
        };

        match tokio::time::timeout(self.config.feed_shutdown_timeout, &mut task).await {
            Ok(Ok(())) => debug!("Audio feed task joined"),
            Ok(Err(e)) => error!("Audio feed task panicked: {}", e),
            Err(_) => {
                warn!(
                    "Audio feed did not stop within {:?}, aborting",
                    self.config.feed_shutdown_timeout
                );
                task.abort();
            }
        }
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            connection_id: self.connection_id.clone(),
            backend_session_id: self.backend_session_id.lock().await.clone(),
            is_running: self.is_running(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            turns_forwarded: self.turns_forwarded.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
            frames_streamed: self.frames_streamed.load(Ordering::SeqCst),
            formatting_enabled: self.formatting_enabled(),
            audio_duration_seconds: *self.audio_duration_seconds.lock().await,
        }
    }
}

/// Close the client, logging instead of returning any failure
pub(crate) async fn close_client(client: &mut dyn ClientSink, timeout: Duration) {
    match tokio::time::timeout(timeout, client.close()).await {
        Ok(Ok(())) => debug!("Client connection closed"),
        Ok(Err(e)) => warn!("Error while closing client connection: {:#}", e),
        Err(_) => warn!("Timed out closing client connection"),
    }
}
