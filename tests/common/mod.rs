// Test doubles for the bridge's three collaborators
//
// Each mock records what the bridge did to it so tests can assert on calls,
// and exposes handles for driving it from the test body.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use transcript_relay::audio::{AudioBackend, AudioFrame};
use transcript_relay::session::{ClientConnection, ClientSink, ClientStream, InboundFrame};
use transcript_relay::streaming::{
    BeginEvent, EventReceiver, EventSender, SessionParameters, StreamingError, StreamingEvent,
    StreamingParameters, TerminationEvent, TranscriptionSession, TurnEvent,
};
use transcript_relay::SessionConfig;

// ============================================================================
// Backend
// ============================================================================

#[derive(Default)]
pub struct MockBackend {
    pub fail_connect: bool,
    pub fail_set_params: bool,
    pub fail_stream: bool,
    events: Mutex<Option<EventSender>>,
    /// Delivered while a terminating disconnect is in progress
    final_events: Mutex<Vec<StreamingEvent>>,
    pub connect_params: Mutex<Vec<StreamingParameters>>,
    pub set_params_calls: Mutex<Vec<SessionParameters>>,
    pub frames: Mutex<Vec<AudioFrame>>,
    pub disconnects: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_connect() -> Arc<Self> {
        Arc::new(Self {
            fail_connect: true,
            ..Default::default()
        })
    }

    pub fn failing_set_params() -> Arc<Self> {
        Arc::new(Self {
            fail_set_params: true,
            ..Default::default()
        })
    }

    pub fn failing_stream() -> Arc<Self> {
        Arc::new(Self {
            fail_stream: true,
            ..Default::default()
        })
    }

    /// Deliver an event as if the backend produced it
    pub fn emit(&self, event: StreamingEvent) {
        let events = self.events.lock().unwrap();
        events
            .as_ref()
            .expect("backend not connected")
            .send(event)
            .expect("event receiver dropped");
    }

    pub fn begin(&self, id: &str) {
        self.emit(StreamingEvent::Begin(BeginEvent {
            id: id.to_string(),
            expires_at: None,
        }));
    }

    pub fn turn(&self, transcript: &str, end_of_turn: bool, turn_is_formatted: bool) {
        self.emit(StreamingEvent::Turn(TurnEvent {
            transcript: transcript.to_string(),
            end_of_turn,
            turn_is_formatted,
            ..Default::default()
        }));
    }

    pub fn terminate(&self, audio_duration_seconds: f64) {
        self.emit(StreamingEvent::Termination(TerminationEvent {
            audio_duration_seconds,
            session_duration_seconds: audio_duration_seconds,
        }));
    }

    pub fn error(&self, message: &str) {
        self.emit(StreamingEvent::Error(StreamingError {
            code: None,
            message: message.to_string(),
        }));
    }

    /// Queue events the backend sends only after it is asked to terminate
    pub fn on_terminate(&self, events: Vec<StreamingEvent>) {
        self.final_events.lock().unwrap().extend(events);
    }

    /// Close the event channel without a Termination event
    pub fn drop_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn set_params_count(&self) -> usize {
        self.set_params_calls.lock().unwrap().len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TranscriptionSession for MockBackend {
    async fn connect(&self, params: &StreamingParameters) -> Result<EventReceiver> {
        if self.fail_connect {
            return Err(anyhow!("connection refused"));
        }
        self.connect_params.lock().unwrap().push(params.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stream(&self, frame: &AudioFrame) -> Result<()> {
        if self.fail_stream {
            return Err(anyhow!("socket closed"));
        }
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn set_params(&self, params: &SessionParameters) -> Result<()> {
        self.set_params_calls.lock().unwrap().push(params.clone());
        if self.fail_set_params {
            return Err(anyhow!("update rejected"));
        }
        Ok(())
    }

    async fn disconnect(&self, terminate: bool) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        // Slow enough that concurrent teardowns overlap
        tokio::time::sleep(Duration::from_millis(10)).await;

        if terminate {
            let final_events: Vec<_> = self.final_events.lock().unwrap().drain(..).collect();
            if let Some(events) = self.events.lock().unwrap().as_ref() {
                for event in final_events {
                    let _ = events.send(event);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Audio source that yields queued frames, then stays open (live) or
/// closes (exhausted)
pub struct MockAudio {
    frames: Vec<AudioFrame>,
    live: bool,
    pub started: Arc<AtomicBool>,
    pub stopped: Arc<AtomicBool>,
    fail_start: bool,
    keep_open: Option<mpsc::Sender<AudioFrame>>,
}

impl MockAudio {
    /// Source that never ends on its own
    pub fn live() -> Self {
        Self::with_frames(Vec::new(), true)
    }

    /// Source that ends after `frames`
    pub fn finite(frames: Vec<AudioFrame>) -> Self {
        Self::with_frames(frames, false)
    }

    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::live()
        }
    }

    fn with_frames(frames: Vec<AudioFrame>, live: bool) -> Self {
        Self {
            frames,
            live,
            started: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            fail_start: false,
            keep_open: None,
        }
    }
}

pub fn silent_frame(samples: usize, sample_rate: u32, channels: u16) -> AudioFrame {
    AudioFrame {
        samples: vec![0i16; samples],
        sample_rate,
        channels,
        timestamp_ms: 0,
    }
}

#[async_trait::async_trait]
impl AudioBackend for MockAudio {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.fail_start {
            return Err(anyhow!("no input device"));
        }
        self.started.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in self.frames.drain(..) {
            tx.try_send(frame).expect("channel sized for all frames");
        }
        if self.live {
            self.keep_open = Some(tx);
        }
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.keep_open = None;
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock audio"
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Default)]
pub struct ClientLog {
    pub sent: Mutex<Vec<String>>,
    pub attempts: AtomicUsize,
    pub closes: AtomicUsize,
    /// Zero-based write attempts that fail
    pub fail_writes: Mutex<HashSet<usize>>,
}

impl ClientLog {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockSink {
    log: Arc<ClientLog>,
}

pub struct MockStream {
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait::async_trait]
impl ClientSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let attempt = self.log.attempts.fetch_add(1, Ordering::SeqCst);
        if self.log.fail_writes.lock().unwrap().contains(&attempt) {
            return Err(anyhow!("broken pipe"));
        }
        self.log.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClientStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        self.inbound.recv().await.map(Ok)
    }
}

/// A client connection plus handles to observe and drive it
pub fn mock_client() -> (
    ClientConnection,
    Arc<ClientLog>,
    mpsc::UnboundedSender<InboundFrame>,
) {
    let log = Arc::new(ClientLog::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = ClientConnection::new(
        MockSink {
            log: Arc::clone(&log),
        },
        MockStream { inbound: rx },
    );
    (connection, log, tx)
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        client_write_timeout: Duration::from_millis(200),
        feed_shutdown_timeout: Duration::from_millis(500),
        final_events_timeout: Duration::from_millis(300),
        ..Default::default()
    }
}
