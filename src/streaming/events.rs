use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<StreamingEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StreamingEvent>;

/// Event delivered by a transcription backend
#[derive(Debug, Clone)]
pub enum StreamingEvent {
    Begin(BeginEvent),
    Turn(TurnEvent),
    Termination(TerminationEvent),
    Error(StreamingError),
}

/// The backend accepted the session
#[derive(Debug, Clone)]
pub struct BeginEvent {
    pub id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One incremental transcription result
#[derive(Debug, Clone, Default)]
pub struct TurnEvent {
    /// Index of the turn within the session
    pub turn_order: u32,
    pub transcript: String,
    /// The utterance segment is complete
    pub end_of_turn: bool,
    /// Punctuation and casing have been applied to `transcript`
    pub turn_is_formatted: bool,
    pub end_of_turn_confidence: f64,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Default)]
pub struct Word {
    pub text: String,
    pub start: u64,
    pub end: u64,
    pub confidence: f64,
    pub word_is_final: bool,
}

/// The backend finished the session
#[derive(Debug, Clone, Default)]
pub struct TerminationEvent {
    pub audio_duration_seconds: f64,
    pub session_duration_seconds: f64,
}

/// Error reported by the backend
#[derive(Debug, Clone)]
pub struct StreamingError {
    /// Websocket close code, when the error ended the connection
    pub code: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for StreamingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}
