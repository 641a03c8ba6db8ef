use super::events::{BeginEvent, StreamingError, StreamingEvent, TerminationEvent, TurnEvent, Word};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Parameters fixed when the session connects (sent as URL query)
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingParameters {
    pub sample_rate: u32,
    /// Audio encoding of the binary frames
    pub encoding: String,
    pub format_turns: bool,
    pub end_of_turn_confidence_threshold: Option<f64>,
    /// Milliseconds of silence that end a confident turn
    pub min_end_of_turn_silence_when_confident: Option<u32>,
    /// Milliseconds of silence that always end a turn
    pub max_turn_silence: Option<u32>,
}

impl Default for StreamingParameters {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            encoding: "pcm_s16le".to_string(),
            format_turns: false,
            end_of_turn_confidence_threshold: None,
            min_end_of_turn_silence_when_confident: None,
            max_turn_silence: None,
        }
    }
}

impl StreamingParameters {
    /// Query string for the websocket URL, without the leading `?`
    pub fn query_string(&self) -> String {
        let mut pairs = vec![
            format!("sample_rate={}", self.sample_rate),
            format!("encoding={}", self.encoding),
            format!("format_turns={}", self.format_turns),
        ];

        if let Some(threshold) = self.end_of_turn_confidence_threshold {
            pairs.push(format!("end_of_turn_confidence_threshold={}", threshold));
        }
        if let Some(ms) = self.min_end_of_turn_silence_when_confident {
            pairs.push(format!("min_end_of_turn_silence_when_confident={}", ms));
        }
        if let Some(ms) = self.max_turn_silence {
            pairs.push(format!("max_turn_silence={}", ms));
        }

        pairs.join("&")
    }
}

/// Parameters that can change mid-session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_turns: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_turn_confidence_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_end_of_turn_silence_when_confident: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turn_silence: Option<u32>,
}

impl SessionParameters {
    pub fn format_turns(enabled: bool) -> Self {
        Self {
            format_turns: Some(enabled),
            ..Default::default()
        }
    }
}

/// Control message sent to the backend as a text frame
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    UpdateConfiguration(SessionParameters),
    Terminate,
}

/// Message received from the backend as a text frame
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Begin {
        id: String,
        /// Unix timestamp (seconds)
        #[serde(default)]
        expires_at: Option<i64>,
    },
    Turn(TurnMessage),
    Termination {
        #[serde(default)]
        audio_duration_seconds: f64,
        #[serde(default)]
        session_duration_seconds: f64,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct TurnMessage {
    #[serde(default)]
    pub turn_order: u32,
    #[serde(default)]
    pub turn_is_formatted: bool,
    #[serde(default)]
    pub end_of_turn: bool,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub end_of_turn_confidence: f64,
    #[serde(default)]
    pub words: Vec<WordMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WordMessage {
    pub text: String,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub word_is_final: bool,
}

/// Error payload, sent without a `type` tag
#[derive(Debug, Deserialize)]
struct ErrorMessage {
    error: String,
}

/// Decode one text frame from the backend
///
/// Returns `Ok(None)` for message types this client does not handle.
pub fn parse_server_message(text: &str) -> Result<Option<StreamingEvent>> {
    let value: serde_json::Value =
        serde_json::from_str(text).context("Backend sent invalid JSON")?;

    if value.get("error").is_some() {
        let err: ErrorMessage =
            serde_json::from_value(value).context("Malformed backend error message")?;
        return Ok(Some(StreamingEvent::Error(StreamingError {
            code: None,
            message: err.error,
        })));
    }

    let message: ServerMessage =
        serde_json::from_value(value).context("Malformed backend message")?;

    let event = match message {
        ServerMessage::Begin { id, expires_at } => StreamingEvent::Begin(BeginEvent {
            id,
            expires_at: expires_at.and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
        }),
        ServerMessage::Turn(turn) => StreamingEvent::Turn(TurnEvent {
            turn_order: turn.turn_order,
            transcript: turn.transcript,
            end_of_turn: turn.end_of_turn,
            turn_is_formatted: turn.turn_is_formatted,
            end_of_turn_confidence: turn.end_of_turn_confidence,
            words: turn
                .words
                .into_iter()
                .map(|w| Word {
                    text: w.text,
                    start: w.start,
                    end: w.end,
                    confidence: w.confidence,
                    word_is_final: w.word_is_final,
                })
                .collect(),
        }),
        ServerMessage::Termination {
            audio_duration_seconds,
            session_duration_seconds,
        } => StreamingEvent::Termination(TerminationEvent {
            audio_duration_seconds,
            session_duration_seconds,
        }),
        ServerMessage::Unknown => return Ok(None),
    };

    Ok(Some(event))
}
