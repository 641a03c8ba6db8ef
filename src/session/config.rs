use crate::streaming::StreamingParameters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a bridged transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sample rate negotiated with the backend (16kHz for streaming STT);
    /// audio is always streamed mono
    pub sample_rate: u32,

    /// Request formatted turns from the start of the session
    /// Default: false, formatting is switched on after the first
    /// unformatted end of turn
    pub format_turns: bool,

    /// Backend end-of-turn tuning, passed through on connect
    pub end_of_turn_confidence_threshold: Option<f64>,
    pub min_end_of_turn_silence_when_confident: Option<u32>,
    pub max_turn_silence: Option<u32>,

    /// Upper bound on a single write to the client
    pub client_write_timeout: Duration,

    /// How long teardown waits for the audio feed before aborting it
    pub feed_shutdown_timeout: Duration,

    /// After the audio runs out, how long to keep reading backend events
    /// while the session is terminated
    pub final_events_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Streaming STT expects 16kHz
            format_turns: false,
            end_of_turn_confidence_threshold: None,
            min_end_of_turn_silence_when_confident: None,
            max_turn_silence: None,
            client_write_timeout: Duration::from_secs(5),
            feed_shutdown_timeout: Duration::from_secs(2),
            final_events_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Parameters sent to the backend on connect
    pub fn streaming_parameters(&self) -> StreamingParameters {
        StreamingParameters {
            sample_rate: self.sample_rate,
            format_turns: self.format_turns,
            end_of_turn_confidence_threshold: self.end_of_turn_confidence_threshold,
            min_end_of_turn_silence_when_confident: self.min_end_of_turn_silence_when_confident,
            max_turn_silence: self.max_turn_silence,
            ..Default::default()
        }
    }
}
