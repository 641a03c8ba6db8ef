use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a bridged session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Local identifier of the client connection
    pub connection_id: String,

    /// Identifier assigned by the backend (from its Begin event)
    pub backend_session_id: Option<String>,

    /// Whether the session is still running
    pub is_running: bool,

    /// When the client connected
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration in seconds
    pub duration_secs: f64,

    /// Turn messages delivered to the client
    pub turns_forwarded: usize,

    /// Turn messages that could not be delivered
    pub write_failures: usize,

    /// Audio frames streamed to the backend
    pub frames_streamed: usize,

    /// Whether formatted turns have been requested
    pub formatting_enabled: bool,

    /// Audio processed, as reported by the backend on termination
    pub audio_duration_seconds: Option<f64>,
}
