use crate::audio::{AudioBackendConfig, AudioSource};
use crate::config::Config;
use crate::session::{Session, SessionBridge, SessionConfig};
use crate::streaming::StreamingClientOptions;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active sessions (connection_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,

    /// Starts a session for every accepted websocket
    pub bridge: Arc<SessionBridge>,

    /// Connection settings for the transcription backend
    pub streaming: StreamingClientOptions,

    /// Where session audio comes from
    pub audio_source: AudioSource,
    pub audio_config: AudioBackendConfig,
}

impl AppState {
    pub fn new(
        session_config: SessionConfig,
        streaming: StreamingClientOptions,
        audio_source: AudioSource,
        audio_config: AudioBackendConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            bridge: Arc::new(SessionBridge::new(session_config)),
            streaming,
            audio_source,
            audio_config,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.session_config(),
            config.streaming_options()?,
            config.audio_source()?,
            config.audio_backend_config(),
        ))
    }
}
