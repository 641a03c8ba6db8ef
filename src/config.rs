use crate::audio::{AudioBackendConfig, AudioSource};
use crate::session::SessionConfig;
use crate::streaming::StreamingClientOptions;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "ASSEMBLYAI_API_KEY";

/// The only stream format the relay sends: 16 kHz mono PCM
const STREAM_SAMPLE_RATE: u32 = 16000;
const STREAM_CHANNELS: u16 = 1;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub backend: BackendConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// "microphone" or "file"
    pub source: String,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Rate and channel count sent to the backend; sources are converted
    /// to this before streaming
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
    /// Pace file playback at real time
    pub realtime: bool,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub api_host: String,
    /// Prefer RELAY_BACKEND__API_KEY or ASSEMBLYAI_API_KEY over the config file
    #[serde(default)]
    pub api_key: Option<String>,
    pub format_turns: bool,
    #[serde(default)]
    pub end_of_turn_confidence_threshold: Option<f64>,
    #[serde(default)]
    pub min_end_of_turn_silence_when_confident: Option<u32>,
    #[serde(default)]
    pub max_turn_silence: Option<u32>,
    pub disconnect_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    pub client_write_timeout_ms: u64,
    pub feed_shutdown_timeout_ms: u64,
    pub final_events_timeout_ms: u64,
}

impl Config {
    /// Load defaults, then the optional config file at `path`, then
    /// `RELAY_*` environment overrides (`__` separates nested keys)
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "transcript-relay")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 8000_i64)?
            .set_default("audio.source", "microphone")?
            .set_default("audio.sample_rate", 16000_i64)?
            .set_default("audio.channels", 1_i64)?
            .set_default("audio.buffer_duration_ms", 100_i64)?
            .set_default("audio.realtime", true)?
            .set_default("backend.api_host", "streaming.assemblyai.com")?
            .set_default("backend.format_turns", false)?
            .set_default("backend.disconnect_timeout_ms", 5000_i64)?
            .set_default("bridge.client_write_timeout_ms", 5000_i64)?
            .set_default("bridge.feed_shutdown_timeout_ms", 2000_i64)?
            .set_default("bridge.final_events_timeout_ms", 5000_i64)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != STREAM_SAMPLE_RATE || self.audio.channels != STREAM_CHANNELS {
            bail!(
                "Unsupported stream format {}Hz/{}ch: the relay streams {}Hz mono",
                self.audio.sample_rate,
                self.audio.channels,
                STREAM_SAMPLE_RATE
            );
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sample_rate: self.audio.sample_rate,
            format_turns: self.backend.format_turns,
            end_of_turn_confidence_threshold: self.backend.end_of_turn_confidence_threshold,
            min_end_of_turn_silence_when_confident: self
                .backend
                .min_end_of_turn_silence_when_confident,
            max_turn_silence: self.backend.max_turn_silence,
            client_write_timeout: Duration::from_millis(self.bridge.client_write_timeout_ms),
            feed_shutdown_timeout: Duration::from_millis(self.bridge.feed_shutdown_timeout_ms),
            final_events_timeout: Duration::from_millis(self.bridge.final_events_timeout_ms),
        }
    }

    /// Backend connection options; fails when no API key is available
    pub fn streaming_options(&self) -> Result<StreamingClientOptions> {
        let api_key = self
            .backend
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
            .with_context(|| {
                format!(
                    "No API key configured: set backend.api_key, RELAY_BACKEND__API_KEY or {}",
                    API_KEY_ENV
                )
            })?;

        Ok(StreamingClientOptions {
            api_key,
            api_host: self.backend.api_host.clone(),
            disconnect_timeout: Duration::from_millis(self.backend.disconnect_timeout_ms),
        })
    }

    pub fn audio_source(&self) -> Result<AudioSource> {
        AudioSource::from_config(&self.audio.source, self.audio.file_path.as_deref())
    }

    pub fn audio_backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            buffer_duration_ms: self.audio.buffer_duration_ms,
            realtime: self.audio.realtime,
        }
    }
}
