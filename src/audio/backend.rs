use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }

    /// Little-endian PCM bytes, the wire format of the streaming backend
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Configuration for audio backend
///
/// Sources deliver their native rate and channel layout; the session feed
/// converts to what the transcription backend expects.
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
    /// Pace non-live sources (files) at real time
    pub realtime: bool,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100, // 100ms buffers
            realtime: true,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`microphone` feature)
/// - File: WAV playback (for testing and replaying recordings)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The
    /// channel closes when the source is exhausted or stopped.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on source and configuration
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneBackend;
                    let backend = MicrophoneBackend::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!(
                        "Microphone capture requires building with the `microphone` feature"
                    )
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::new(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device (all platforms, `microphone` feature)
    Microphone,
    /// WAV file input (for testing/replay)
    File(String),
}

impl AudioSource {
    /// Resolve a source from its config name (`microphone` or `file`)
    pub fn from_config(kind: &str, file_path: Option<&str>) -> Result<Self> {
        match kind {
            "microphone" | "mic" => Ok(AudioSource::Microphone),
            "file" => match file_path {
                Some(path) => Ok(AudioSource::File(path.to_string())),
                None => anyhow::bail!("audio.source = \"file\" requires audio.file_path"),
            },
            other => anyhow::bail!("Unknown audio source: {}", other),
        }
    }
}
