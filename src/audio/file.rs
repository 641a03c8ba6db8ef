use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into frames of `buffer_duration_ms` each
    ///
    /// The last frame may be shorter. Frames keep the file's native rate and
    /// channel layout; normalization happens in the session feed.
    pub fn frames(&self, buffer_duration_ms: u64) -> Vec<AudioFrame> {
        let channels = self.channels.max(1) as usize;
        let frames_per_chunk =
            ((self.sample_rate as u64 * buffer_duration_ms.max(1)) / 1000).max(1) as usize;
        let samples_per_chunk = frames_per_chunk * channels;

        self.samples
            .chunks(samples_per_chunk)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * buffer_duration_ms,
            })
            .collect()
    }
}

/// Audio backend that replays a WAV file
///
/// The source is exhausted once every frame has been delivered, which closes
/// the frame channel.
pub struct FileBackend {
    path: String,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<String>, config: AudioBackendConfig) -> Result<Self> {
        let path = path.into();
        if !Path::new(&path).exists() {
            anyhow::bail!("Audio file not found: {}", path);
        }

        Ok(Self {
            path,
            config,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Already capturing");
        }

        let audio = AudioFile::open(&self.path)?;
        let frames = audio.frames(self.config.buffer_duration_ms);
        let realtime = self.config.realtime;
        let pace = Duration::from_millis(self.config.buffer_duration_ms.max(1));

        let (tx, rx) = mpsc::channel(32);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);
            for frame in frames {
                if realtime {
                    ticker.tick().await;
                }
                if tx.send(frame).await.is_err() {
                    debug!("File frame receiver dropped");
                    return;
                }
            }
            debug!("Audio file exhausted");
        });

        self.task = Some(task);

        info!("File playback started: {}", self.path);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File playback stopped: {}", self.path);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
