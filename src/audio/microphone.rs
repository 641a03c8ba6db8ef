// Microphone backend using cpal's default input device

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};

/// Microphone audio backend
///
/// The cpal stream is owned by a dedicated capture thread because it cannot
/// move between threads on every platform. Frames reach the async side
/// through a bounded channel; the audio callback never blocks and drops
/// frames when the channel is full.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    dropped_frames: Arc<AtomicUsize>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        info!(
            "Microphone backend initialized ({}ms buffers)",
            config.buffer_duration_ms
        );

        Ok(Self {
            config,
            stop_tx: None,
            thread: None,
            dropped_frames: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Accumulates callback samples into fixed-duration frames
struct FrameAssembler {
    tx: mpsc::Sender<AudioFrame>,
    buffer: Vec<i16>,
    chunk_samples: usize,
    sample_rate: u32,
    channels: u16,
    emitted_ms: u64,
    chunk_ms: u64,
    dropped: Arc<AtomicUsize>,
}

impl FrameAssembler {
    fn push(&mut self, samples: impl Iterator<Item = i16>) {
        self.buffer.extend(samples);

        while self.buffer.len() >= self.chunk_samples {
            let chunk: Vec<i16> = self.buffer.drain(..self.chunk_samples).collect();
            let frame = AudioFrame {
                samples: chunk,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: self.emitted_ms,
            };
            self.emitted_ms += self.chunk_ms;

            if self.tx.try_send(frame).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

fn build_stream(
    device: &cpal::Device,
    format: SampleFormat,
    stream_config: &StreamConfig,
    mut assembler: FrameAssembler,
) -> Result<cpal::Stream> {
    let err_fn = |err| error!("Microphone stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                assembler.push(data.iter().map(|s| f32_to_i16(*s)))
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| assembler.push(data.iter().copied()),
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                assembler.push(data.iter().map(|s| u16_to_i16(*s)))
            },
            err_fn,
            None,
        )?,
        other => bail!("Input sample format {:?} is not supported", other),
    };

    Ok(stream)
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            bail!("Already capturing");
        }

        info!("Starting microphone capture");

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(u32, u16)>>();
        let buffer_duration_ms = self.config.buffer_duration_ms.max(10);
        let dropped = Arc::clone(&self.dropped_frames);

        let handle = thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || {
                let opened = (|| -> Result<(cpal::Stream, u32, u16)> {
                    let host = cpal::default_host();
                    let device = host
                        .default_input_device()
                        .context("Unable to find a default input device")?;
                    let input_config = device
                        .default_input_config()
                        .context("Failed to fetch the default input configuration")?;
                    let format = input_config.sample_format();
                    let stream_config: StreamConfig = input_config.into();
                    let sample_rate = stream_config.sample_rate.0;
                    let channels = stream_config.channels;

                    let assembler = FrameAssembler {
                        tx,
                        buffer: Vec::new(),
                        chunk_samples: (sample_rate as u64 * buffer_duration_ms / 1000) as usize
                            * channels as usize,
                        sample_rate,
                        channels,
                        emitted_ms: 0,
                        chunk_ms: buffer_duration_ms,
                        dropped,
                    };

                    let stream = build_stream(&device, format, &stream_config, assembler)?;
                    stream.play().context("Failed to start the microphone stream")?;
                    Ok((stream, sample_rate, channels))
                })();

                match opened {
                    Ok((stream, sample_rate, channels)) => {
                        let _ = ready_tx.send(Ok((sample_rate, channels)));
                        // Hold the stream until stop() or the backend is dropped
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .context("Failed to spawn microphone capture thread")?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("Microphone startup task failed")?
            .map_err(|_| anyhow!("Microphone capture thread exited during startup"))?;

        match ready {
            Ok((sample_rate, channels)) => {
                info!(
                    "Microphone capture started ({}Hz, {} channels)",
                    sample_rate, channels
                );
                self.stop_tx = Some(stop_tx);
                self.thread = Some(handle);
                Ok(rx)
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");
        let _ = stop_tx.send(());

        if let Some(handle) = self.thread.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("Microphone join task failed")?
                .map_err(|_| anyhow!("Microphone capture thread panicked"))?;
        }

        let dropped = self.dropped_frames.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("Microphone dropped {} frames (consumer too slow)", dropped);
        }

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
