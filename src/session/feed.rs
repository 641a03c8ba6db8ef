use super::session::Session;
use crate::audio::{AudioBackend, AudioFrame, StreamResampler};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Totals for one run of the audio feed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedStats {
    pub frames: usize,
    pub samples: usize,
}

/// Pull frames from the audio source and stream them to the backend
///
/// Runs until the source is exhausted, teardown signals `shutdown`, or the
/// backend rejects a frame. The audio backend is stopped on every exit path.
pub async fn feed_audio(
    mut audio: Box<dyn AudioBackend>,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    session: Arc<Session>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<FeedStats> {
    info!("Audio feed started ({})", audio.name());

    let mut resampler = StreamResampler::new(session.sample_rate());
    let mut stats = FeedStats::default();
    let mut result = Ok(());

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Audio feed received shutdown");
                    break;
                }
            }

            frame = audio_rx.recv() => {
                let Some(frame) = frame else {
                    info!("Audio source exhausted");
                    result = match resampler.flush() {
                        Ok(Some(tail)) => stream_frame(&session, &tail, &mut stats).await,
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    };
                    break;
                };

                let frame = match resampler.process(frame) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                };
                if let Err(e) = stream_frame(&session, &frame, &mut stats).await {
                    result = Err(e);
                    break;
                }
            }
        }
    }

    if let Err(e) = audio.stop().await {
        error!("Failed to stop audio backend: {}", e);
    }

    info!(
        "Audio feed stopped ({} frames, {} samples)",
        stats.frames, stats.samples
    );

    result.map(|_| stats)
}

async fn stream_frame(session: &Session, frame: &AudioFrame, stats: &mut FeedStats) -> Result<()> {
    session
        .backend()
        .stream(frame)
        .await
        .context("Failed to stream audio frame")?;

    stats.frames += 1;
    stats.samples += frame.samples.len();
    session.record_frame();

    Ok(())
}
