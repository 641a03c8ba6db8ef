use anyhow::{bail, Context, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::{debug, warn};

use super::backend::AudioFrame;

/// Requested input chunk for the FFT resampler; rubato rounds it to a
/// multiple of the rate ratio
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Fold any number of interleaved channels to mono by averaging
pub fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let samples: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .map(|group| (group.iter().map(|&s| s as i32).sum::<i32>() / channels as i32) as i16)
        .collect();

    AudioFrame {
        samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Converts a stream of frames at any rate and channel count to mono at
/// `target_rate`
///
/// Holds resampler state across frames, so one instance serves one audio
/// stream. Input that does not fill a resampler chunk waits for the next
/// frame; `flush` pushes out what is left when the stream ends.
pub struct StreamResampler {
    target_rate: u32,
    input_rate: Option<u32>,
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    timestamp_ms: u64,
}

impl StreamResampler {
    pub fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            input_rate: None,
            resampler: None,
            pending: Vec::new(),
            timestamp_ms: 0,
        }
    }

    /// Normalize one frame
    ///
    /// Returns `None` while the resampler is still filling a chunk.
    pub fn process(&mut self, frame: AudioFrame) -> Result<Option<AudioFrame>> {
        if frame.sample_rate == 0 {
            bail!("Audio frame has no sample rate");
        }

        let frame = to_mono(frame);
        self.timestamp_ms = frame.timestamp_ms;

        if self.input_rate != Some(frame.sample_rate) {
            self.configure(frame.sample_rate)?;
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Some(frame));
        };

        self.pending
            .extend(frame.samples.iter().map(|&s| s as f32 / 32768.0));

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let resampled = resampler
                .process(&[&self.pending[..needed]], None)
                .context("Failed to resample audio")?;
            output.extend(resampled[0].iter().map(|&s| f32_to_i16(s)));
            self.pending.drain(..needed);
        }

        Ok(self.emit(output))
    }

    /// Resample whatever input is still buffered, padding it with silence
    pub fn flush(&mut self) -> Result<Option<AudioFrame>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        if self.pending.is_empty() {
            return Ok(None);
        }

        let needed = resampler.input_frames_next();
        self.pending.resize(needed, 0.0);
        let resampled = resampler
            .process(&[&self.pending[..]], None)
            .context("Failed to resample audio")?;
        self.pending.clear();

        let output = resampled[0].iter().map(|&s| f32_to_i16(s)).collect();
        Ok(self.emit(output))
    }

    fn configure(&mut self, input_rate: u32) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(
                "Input rate changed mid-stream, dropping {} buffered samples",
                self.pending.len()
            );
            self.pending.clear();
        }

        self.resampler = if input_rate == self.target_rate {
            None
        } else {
            debug!("Resampling {}Hz -> {}Hz", input_rate, self.target_rate);
            Some(
                FftFixedIn::<f32>::new(
                    input_rate as usize,
                    self.target_rate as usize,
                    RESAMPLER_CHUNK_SIZE,
                    1, // sub chunks
                    1, // channels (mono)
                )
                .context("Failed to create resampler")?,
            )
        };
        self.input_rate = Some(input_rate);

        Ok(())
    }

    fn emit(&self, samples: Vec<i16>) -> Option<AudioFrame> {
        if samples.is_empty() {
            return None;
        }

        Some(AudioFrame {
            samples,
            sample_rate: self.target_rate,
            channels: 1,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
