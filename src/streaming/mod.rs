//! Streaming speech-to-text backend contract
//!
//! A `TranscriptionSession` owns one connection to a real-time transcription
//! service. Events produced by the service are delivered over the channel
//! returned from `connect`, in the order the service produced them.

pub mod assemblyai;
pub mod events;
pub mod messages;

pub use assemblyai::{AssemblyAiSession, StreamingClientOptions};
pub use events::{
    BeginEvent, EventReceiver, EventSender, StreamingError, StreamingEvent, TerminationEvent,
    TurnEvent, Word,
};
pub use messages::{SessionParameters, StreamingParameters};

use crate::audio::AudioFrame;
use anyhow::Result;

/// Connection to a real-time transcription backend
#[async_trait::async_trait]
pub trait TranscriptionSession: Send + Sync {
    /// Open the session with the given parameters
    ///
    /// Returns the receiving end of the session's event channel. The channel
    /// closes when the backend connection ends.
    async fn connect(&self, params: &StreamingParameters) -> Result<EventReceiver>;

    /// Forward one audio frame (16-bit PCM at the negotiated rate, mono)
    async fn stream(&self, frame: &AudioFrame) -> Result<()>;

    /// Update session parameters mid-stream
    ///
    /// Takes effect for subsequent turns only. Implementations enqueue the
    /// request and return without waiting for the backend to apply it.
    async fn set_params(&self, params: &SessionParameters) -> Result<()>;

    /// Close the session
    ///
    /// With `terminate`, ask the backend to finish the session first so it
    /// emits its Termination event before the connection closes.
    async fn disconnect(&self, terminate: bool) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
