//! Bridged transcription sessions
//!
//! This module provides the `SessionBridge` that, for each client connection:
//! - Connects a transcription backend session
//! - Streams audio to it from a background task
//! - Forwards turn results to the client as they arrive
//! - Turns on formatted turns after the first unformatted end of turn
//! - Tears everything down once, whichever side finishes first

mod bridge;
mod client;
mod config;
mod feed;
mod session;
mod stats;

pub use bridge::{ActiveSession, BridgeError, SessionBridge, SessionEnd};
pub use client::{ClientConnection, ClientSink, ClientStream, InboundFrame, OutboundMessage};
pub use config::SessionConfig;
pub use feed::{feed_audio, FeedStats};
pub use session::Session;
pub use stats::SessionStats;
