pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod streaming;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    FileBackend,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    ActiveSession, BridgeError, ClientConnection, OutboundMessage, Session, SessionBridge,
    SessionConfig, SessionEnd, SessionStats,
};
pub use streaming::{
    AssemblyAiSession, StreamingClientOptions, StreamingEvent, TranscriptionSession, TurnEvent,
};
