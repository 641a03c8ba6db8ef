//! HTTP server for transcription clients
//!
//! This module provides the endpoints of the relay:
//! - GET /ws - Websocket upgrade; streams turn messages until either side closes
//! - GET /sessions - Statistics of active sessions
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
pub use ws::{client_connection, WsClientSink, WsClientStream};
