use super::state::AppState;
use super::ws::client_connection;
use crate::audio::AudioBackendFactory;
use crate::session::{SessionEnd, SessionStats};
use crate::streaming::{AssemblyAiSession, TranscriptionSession};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info};

/// GET /ws
/// Upgrade to a websocket and bridge a transcription session onto it
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let audio = match AudioBackendFactory::create(
        state.audio_source.clone(),
        state.audio_config.clone(),
    ) {
        Ok(audio) => audio,
        Err(e) => {
            error!("Failed to create audio backend: {:#}", e);
            if let Err(e) = socket.close().await {
                error!("Failed to close websocket: {}", e);
            }
            return;
        }
    };

    let backend: Arc<dyn TranscriptionSession> =
        Arc::new(AssemblyAiSession::new(state.streaming.clone()));

    let active = match state
        .bridge
        .start(client_connection(socket), backend, audio)
        .await
    {
        Ok(active) => active,
        Err(e) => {
            error!("Failed to start session: {}", e);
            return;
        }
    };

    let session = Arc::clone(active.session());
    let connection_id = session.connection_id().to_string();

    // Register session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(connection_id.clone(), session);
    }

    let (end, stats) = active.finish().await;

    // Remove session
    {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&connection_id);
    }

    log_session_end(&end, &stats);
}

fn log_session_end(end: &SessionEnd, stats: &SessionStats) {
    info!(
        "Session {} finished ({:?}): {} turns forwarded, {} failed writes, {} frames streamed, {:.1}s",
        stats.connection_id,
        end,
        stats.turns_forwarded,
        stats.write_failures,
        stats.frames_streamed,
        stats.duration_secs
    );
}

/// GET /sessions
/// Statistics of all active sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<_> = {
        let sessions = state.sessions.read().await;
        sessions.values().cloned().collect()
    };

    let mut stats = Vec::with_capacity(sessions.len());
    for session in sessions {
        stats.push(session.stats().await);
    }

    (StatusCode::OK, Json(stats))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
