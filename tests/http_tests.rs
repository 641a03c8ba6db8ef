// HTTP endpoint tests
//
// Plain endpoints are exercised through the router with `oneshot`. The
// websocket test runs the whole relay: a WAV file as audio, a local fake of
// the streaming service as backend, and a tokio-tungstenite client.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;
use transcript_relay::audio::{AudioBackendConfig, AudioSource};
use transcript_relay::session::{OutboundMessage, SessionStats};
use transcript_relay::{create_router, AppState, SessionConfig, StreamingClientOptions};

fn state(api_host: String, audio_source: AudioSource) -> AppState {
    AppState::new(
        SessionConfig::default(),
        StreamingClientOptions {
            api_key: "test-key".to_string(),
            api_host,
            disconnect_timeout: Duration::from_secs(2),
        },
        audio_source,
        AudioBackendConfig::default(),
    )
}

async fn get(app: axum::Router, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn write_wav(path: &Path, seconds: f64) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..(seconds * 16000.0) as usize {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let app = create_router(state(
        "streaming.assemblyai.com".to_string(),
        AudioSource::Microphone,
    ));

    let (status, body) = get(app, "/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    Ok(())
}

#[tokio::test]
async fn test_sessions_empty() -> Result<()> {
    let app = create_router(state(
        "streaming.assemblyai.com".to_string(),
        AudioSource::Microphone,
    ));

    let (status, body) = get(app, "/sessions").await?;

    assert_eq!(status, StatusCode::OK);
    let sessions: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
    assert!(sessions.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_route() -> Result<()> {
    let app = create_router(state(
        "streaming.assemblyai.com".to_string(),
        AudioSource::Microphone,
    ));

    let (status, _) = get(app, "/nope").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

/// Fake streaming service: Begin, one unformatted end of turn, then record
/// text frames until Terminate and finish the session
async fn fake_service(listener: TcpListener) -> Result<Vec<String>> {
    let (stream, _) = listener.accept().await?;
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    ws.send(Message::Text(r#"{"type":"Begin","id":"session-1"}"#.into()))
        .await?;
    ws.send(Message::Text(
        r#"{"type":"Turn","transcript":"hello","end_of_turn":true,"turn_is_formatted":false}"#.into(),
    ))
    .await?;

    let mut texts = Vec::new();
    while let Some(message) = ws.next().await {
        if let Message::Text(text) = message? {
            let terminate = text.contains("\"Terminate\"");
            texts.push(text.to_string());
            if terminate {
                break;
            }
        }
    }

    ws.send(Message::Text(
        r#"{"type":"Termination","audio_duration_seconds":0.5,"session_duration_seconds":0.6}"#.into(),
    ))
    .await?;
    ws.close(None).await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), async {
        while ws.next().await.is_some() {}
    })
    .await;

    Ok(texts)
}

#[tokio::test]
async fn test_websocket_relays_turns() -> Result<()> {
    let dir = TempDir::new()?;
    let wav = dir.path().join("meeting.wav");
    write_wav(&wav, 2.0)?;

    let backend_listener = TcpListener::bind("127.0.0.1:0").await?;
    let backend_addr = backend_listener.local_addr()?;
    let backend = tokio::spawn(fake_service(backend_listener));

    let app = create_router(state(
        format!("ws://{}", backend_addr),
        AudioSource::File(wav.display().to_string()),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server_app = app.clone();
    tokio::spawn(async move { axum::serve(listener, server_app).await });

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await?;

    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await?
        .expect("connection closed before a turn arrived")?;
    let turn: OutboundMessage = serde_json::from_str(message.to_text()?)?;
    assert_eq!(
        turn,
        OutboundMessage {
            transcript: "hello".to_string(),
            end_of_turn: true,
        }
    );

    // The session is visible while the client is connected
    let (_, body) = get(app.clone(), "/sessions").await?;
    let sessions: Vec<SessionStats> = serde_json::from_slice(&body)?;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].backend_session_id.as_deref(), Some("session-1"));
    assert!(sessions[0].is_running);

    client.close(None).await?;

    let texts = tokio::time::timeout(Duration::from_secs(5), backend).await???;
    let updates: Vec<_> = texts
        .iter()
        .filter(|t| t.contains("\"UpdateConfiguration\""))
        .collect();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains("\"format_turns\":true"));
    assert!(texts.last().unwrap().contains("\"Terminate\""));

    // Session is removed once torn down
    let mut remaining = usize::MAX;
    for _ in 0..50 {
        let (_, body) = get(app.clone(), "/sessions").await?;
        let sessions: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
        remaining = sessions.len();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);

    Ok(())
}
