use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use transcript_relay::{create_router, AppState, Config};

/// Relay live transcription turns to websocket clients
#[derive(Debug, Parser)]
#[command(name = "transcript-relay", version)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/transcript-relay")]
    config: String,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Transcription backend: {}", cfg.backend.api_host);
    info!(
        "Audio source: {} ({}Hz, {} channel(s))",
        cfg.audio.source, cfg.audio.sample_rate, cfg.audio.channels
    );

    let state = AppState::from_config(&cfg)?;
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
