use std::sync::Arc;

use clap::Parser;

use voicebridge::audio::resampler::StreamResampler;
use voicebridge::audio::{CLIENT_SAMPLE_RATE, LIVE_INPUT_SAMPLE_RATE, LIVE_OUTPUT_SAMPLE_RATE};
use voicebridge::config::ServerConfig;
use voicebridge::routes::create_router;
use voicebridge::state::AppState;

/// Speech-to-speech audio bridge gateway.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Bind address, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("Crypto provider already installed");
    }

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    // Resampler construction must work or no connection ever will;
    // fail the process up front rather than per connection.
    StreamResampler::new(CLIENT_SAMPLE_RATE, LIVE_INPUT_SAMPLE_RATE)?;
    StreamResampler::new(LIVE_OUTPUT_SAMPLE_RATE, CLIENT_SAMPLE_RATE)?;
    tracing::info!("Audio resamplers verified");

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Voice bridge gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
