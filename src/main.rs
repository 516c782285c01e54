use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use proshop_voice::config::ServerConfig;
use proshop_voice::routes::build_router;
use proshop_voice::session::{FinalizeReason, finalize_call};
use proshop_voice::state::AppState;

/// Real-time voice pipeline for the pro shop phone agent.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Override the bind host from the environment.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port from the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let address = config.address();
    let state = AppState::new(config)?;
    let router = build_router(state.clone());

    // On SIGINT, finalize live calls first: cancelling their sessions
    // persists the transcripts and closes the media sockets, which lets
    // the graceful shutdown below complete.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(
            "Shutdown signal received, finalizing {} active calls",
            state.registry.active_count()
        );
        for session in state.registry.sessions() {
            finalize_call(
                &session,
                &state.registry,
                state.directory.as_ref(),
                FinalizeReason::Shutdown,
            )
            .await;
        }
        signal_token.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Voice pipeline listening on {}", address);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
