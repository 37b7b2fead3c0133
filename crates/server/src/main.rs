use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reseeder_core::{load_config, validate_config};

use reseeder_server::api::create_router;
use reseeder_server::state::{AppState, StartupError};

/// Exit codes: 0 success, 1 configuration error, 2 runtime error.
const EXIT_CONFIG: u8 = 1;
const EXIT_RUNTIME: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StartupError::Config(message)) => {
            error!(error = %message, "Configuration error");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(StartupError::Runtime(message)) => {
            error!(error = %message, "Runtime error");
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config_path = std::env::var("RESEEDER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!(path = %config_path.display(), "Loading configuration");
    let config =
        load_config(&config_path).map_err(|e| StartupError::Config(e.to_string()))?;
    validate_config(&config).map_err(|e| StartupError::Config(e.to_string()))?;
    info!(
        indexers = config.indexers.len(),
        mode = ?config.action.mode,
        "Configuration loaded"
    );

    let addr = SocketAddr::new(config.daemon.host, config.daemon.port);
    let (state, announce_listener) = AppState::build(config).await?;

    // Background workers: scheduler and announce ingestion.
    state.pipeline.start();
    let listener_shutdown = state.pipeline.shutdown_signal();
    tokio::spawn(async move {
        announce_listener.run(listener_shutdown).await;
    });
    let pipeline = Arc::clone(&state.pipeline);

    let app = create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StartupError::Config(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "Daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            pipeline.shutdown();
        })
        .await
        .map_err(|e| StartupError::Runtime(e.to_string()))?;

    info!("Daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
