use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use authguard::app::App;
use authguard::config::{AuthGuardConfig, LogFormat, LoggingConfig};
use authguard::grpc::GrpcServer;
use authguard::http::HealthServer;

/// Brute-force protection service for authentication endpoints.
#[derive(Debug, Parser)]
#[command(name = "authguard", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "AUTHGUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AuthGuardConfig::from_file(path)?,
        None => AuthGuardConfig::default(),
    };

    init_tracing(&config.logging);

    info!("Starting Authguard");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        grpc_addr = %config.server.grpc_addr,
        http_addr = %config.server.http_addr,
        source = ?args.config,
        "Configuration loaded"
    );

    let app = Arc::new(App::new(&config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = app.start_sweeper(shutdown_rx.clone());
    let health = tokio::spawn(HealthServer::new(config.server.http_addr).serve(shutdown_rx));

    let grpc_server = GrpcServer::new(
        config.server.grpc_addr,
        app.clone(),
        config.server.request_timeout(),
    );

    // Run the server with graceful shutdown on Ctrl+C
    let served = grpc_server.serve_with_shutdown(shutdown_signal()).await;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            error!(error = %e, "Bucket sweeper task failed");
        }
    }
    match health.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP health server failed"),
        Err(e) => error!(error = %e, "HTTP health server task failed"),
    }

    served?;
    info!("Authguard stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
