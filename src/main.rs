//! Cloudnest -- file upload server.
//!
//! Crash-only design: every startup is a recovery. Stale staged uploads
//! are purged, the metadata document is created if absent, and any
//! disagreement between records and stored files is reported. SIGTERM and
//! SIGINT only stop accepting connections and drain in-flight requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use cloudnest::config::{Config, LoggingConfig};

/// Command-line arguments for the Cloudnest server.
#[derive(Parser, Debug)]
#[command(name = "cloudnest", version, about = "Minimal file upload server")]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => cloudnest::config::load_config(path)?,
        None => Config::default(),
    };
    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics && cloudnest::metrics::init_metrics().is_some() {
        cloudnest::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Crash-only startup: every startup IS recovery.
    info!("Crash-only startup: performing recovery checks");
    let state = Arc::new(cloudnest::build_state(config)?);
    info!(
        "Storage backend '{}' at {}, metadata engine '{}' at {}",
        state.config.storage.backend,
        state.config.storage.upload_dir,
        state.config.metadata.engine,
        state.config.metadata.path
    );

    let records = state.catalog.load().await.into_collection().len();
    cloudnest::metrics::set_file_count(records);
    match state.catalog.reconcile(state.storage.as_ref()).await {
        Ok(report) if report.is_consistent() => {
            info!("Metadata consistent with storage: {} records", records)
        }
        Ok(report) => warn!(
            orphaned = ?report.orphaned_files,
            missing = ?report.missing_content,
            "Metadata and storage disagree; leaving both untouched"
        ),
        Err(e) => warn!("Reconciliation skipped: {:#}", e),
    }

    if let Some(limiter) = &state.rate_limiter {
        let every = Duration::from_secs(state.config.rate_limit.window_secs.max(1));
        cloudnest::rate_limit::spawn_pruner(limiter.clone(), every);
    }

    let app = cloudnest::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Cloudnest file server listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Cloudnest shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
