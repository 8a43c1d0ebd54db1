//! opsgenie exporter
//!
//! - Polls the Opsgenie REST API on a fixed interval
//! - Fans out one pipeline per resource type, joins, stamps the poll
//! - Serves the collected gauges on /metrics in Prometheus text format
//! - Graceful shutdown on Ctrl-C / SIGTERM

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use opsgenie_core::error::{ExporterError, Result};
use opsgenie_exporter::{
    app_state::AppState,
    client::OpsgenieClient,
    collector::{Collector, CollectorSettings},
    config::{self, Overrides},
    obs::MetricStore,
    router,
};

#[derive(Parser)]
#[command(name = "opsgenie-exporter")]
#[command(about = "Prometheus exporter for Opsgenie account statistics")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, env = "OPSGENIE_EXPORTER_CONFIG")]
    config: Option<String>,

    /// Opsgenie API key
    #[arg(long, env = "OPSGENIE_API_KEY", hide_env_values = true)]
    api_key: String,

    /// The port to run the Prometheus metrics server on
    #[arg(long = "http.port")]
    http_port: Option<u16>,

    /// Interval between metric updates in seconds
    #[arg(long)]
    refresh: Option<u64>,

    /// Opsgenie API base URL (e.g. https://api.opsgenie.com/v2/)
    #[arg(long, env = "OPSGENIE_BASE_URL")]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = e.kind().as_str(), error = %e, "opsgenie-exporter failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.api_key.trim().is_empty() {
        return Err(ExporterError::Config("api key must not be empty".into()));
    }

    let overrides = Overrides {
        http_port: cli.http_port,
        refresh_secs: cli.refresh,
        base_url: cli.base_url.clone(),
    };
    let cfg = config::resolve(cli.config.as_deref(), &overrides)?;
    let listen = cfg.server.listen_addr()?;

    let store = Arc::new(MetricStore::new());
    let client = OpsgenieClient::from_config(&cfg.api, &cli.api_key)?;
    let collector = Arc::new(Collector::new(
        Arc::new(client),
        Arc::clone(&store),
        CollectorSettings::from(&cfg.collector),
    ));

    let state = AppState::new(store, collector.subscribe());
    let app = router::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ExporterError::Internal(format!("failed to bind {listen}: {e}")))?;
    info!(
        %listen,
        base_url = %cfg.api.base_url,
        interval_secs = cfg.collector.interval_secs,
        "opsgenie-exporter starting"
    );

    let shutdown = CancellationToken::new();

    let collector_task = {
        let collector = Arc::clone(&collector);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { collector.run(shutdown).await })
    };

    {
        let shutdown = shutdown.clone();
        let state = state.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received, draining");
            state.set_draining();
            shutdown.cancel();
        });
    }

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .map_err(|e| ExporterError::Internal(format!("server failed: {e}")))?;

    shutdown.cancel();
    collector_task
        .await
        .map_err(|e| ExporterError::Internal(format!("collector task failed: {e}")))?;

    info!("opsgenie-exporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
