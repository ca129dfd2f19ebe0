//! Remediator service - autonomous pod remediation controller
//!
//! This service keeps a namespace healthy by:
//! - Watching pod lifecycle events and classifying container failures
//! - Requesting a diagnosis from the external analysis service
//! - Applying the suggested fix via strategic merge patch, with a
//!   delete-and-recreate fallback when the patch is rejected
//! - Providing a health endpoint for liveness probes

use axum::{response::Json, routing::get, Router};
use clap::Parser;
use remediator::diagnosis::DiagnosisClient;
use remediator::{Context, KubePods, RemediatorConfig, WatchSupervisor};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Autonomous pod remediation controller
#[derive(Parser)]
#[command(name = "remediator")]
#[command(about = "Watches pod failures, gets an AI diagnosis, and applies the suggested fix")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, env = "REMEDIATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace to watch and remediate
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Base URL of the diagnosis service
    #[arg(long, env = "ANALYSIS_URL")]
    analysis_url: Option<String>,

    /// Number of log lines sent with a diagnosis request
    #[arg(long, env = "LOG_TAIL_LINES")]
    log_tail_lines: Option<i64>,

    /// Minimum confidence score (0-100) required to mutate the cluster
    #[arg(long, env = "CONFIDENCE_THRESHOLD")]
    confidence_threshold: Option<f64>,

    /// Log the would-be patch instead of mutating anything
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Port for the HTTP health endpoint
    #[arg(long, env = "HEALTH_PORT")]
    health_port: Option<u16>,
}

fn load_config(cli: &Cli) -> remediator::Result<RemediatorConfig> {
    // An explicitly requested config file must load; only its absence
    // falls back to defaults
    let mut config = match &cli.config {
        Some(path) => {
            let cfg = RemediatorConfig::from_file(path)?;
            info!("Loaded configuration from {}", path.display());
            cfg
        }
        None => RemediatorConfig::default(),
    };

    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    if let Some(url) = &cli.analysis_url {
        config.analysis_url = url.clone();
    }
    if let Some(lines) = cli.log_tail_lines {
        config.log_tail_lines = lines;
    }
    if let Some(threshold) = cli.confidence_threshold {
        config.confidence_threshold = threshold;
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(port) = cli.health_port {
        config.health_port = port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.validate()?;

    info!(
        "Starting remediator v{} for namespace {} (dry_run={})",
        env!("CARGO_PKG_VERSION"),
        config.namespace,
        config.dry_run
    );

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let config = Arc::new(config);
    let ctx = Arc::new(Context {
        pods: Arc::new(KubePods::new(client.clone(), &config.namespace)),
        diagnosis: DiagnosisClient::new(&config.analysis_url)?,
        config: config.clone(),
    });

    // Start the watch supervisor in the background
    let supervisor = Arc::new(WatchSupervisor::new(client, ctx));
    let supervisor_handle = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = supervisor.run().await {
                error!("Watch supervisor error: {}", e);
            }
        })
    };

    // Health endpoint for liveness probes
    let app = Router::new().route("/health", get(health_check)).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(TimeoutLayer::new(Duration::from_secs(10))),
    );

    let addr = format!("0.0.0.0:{}", config.health_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Remediator HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting new events, then wait for in-flight remediation
    // tasks; dropping the runtime before they finish would cancel them
    supervisor_handle.abort();
    supervisor.drain().await;
    info!("Remediator stopped");

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "remediator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install shutdown signal handler: {}", e);
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            namespace: None,
            analysis_url: None,
            log_tail_lines: None,
            confidence_threshold: None,
            dry_run: false,
            health_port: None,
        }
    }

    #[test]
    fn unreadable_explicit_config_file_is_fatal() {
        let result = load_config(&cli(Some(PathBuf::from("/nonexistent/remediator.yaml"))));
        assert!(result.is_err());
    }

    #[test]
    fn absent_config_file_falls_back_to_defaults() {
        let config = load_config(&cli(None)).unwrap();
        assert_eq!(config.namespace, "default");
        assert!(!config.dry_run);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let mut cli = cli(None);
        cli.namespace = Some("prod".to_string());
        cli.dry_run = true;
        let config = load_config(&cli).unwrap();
        assert_eq!(config.namespace, "prod");
        assert!(config.dry_run);
    }
}
