use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use lms_gateway::config::{GatewayConfig, Overrides, Settings, load_config};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lms-gateway", version, about = "LMS external-function gateway")]
struct Args {
    /// YAML config file.
    #[arg(long, env = "LMS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides `bind` in the config file).
    #[arg(long, env = "LMS_GATEWAY_BIND")]
    bind: Option<String>,

    /// Database URL, `postgres://...` or `sqlite:...` (overrides `database.url`).
    #[arg(long, env = "LMS_GATEWAY_DATABASE_URL")]
    database_url: Option<String>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "LMS_GATEWAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

async fn wait_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_sigterm() {
    std::future::pending::<()>().await;
}

/// Resolves on ctrl-c or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    tokio::select! {
        () = wait_ctrl_c() => info!("ctrl-c received, shutting down"),
        () = wait_sigterm() => info!("SIGTERM received, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            bind: args.bind,
            database_url: args.database_url,
        },
    )?;

    let state = lms_gateway::build_state(&settings).await?;
    let functions = state.registry.list().len();
    let app = lms_gateway::http::router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("bind {}", settings.bind))?;
    info!(bind = %settings.bind, functions, "lms-gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    Ok(())
}
