// FILE: src/main.rs
mod config;
mod error;
mod events;
mod server;
mod tools;
mod utils;

use crate::config::Config;
use crate::server::AppManagers;
use anyhow::Result;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt::format::FmtSpan, FmtSubscriber};

fn setup_logging(log_level_str: &str) {
    let level = match log_level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("workspace_commander={}", level)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().expect("Failed to load configuration.");
    setup_logging(&config.log_level);

    tracing::info!(version = %env!("CARGO_PKG_VERSION"), "Starting workspace-commander orchestrator");
    tracing::debug!("Loaded configuration: {:?}", config);

    if which::which("docker").is_err() {
        tracing::warn!("docker is not installed or not in PATH. Container usage will be reported as empty.");
    }
    if cfg!(unix) && which::which("bash").is_err() {
        tracing::warn!("bash is not installed or not in PATH. Interactive terminal sessions will fail to start.");
    }

    let config = Arc::new(config);
    let managers = AppManagers::new(config.clone());
    let app = server::router(managers.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(managers.clone()))
        .await?;

    tracing::info!("Server shutdown.");
    Ok(())
}

async fn shutdown_signal(managers: Arc<AppManagers>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received, killing tracked processes");
    managers.registry.kill_all().await;
}
