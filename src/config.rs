use anyhow::{Context, Result};
use shellexpand;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub default_shell: Option<String>,
    pub log_level: String,
    pub template_step_timeout: Duration,
    pub resource_sample_interval: Duration,
    pub terminal_rows: u16,
    pub terminal_cols: u16,
}

fn expand_tilde(path_str: &str) -> Result<PathBuf, anyhow::Error> {
    Ok(PathBuf::from(shellexpand::tilde(path_str).into_owned()))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let workspace_root_str = std::env::var("WORKSPACE_ROOT")
            .context("WORKSPACE_ROOT environment variable must be set")?;
        let workspace_root = expand_tilde(&workspace_root_str)?
            .canonicalize()
            .context(format!("Failed to canonicalize WORKSPACE_ROOT: {}", workspace_root_str))?;
        if !workspace_root.is_dir() {
            anyhow::bail!("WORKSPACE_ROOT is not a valid directory: {:?}", workspace_root);
        }

        let host = std::env::var("ORCHESTRATOR_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("ORCHESTRATOR_PORT")
            .unwrap_or_else(|_| "4100".to_string())
            .parse::<u16>()
            .context("Invalid ORCHESTRATOR_PORT")?;

        let default_shell = std::env::var("DEFAULT_SHELL").ok().filter(|s| !s.is_empty());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        // Template command steps cover package-manager installs, which can be slow.
        let template_step_timeout = std::env::var("TEMPLATE_STEP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("Invalid TEMPLATE_STEP_TIMEOUT_SECS")?;

        let resource_sample_interval = std::env::var("RESOURCE_SAMPLE_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("Invalid RESOURCE_SAMPLE_INTERVAL_SECS")?;

        let terminal_rows = std::env::var("TERMINAL_ROWS")
            .unwrap_or_else(|_| "24".to_string())
            .parse::<u16>()
            .context("Invalid TERMINAL_ROWS")?;
        let terminal_cols = std::env::var("TERMINAL_COLS")
            .unwrap_or_else(|_| "80".to_string())
            .parse::<u16>()
            .context("Invalid TERMINAL_COLS")?;

        Ok(Config {
            workspace_root,
            host,
            port,
            default_shell,
            log_level,
            template_step_timeout,
            resource_sample_interval,
            terminal_rows,
            terminal_cols,
        })
    }
}
