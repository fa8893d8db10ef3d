use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    StdIoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),

    #[error("No command to run for workspace '{0}'")]
    NoCommand(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailure(String),

    #[error("Failed to kill process tree: {0}")]
    KillFailure(String),

    #[error("Terminal session not found for ID: {0}")]
    SessionNotFound(String),

    #[error("Template step failed ({step}): {cause}")]
    StepFailed { step: String, cause: String },

    #[error("PTY support unavailable: {0}")]
    TerminalHelperMissing(String),

    #[error("Operation timed out: {0}")]
    TimeoutError(String),

    #[error("Invalid input argument: {0}")]
    InvalidInputArgument(String),

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        tracing::error!(kind = %self.kind(), "Request failed: {}", self);
        let status = match &self {
            AppError::NoCommand(_) | AppError::InvalidInputArgument(_) => StatusCode::BAD_REQUEST,
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

impl AppError {
    /// Short taxonomy label used in transport payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::StdIoError(_) => "io",
            AppError::ConfigError(_) => "config",
            AppError::NoCommand(_) => "no_command",
            AppError::SpawnFailure(_) => "spawn_failure",
            AppError::KillFailure(_) => "kill_failure",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::StepFailed { .. } => "step_failed",
            AppError::TerminalHelperMissing(_) => "terminal_helper_missing",
            AppError::TimeoutError(_) => "timeout",
            AppError::InvalidInputArgument(_) => "invalid_input",
            AppError::SerdeJsonError(_) => "serde_json",
        }
    }
}
