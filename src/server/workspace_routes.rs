use super::{sse_from_receiver, AppManagers};
use crate::error::AppError;
use crate::tools::launcher_tool::Started;
use axum::extract::{Path as AxumPath, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RunWorkspaceParams {
    pub name: String,
    pub path: String,
    /// Resolved dev/start command; empty or missing means the workspace is
    /// not runnable.
    #[serde(default)]
    pub command: Option<String>,
    /// Extra environment for the child, merged over the daemon's own.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunWorkspaceResult {
    pub workspace_name: String,
    pub started: Started,
}

pub async fn run_workspace(
    State(managers): State<Arc<AppManagers>>,
    Json(params): Json<RunWorkspaceParams>,
) -> Result<Json<RunWorkspaceResult>, AppError> {
    let command = params.command.as_deref().unwrap_or_default();
    info!(workspace = %params.name, command = %command, "run_workspace request");
    let started = managers
        .launcher
        .start(&params.name, Path::new(&params.path), command, &params.env)
        .await?;
    Ok(Json(RunWorkspaceResult {
        workspace_name: params.name,
        started,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StopWorkspaceParams {
    pub name: String,
}

pub async fn stop_workspace(
    State(managers): State<Arc<AppManagers>>,
    Json(params): Json<StopWorkspaceParams>,
) -> Json<serde_json::Value> {
    let outcome = managers.reaper.stop(&params.name).await;
    Json(serde_json::json!({
        "success": true,
        "stopped": outcome.stopped,
        "message": outcome.message,
    }))
}

/// Live log/error/exit stream for one workspace key. The stream terminates
/// after the exit event.
pub async fn workspace_events(
    State(managers): State<Arc<AppManagers>>,
    AxumPath(name): AxumPath<String>,
) -> impl IntoResponse {
    sse_from_receiver(managers.process_events.subscribe(&name))
}
