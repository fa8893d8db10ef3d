use super::{sse_from_receiver, AppManagers};
use crate::error::AppError;
use crate::tools::template_tool::TemplateStep;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ApplyTemplateParams {
    pub path: String,
    pub steps: Vec<TemplateStep>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTemplateResult {
    pub success: bool,
    pub message: String,
    pub progress: Vec<String>,
}

/// Synchronous mode: returns only on completion or first failure, carrying
/// the collected progress log.
pub async fn apply_template(
    State(managers): State<Arc<AppManagers>>,
    Json(params): Json<ApplyTemplateParams>,
) -> Result<Json<ApplyTemplateResult>, AppError> {
    if params.steps.is_empty() {
        return Err(AppError::InvalidInputArgument(
            "Template has no steps".to_string(),
        ));
    }
    info!(path = %params.path, steps = params.steps.len(), "apply_template request");

    let dir = PathBuf::from(&params.path);
    let progress = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = progress.clone();
    managers
        .templates
        .apply(&params.steps, &dir, move |message| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(message);
        })
        .await?;

    let progress = progress.lock().unwrap_or_else(|e| e.into_inner()).clone();
    Ok(Json(ApplyTemplateResult {
        success: true,
        message: "Template applied successfully".to_string(),
        progress,
    }))
}

/// Streaming mode: the response body is an SSE stream of
/// `template:progress` events ending in `template:success` or
/// `template:error`.
pub async fn apply_template_stream(
    State(managers): State<Arc<AppManagers>>,
    Json(params): Json<ApplyTemplateParams>,
) -> impl IntoResponse {
    let job_key = Uuid::new_v4().to_string();
    // Subscribe before the job starts so no progress event is missed.
    let rx = managers.template_events.subscribe(&job_key);

    let templates = managers.templates.clone();
    let events = managers.template_events.clone();
    let dir = PathBuf::from(&params.path);
    tokio::spawn(async move {
        let _ = templates
            .apply_streaming(&params.steps, &dir, events, &job_key)
            .await;
    });

    sse_from_receiver(rx)
}
