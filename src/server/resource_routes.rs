use super::AppManagers;
use crate::tools::resource_tool;
use crate::utils::docker_stats;
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream;
use serde::Deserialize;
use std::sync::Arc;

pub async fn get_snapshot(State(managers): State<Arc<AppManagers>>) -> impl IntoResponse {
    Json(managers.sampler.sample().await)
}

/// Pushes a fresh snapshot every sample interval for as long as the client
/// stays connected. Each push re-runs the full sample.
pub async fn stream_snapshots(State(managers): State<Arc<AppManagers>>) -> impl IntoResponse {
    let interval = managers.config.resource_sample_interval;
    let stream = stream::unfold((managers, true), move |(managers, first)| async move {
        if !first {
            tokio::time::sleep(interval).await;
        }
        let snapshot = managers.sampler.sample().await;
        let event = SseEvent::default().json_data(&snapshot);
        Some((event, (managers, false)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct KillPortParams {
    pub port: u16,
}

pub async fn kill_port(Json(params): Json<KillPortParams>) -> Json<serde_json::Value> {
    let killed = resource_tool::kill_port(params.port).await;
    Json(serde_json::json!({ "success": true, "killed": killed }))
}

pub async fn docker_list() -> impl IntoResponse {
    Json(docker_stats::container_usage().await)
}

#[derive(Debug, Deserialize)]
pub struct DockerStopParams {
    pub id: String,
}

pub async fn docker_stop(Json(params): Json<DockerStopParams>) -> Json<serde_json::Value> {
    match docker_stats::stop_container(&params.id).await {
        Ok(()) => Json(serde_json::json!({ "success": true })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e })),
    }
}

pub async fn docker_stop_all() -> Json<serde_json::Value> {
    match docker_stats::stop_all_containers().await {
        Ok(message) => Json(serde_json::json!({ "success": true, "message": message })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e })),
    }
}
