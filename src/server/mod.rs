pub mod resource_routes;
pub mod template_routes;
pub mod terminal_ws;
pub mod workspace_routes;

use crate::config::Config;
use crate::events::EventHub;
use crate::tools::launcher_tool::CommandLauncher;
use crate::tools::reaper_tool::{platform_controller, ProcessTreeReaper};
use crate::tools::registry::ProcessRegistry;
use crate::tools::resource_tool::ResourceSampler;
use crate::tools::template_tool::TemplateExecutor;
use crate::tools::terminal_tool::TerminalManager;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Holds every manager, initialized once with the config and injected into
/// the routing layer as shared state.
pub struct AppManagers {
    pub config: Arc<Config>,
    pub process_events: Arc<EventHub<crate::events::ProcessEvent>>,
    pub terminal_events: Arc<EventHub<crate::events::TerminalEvent>>,
    pub template_events: Arc<EventHub<crate::events::TemplateEvent>>,
    pub registry: Arc<ProcessRegistry>,
    pub launcher: Arc<CommandLauncher>,
    pub reaper: Arc<ProcessTreeReaper>,
    pub terminals: Arc<TerminalManager>,
    pub templates: Arc<TemplateExecutor>,
    pub sampler: Arc<ResourceSampler>,
}

impl AppManagers {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let controller = platform_controller();
        let process_events = Arc::new(EventHub::new());
        let terminal_events = Arc::new(EventHub::new());
        let template_events = Arc::new(EventHub::new());
        let registry = Arc::new(ProcessRegistry::new());
        let launcher = Arc::new(CommandLauncher::new(
            registry.clone(),
            process_events.clone(),
            controller.clone(),
        ));
        let reaper = Arc::new(ProcessTreeReaper::new(
            registry.clone(),
            process_events.clone(),
            controller.clone(),
        ));
        let terminals = Arc::new(TerminalManager::new(config.clone(), terminal_events.clone()));
        let templates = Arc::new(TemplateExecutor::new(config.clone(), controller));
        let sampler = Arc::new(ResourceSampler::new(
            registry.clone(),
            terminals.clone(),
            templates.clone(),
        ));

        Arc::new(Self {
            config,
            process_events,
            terminal_events,
            template_events,
            registry,
            launcher,
            reaper,
            terminals,
            templates,
            sampler,
        })
    }
}

pub fn router(managers: Arc<AppManagers>) -> Router {
    Router::new()
        .route("/workspace/run", post(workspace_routes::run_workspace))
        .route("/workspace/stop", post(workspace_routes::stop_workspace))
        .route(
            "/workspace/:name/events",
            get(workspace_routes::workspace_events),
        )
        .route("/terminal", get(terminal_ws::terminal_ws))
        .route("/terminal/stop", post(terminal_ws::stop_terminal))
        .route("/template/apply", post(template_routes::apply_template))
        .route(
            "/template/apply/stream",
            post(template_routes::apply_template_stream),
        )
        .route("/resources", get(resource_routes::get_snapshot))
        .route("/resources/stream", get(resource_routes::stream_snapshots))
        .route("/resources/kill-port", post(resource_routes::kill_port))
        .route("/docker", get(resource_routes::docker_list))
        .route("/docker/stop", post(resource_routes::docker_stop))
        .route("/docker/stop-all", post(resource_routes::docker_stop_all))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(managers)
}

/// Forwards a per-key broadcast subscription as an SSE stream. The stream
/// ends when the key's channel is torn down (final event delivered).
pub(crate) fn sse_from_receiver<E>(
    rx: broadcast::Receiver<E>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>
where
    E: Serialize + Clone + Send + 'static,
{
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = SseEvent::default().json_data(&event);
                    return Some((sse, rx));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE subscriber lagged, dropping events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
