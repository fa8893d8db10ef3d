use super::AppManagers;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Messages a client may send over the terminal socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TerminalClientMessage {
    Start {
        path: String,
        command: String,
        #[serde(default, alias = "workspaceName")]
        workspace_name: Option<String>,
    },
    Input {
        data: String,
    },
    Stop,
}

pub async fn terminal_ws(
    State(managers): State<Arc<AppManagers>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(managers, socket))
}

/// One socket = one session id. The session registry is keyed by this id,
/// so a dropped connection tears its shell down exactly like an explicit
/// stop would.
async fn handle_socket(managers: Arc<AppManagers>, socket: WebSocket) {
    let session_id = Uuid::new_v4().to_string();
    info!(session_id = %session_id, "Terminal connection opened");

    let (mut sink, mut stream) = socket.split();

    // Forward session events to the client. A session's channel closes
    // after its final exit event; resubscribe so a later `start` on this
    // connection keeps streaming.
    let events = managers.terminal_events.clone();
    let forward_session = session_id.clone();
    let forwarder = tokio::spawn(async move {
        'outer: loop {
            let mut rx = events.subscribe(&forward_session);
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break 'outer;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session_id = %forward_session, skipped, "Terminal subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<TerminalClientMessage>(&text) {
                Ok(TerminalClientMessage::Start {
                    path,
                    command,
                    workspace_name,
                }) => {
                    managers
                        .terminals
                        .start(&session_id, workspace_name, Path::new(&path), &command)
                        .await;
                }
                Ok(TerminalClientMessage::Input { data }) => {
                    managers.terminals.input(&session_id, &data).await;
                }
                Ok(TerminalClientMessage::Stop) => {
                    managers.terminals.stop(&session_id).await;
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "Ignoring malformed terminal message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // No orphaned shells survive a client disconnect.
    managers.terminals.stop(&session_id).await;
    forwarder.abort();
    info!(session_id = %session_id, "Terminal connection closed");
}

#[derive(Debug, Deserialize)]
pub struct StopTerminalParams {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "workspaceName")]
    pub workspace_name: Option<String>,
    /// Needed for `.runtime.json` container cleanup and `npm run stop`.
    #[serde(default, alias = "workspacePath")]
    pub workspace_path: Option<String>,
}

/// Administrative stop, by session id or by workspace name (the latter also
/// performs the workspace's container/script cleanup).
pub async fn stop_terminal(
    State(managers): State<Arc<AppManagers>>,
    Json(params): Json<StopTerminalParams>,
) -> Json<serde_json::Value> {
    if let Some(workspace_name) = &params.workspace_name {
        let stopped = managers
            .terminals
            .stop_workspace(
                workspace_name,
                params.workspace_path.as_deref().map(Path::new),
            )
            .await;
        let message = if stopped {
            format!(
                "Terminated process and freed resources for workspace {}",
                workspace_name
            )
        } else {
            format!(
                "Cleanup performed for workspace {} (no active terminal found)",
                workspace_name
            )
        };
        return Json(serde_json::json!({ "success": true, "stopped": stopped, "message": message }));
    }

    if let Some(session_id) = &params.session_id {
        let stopped = managers.terminals.stop(session_id).await;
        let message = if stopped {
            format!("Terminated process for session {}", session_id)
        } else {
            format!(
                "No active terminal process found for session {} (already stopped)",
                session_id
            )
        };
        return Json(serde_json::json!({ "success": true, "stopped": stopped, "message": message }));
    }

    Json(serde_json::json!({
        "success": false,
        "message": "Missing sessionId or workspaceName",
    }))
}
