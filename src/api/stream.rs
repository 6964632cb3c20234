//! WebSocket control plane.
//!
//! Clients send JSON requests (`{"action": "start", "project": "acme",
//! "modules": ["subfinder", "probe"]}`) and receive [`StreamMessage`]s. A
//! connection is subscribed to every project it sends a request for, so it
//! hears that project's pipeline events until it disconnects.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::routes::AppState;
use crate::broadcast::{StreamMessage, StreamSender};
use crate::control::{ReconService, StartOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Stop,
    Status,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
    pub project: String,
    /// Only read for `start`
    #[serde(default)]
    pub modules: Vec<String>,
}

/// WebSocket endpoint for the control plane
pub async fn control_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_control_socket(socket, state))
}

async fn handle_control_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection = Uuid::new_v4();
    tracing::info!(connection = %connection, "Control connection opened");

    let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Everything bound for this client, direct replies and hub events alike
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to encode stream message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!("Client disconnected");
                break;
            }
        }
    });

    let service = state.service.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ControlRequest>(&text) {
                    Ok(request) => dispatch(&service, connection, &tx, request),
                    Err(e) => {
                        tracing::warn!(connection = %connection, "Ignoring malformed request: {}", e)
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => {
            send_task.abort();
        }
        _ = &mut send_task => {
            recv_task.abort();
        }
    }

    let left = state.service.hub().unsubscribe_all(connection);
    tracing::info!(connection = %connection, projects = left, "Control connection closed");
}

/// Apply one request on behalf of `connection`.
///
/// Direct replies go to `tx` only; run events reach every subscriber through
/// the hub.
pub(crate) fn dispatch(
    service: &ReconService,
    connection: Uuid,
    tx: &StreamSender,
    request: ControlRequest,
) {
    let ControlRequest {
        action,
        project,
        modules,
    } = request;
    tracing::debug!(connection = %connection, project = %project, action = ?action, "Control request");

    service.hub().subscribe(&project, connection, tx.clone());

    let replies = match action {
        ControlAction::Start => match service.start(&project, modules) {
            StartOutcome::Started(_) => Vec::new(),
            StartOutcome::AlreadyActive(reply) => vec![reply],
        },
        ControlAction::Pause => {
            service.pause(&project);
            Vec::new()
        }
        ControlAction::Resume => {
            service.resume(&project);
            Vec::new()
        }
        ControlAction::Stop => {
            service.stop(&project);
            Vec::new()
        }
        ControlAction::Status => service.status(&project),
    };

    for reply in replies {
        if tx.send(reply).is_err() {
            tracing::debug!(connection = %connection, "Reply dropped, connection closing");
            break;
        }
    }
}
