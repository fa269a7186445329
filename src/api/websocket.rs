// WebSocket transport - session commands in, snapshots out

//! `GET /sessions/:id/ws` upgrades to a WebSocket bound to one session.
//! Each text frame carries one JSON [`SessionCommand`]; each reply is a
//! tagged [`ServerMessage`]:
//!
//! ```json
//! {"type": "snapshot", "session_id": "...", "state": {...}}
//! {"type": "error", "error": {"message": "...", "type": "validation_error"}}
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::handlers::dispatch;
use super::types::{CommandResponse, ErrorDetail, ErrorResponse, SessionCommand};
use super::AppState;
use crate::{ModellingError, Result};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot(CommandResponse),
    Error { error: ErrorDetail },
}

impl From<ErrorResponse> for ServerMessage {
    fn from(response: ErrorResponse) -> Self {
        ServerMessage::Error {
            error: response.error,
        }
    }
}

/// GET /sessions/:id/ws
pub async fn session_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if !state.sessions.contains_key(&id) {
        return Err(ModellingError::NotFound(format!("session {}", id)));
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    info!(session = %session_id, "🔌 WebSocket attached to session");

    while let Some(Ok(message)) = receiver.next().await {
        let reply = match message {
            Message::Text(text) => handle_text(&state, session_id, &text).await,
            Message::Ping(data) => {
                if let Err(e) = sender.send(Message::Pong(data)).await {
                    error!("Failed to send pong: {}", e);
                    break;
                }
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };

        let json = serde_json::to_string(&reply).unwrap_or_else(|e| {
            error!("Failed to serialize message: {}", e);
            String::from(r#"{"type":"error","error":{"message":"serialization failed","type":"internal_error"}}"#)
        });
        if let Err(e) = sender.send(Message::Text(json)).await {
            error!("Failed to send WebSocket message: {}", e);
            break;
        }
    }

    info!(session = %session_id, "WebSocket detached from session");
}

/// Parse and run one text frame
pub async fn handle_text(state: &AppState, session_id: Uuid, text: &str) -> ServerMessage {
    let command = match serde_json::from_str::<SessionCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!("rejecting malformed command frame: {}", e);
            return ErrorResponse::new(
                format!("Invalid message format: {}", e),
                "invalid_request_error",
            )
            .into();
        }
    };

    match dispatch(state, session_id, command).await {
        Ok(response) => ServerMessage::Snapshot(response),
        Err(e) => ErrorResponse::from(&e).into(),
    }
}
