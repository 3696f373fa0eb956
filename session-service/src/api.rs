// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tactics_common::{
    CommandOutcome, GameSummary, Rejection, RoomCommand, RoomEvent, RoomId, RoomSetup,
    RoomSnapshot,
};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{engine::Engine, notify::BroadcastSink};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub sink: Arc<BroadcastSink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub room_ids: Vec<RoomId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub accepted: bool,
    pub applied: bool,
    pub reason: Option<Rejection>,
    /// Room state after the command, absent once the room is gone.
    pub snapshot: Option<RoomSnapshot>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/rooms", post(create_room_handler).get(list_rooms_handler))
        .route(
            "/v1/rooms/{room_id}",
            get(get_room_handler).delete(close_room_handler),
        )
        .route("/v1/rooms/{room_id}/commands", post(command_handler))
        .route("/v1/rooms/{room_id}/stream", get(stream_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "session-service"}))
}

async fn create_room_handler(
    State(state): State<AppState>,
    Json(setup): Json<RoomSetup>,
) -> Result<(StatusCode, Json<RoomSnapshot>), ApiError> {
    let snapshot = state
        .engine
        .create_room(setup)
        .await
        .map_err(|error| ApiError::bad_request(error.to_string()))?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_rooms_handler(State(state): State<AppState>) -> Json<RoomListResponse> {
    let mut room_ids = state.engine.room_ids().await;
    room_ids.sort();
    Json(RoomListResponse { room_ids })
}

async fn get_room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    state
        .engine
        .snapshot(&room_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("room {room_id} not found")))
}

async fn close_room_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<GameSummary>, ApiError> {
    let summary = state
        .engine
        .close_room(&room_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("room {room_id} not found")))?;
    info!(room_id = %room_id, "room closed by request");
    Ok(Json(summary))
}

async fn command_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(command): Json<RoomCommand>,
) -> Result<Json<CommandResponse>, ApiError> {
    let CommandOutcome {
        accepted,
        applied,
        reason,
    } = state.engine.dispatch(&room_id, command).await;
    if reason == Some(Rejection::RoomNotFound) {
        return Err(ApiError::not_found(format!("room {room_id} not found")));
    }
    Ok(Json(CommandResponse {
        accepted,
        applied,
        reason,
        snapshot: state.engine.snapshot(&room_id).await,
    }))
}

async fn stream_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(snapshot) = state.engine.snapshot(&room_id).await else {
        return Err(ApiError::not_found(format!("room {room_id} not found")));
    };
    let events = state.sink.subscribe(&room_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, room_id, snapshot, events)))
}

async fn handle_socket(
    mut socket: axum::extract::ws::WebSocket,
    room_id: String,
    snapshot: RoomSnapshot,
    mut events: broadcast::Receiver<RoomEvent>,
) {
    let connected = serde_json::json!({
        "event": "connected",
        "room_id": room_id,
        "snapshot": snapshot,
        "connected_at": Utc::now(),
    })
    .to_string();
    if send_ws_event(&mut socket, &room_id, connected).await.is_err() {
        return;
    }

    loop {
        match events.recv().await {
            Ok(event) => {
                let terminal = matches!(
                    event,
                    RoomEvent::GameEnded { .. } | RoomEvent::NoMorePlayers
                );
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(room_id = %room_id, error = %error, "failed to encode room event");
                        continue;
                    }
                };
                if send_ws_event(&mut socket, &room_id, payload).await.is_err() || terminal {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(room_id = %room_id, skipped, "room stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_ws_event(
    socket: &mut axum::extract::ws::WebSocket,
    room_id: &str,
    payload: String,
) -> Result<(), ()> {
    socket
        .send(axum::extract::ws::Message::Text(payload.into()))
        .await
        .map_err(|error| {
            warn!(room_id = %room_id, error = ?error, "failed to push room event");
        })
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
