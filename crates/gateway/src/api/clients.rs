//! `RegisterClient`/`UnregisterClient`/`ListActiveClients`/`WatchActiveClients`.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use super::sse;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    client: String,
    pid: Option<u32>,
    #[serde(default)]
    tags: Vec<String>,
}

pub async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> impl IntoResponse {
    state.register_client(req.client, req.pid, req.tags);
    axum::http::StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct UnregisterRequest {
    client: String,
}

pub async fn unregister(State(state): State<AppState>, Json(req): Json<UnregisterRequest>) -> impl IntoResponse {
    state.unregister_client(&req.client);
    axum::http::StatusCode::NO_CONTENT
}

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.list_active_clients())
}

pub async fn watch(State(state): State<AppState>) -> impl IntoResponse {
    sse::json_stream(state.watch_active_clients())
}
