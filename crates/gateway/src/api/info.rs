//! `Info` — the one call that needs no client registration.

use axum::extract::State;
use axum::response::Json;

use super::AppState;

pub async fn get(State(state): State<AppState>) -> Json<mcpctl_controlplane::Info> {
    Json(state.info.clone())
}
