//! `GetBootstrapProgress`/`WatchBootstrapProgress`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};

use super::error::ApiError;
use super::sse;
use super::{AppState, ClientQuery};

pub async fn get_progress(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.get_bootstrap_progress(&q.client)?))
}

pub async fn watch_progress(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    Ok(sse::json_stream(state.watch_bootstrap_progress(&q.client)?))
}
