//! `GetPoolStatus`/`WatchRuntimeStatus`/`GetServerInitStatus`/
//! `RetryServerInit`/`StreamLogs`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use futures_util::StreamExt;
use mcpctl_domain::fingerprint::SpecKey;

use super::error::ApiError;
use super::sse;
use super::{AppState, ClientQuery};

pub async fn get_pool_status(
    State(state): State<AppState>,
    Path(spec_key): Path<String>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.get_pool_status(&q.client, &SpecKey::from_hex(spec_key))?;
    Ok(Json(status))
}

pub async fn watch_runtime_status(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stream = state.watch_runtime_status(&q.client)?.map(|s| s.as_ref().clone());
    Ok(sse::json_stream(stream))
}

pub async fn get_server_init_status(
    State(state): State<AppState>,
    Path(spec_key): Path<String>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.get_server_init_status(&q.client, &SpecKey::from_hex(spec_key))?;
    Ok(Json(status))
}

pub async fn retry_server_init(
    State(state): State<AppState>,
    Path(spec_key): Path<String>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.retry_server_init(&q.client, &SpecKey::from_hex(spec_key)).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn stream_logs(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    Ok(sse::json_stream(state.stream_logs(&q.client)?))
}
