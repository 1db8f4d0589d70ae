//! `GetCatalog`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};

use super::error::ApiError;
use super::{AppState, ClientQuery};

pub async fn get_catalog(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.get_catalog(&q.client)?;
    Ok(Json(snapshot.as_ref().clone()))
}
