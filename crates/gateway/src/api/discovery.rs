//! `ListTools`/`ListResources`/`ListPrompts`, their `Watch*` counterparts,
//! and `CallTool`/`ReadResource`/`GetPrompt`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use super::sse;
use super::{AppState, ClientQuery};

pub async fn list_tools(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    let tools = state.list_tools(&q.client)?;
    Ok(Json(tools.as_ref().clone()))
}

pub async fn watch_tools(State(state): State<AppState>, Query(q): Query<ClientQuery>) -> Result<impl IntoResponse, ApiError> {
    let stream = state.watch_tools(&q.client)?.map(|tools| tools.as_ref().clone());
    Ok(sse::json_stream(stream))
}

pub async fn list_resources(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let resources = state.list_resources(&q.client)?;
    Ok(Json(resources.as_ref().clone()))
}

pub async fn watch_resources(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stream = state.watch_resources(&q.client)?.map(|r| r.as_ref().clone());
    Ok(sse::json_stream(stream))
}

pub async fn list_prompts(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let prompts = state.list_prompts(&q.client)?;
    Ok(Json(prompts.as_ref().clone()))
}

pub async fn watch_prompts(
    State(state): State<AppState>,
    Query(q): Query<ClientQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stream = state.watch_prompts(&q.client)?.map(|p| p.as_ref().clone());
    Ok(sse::json_stream(stream))
}

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    client: String,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn call_tool(State(state): State<AppState>, Json(req): Json<CallToolRequest>) -> Result<impl IntoResponse, ApiError> {
    let result = state.call_tool(&req.client, &req.tool, req.arguments).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct ReadResourceRequest {
    client: String,
    uri: String,
}

pub async fn read_resource(
    State(state): State<AppState>,
    Json(req): Json<ReadResourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.read_resource(&req.client, &req.uri).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct GetPromptRequest {
    client: String,
    name: String,
    arguments: Option<Value>,
}

pub async fn get_prompt(State(state): State<AppState>, Json(req): Json<GetPromptRequest>) -> Result<impl IntoResponse, ApiError> {
    let result = state.get_prompt(&req.client, &req.name, req.arguments).await?;
    Ok(Json(result))
}
