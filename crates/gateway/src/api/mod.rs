//! HTTP surface: one route group per `mcpctl-controlplane` operation area.
//!
//! Grounded in the teacher's `api::router` — a single `axum::Router`
//! assembled from per-area submodules, taking the shared state by value
//! so each handler can `State::<Arc<ControlPlane>>` extract it.

pub mod bootstrap;
pub mod catalog;
pub mod clients;
pub mod discovery;
pub mod error;
pub mod info;
pub mod observability;
pub mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use mcpctl_controlplane::ControlPlane;
use serde::Deserialize;

pub type AppState = Arc<ControlPlane>;

/// Every gated operation (everything but `/healthz` and `/v1/info`) takes
/// the calling client's id as a query parameter.
#[derive(Debug, Deserialize)]
pub struct ClientQuery {
    pub client: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/v1/info", get(info::get))
        .route("/v1/clients", get(clients::list).post(clients::register))
        .route("/v1/clients/unregister", post(clients::unregister))
        .route("/v1/clients/watch", get(clients::watch))
        .route("/v1/tools", get(discovery::list_tools))
        .route("/v1/tools/watch", get(discovery::watch_tools))
        .route("/v1/tools/call", post(discovery::call_tool))
        .route("/v1/resources", get(discovery::list_resources))
        .route("/v1/resources/watch", get(discovery::watch_resources))
        .route("/v1/resources/read", post(discovery::read_resource))
        .route("/v1/prompts", get(discovery::list_prompts))
        .route("/v1/prompts/watch", get(discovery::watch_prompts))
        .route("/v1/prompts/get", post(discovery::get_prompt))
        .route("/v1/pools/:spec_key", get(observability::get_pool_status))
        .route("/v1/pools/watch", get(observability::watch_runtime_status))
        .route("/v1/init/:spec_key", get(observability::get_server_init_status))
        .route("/v1/init/:spec_key/retry", post(observability::retry_server_init))
        .route("/v1/logs/stream", get(observability::stream_logs))
        .route("/v1/bootstrap", get(bootstrap::get_progress))
        .route("/v1/bootstrap/watch", get(bootstrap::watch_progress))
        .route("/v1/catalog", get(catalog::get_catalog))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mcpctl_catalog::TomlFileCatalogSource;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    #[tokio::test]
    async fn healthz_and_info_serve_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        tokio::fs::write(
            &path,
            r#"
            [specs.calc]
            name = "calc"
            transport = "stdio"
            cmd = ["calc-srv"]
            "#,
        )
        .await
        .unwrap();

        let plane = ControlPlane::start(Arc::new(TomlFileCatalogSource::new(path))).await.unwrap();
        let app = router(plane);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let body = get(addr, "/healthz").await;
        assert!(body.ends_with("ok"));

        let body = get(addr, "/v1/info").await;
        assert!(body.contains("\"name\""));
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        buf
    }
}
