//! HTTP server implementation using Axum.

use crate::handlers::{
    handle_add_app, handle_health, handle_health_detailed, handle_list, handle_logs,
    handle_preview, handle_remove_app, handle_restart, handle_server_status, handle_start,
    handle_status, handle_stop, handle_update_app,
};
use axum::{
    routing::{get, post},
    Router,
};
use nexrift_core::Supervisor;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub supervisor: Supervisor,
}

/// Build the API router.
pub fn router(supervisor: Supervisor) -> Router {
    let state = Arc::new(AppState { supervisor });

    // The dashboard is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/server/status", get(handle_server_status))
        .route("/api/apps", get(handle_list).post(handle_add_app))
        .route(
            "/api/apps/:id",
            get(handle_status)
                .put(handle_update_app)
                .delete(handle_remove_app),
        )
        .route("/api/apps/:id/start", post(handle_start))
        .route("/api/apps/:id/stop", post(handle_stop))
        .route("/api/apps/:id/restart", post(handle_restart))
        .route("/api/apps/:id/status/detailed", get(handle_health_detailed))
        .route("/api/apps/:id/test", get(handle_preview))
        .route("/api/apps/:id/logs", get(handle_logs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    supervisor: Supervisor,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let app = router(supervisor);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexrift_core::{AppConfig, LaunchKind, MemoryConfigStore};
    use serde_json::Value;

    fn test_supervisor() -> Supervisor {
        let store = MemoryConfigStore::with_apps([AppConfig::new(
            "demo",
            "Demo",
            LaunchKind::Executable,
            "/nonexistent/nexrift-demo",
            8188,
        )]);
        Supervisor::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_server_starts() {
        let addr = start_server(test_supervisor(), "127.0.0.1", 0)
            .await
            .unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_error_bodies_carry_kind() {
        let addr = start_server(test_supervisor(), "127.0.0.1", 0)
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let response = client
            .get(format!("http://{}/api/apps/missing", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "config_not_found");

        let response = client
            .post(format!("http://{}/api/apps/demo/stop", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 409);

        let response = client
            .post(format!("http://{}/api/apps/demo/start", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["kind"], "spawn_failed");
    }

    #[tokio::test]
    async fn test_malformed_config_bodies_use_error_envelope() {
        let addr = start_server(test_supervisor(), "127.0.0.1", 0)
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let requests = [
            client.post(format!("http://{}/api/apps", addr)).body("{not json"),
            client
                .post(format!("http://{}/api/apps", addr))
                .header("Content-Type", "application/json")
                .body(r#"{"id": "half"}"#),
            client
                .put(format!("http://{}/api/apps/demo", addr))
                .header("Content-Type", "application/json")
                .body("[1, 2]"),
        ];
        for request in requests {
            let response = request.send().await.unwrap();
            assert_eq!(response.status().as_u16(), 400);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["success"], false);
            assert_eq!(body["kind"], "validation");
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let addr = start_server(test_supervisor(), "127.0.0.1", 0)
            .await
            .unwrap();
        let response = reqwest::Client::new()
            .get(format!("http://{}/api/health", addr))
            .header("Origin", "http://dashboard.local")
            .send()
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
