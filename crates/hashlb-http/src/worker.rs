//! Stub backend worker.
//!
//! Workers hold no state; they only identify themselves so the balancer's
//! routing can be observed from the outside.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};

/// Identifier used when no `SERVER_ID` is configured.
pub const UNKNOWN_SERVER_ID: &str = "Unknown";

/// HTTP server for one backend worker.
pub struct WorkerServer {
    router: Router,
}

impl WorkerServer {
    /// Create a worker that introduces itself as `server_id`.
    pub fn new(server_id: impl Into<String>) -> Self {
        let server_id: Arc<str> = server_id.into().into();
        let router = Router::new()
            .route("/home", get(home))
            .route("/heartbeat", get(heartbeat))
            .with_state(server_id);
        Self { router }
    }

    /// Return the inner [`Router`].
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "worker listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "worker listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn home(State(server_id): State<Arc<str>>) -> Json<Value> {
    Json(json!({
        "message": format!("Hello from Server: {server_id}"),
        "status": "successful",
    }))
}

async fn heartbeat() -> Json<Value> {
    Json(json!({}))
}
