//! HTTP surface for hashlb.
//!
//! Provides a [`BalancerServer`] exposing the router over axum, and a
//! [`WorkerServer`] implementing the stub backend it forwards to.
//!
//! Balancer endpoints (JSON in, JSON out):
//!
//! - `GET /{request_id}` — route one id, answer with the worker's greeting
//! - `POST /add` — `{"worker_id": 4, "port": 5000}` registers a worker
//! - `POST /rm` — `{"worker_id": 4}` removes a worker
//! - `POST /bulk` — `{"request_ids": [1, 2, 3]}` routes many ids
//! - `GET /servers` — health report with per-worker counters
//!
//! Worker endpoints:
//!
//! - `GET /home` — greeting naming the worker
//! - `GET /heartbeat` — empty object while alive

mod error;
mod handlers;
mod worker;


use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use hashlb_router::Router as RequestRouter;
use hashlb_types::WorkerId;

pub use error::ApiError;
pub use worker::{UNKNOWN_SERVER_ID, WorkerServer};

/// Default template turning `/add` bodies into worker addresses.
pub const DEFAULT_ADDRESS_TEMPLATE: &str = "http://server{id}:{port}";

/// Shared application state for all balancer handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// The request router.
    pub router: Arc<RequestRouter>,
    /// Address template with `{id}` and `{port}` placeholders.
    pub address_template: Arc<str>,
}

impl AppState {
    /// Build the base URL for a worker added through `POST /add`.
    pub fn worker_address(&self, worker: WorkerId, port: u16) -> String {
        self.address_template
            .replace("{id}", &worker.get().to_string())
            .replace("{port}", &port.to_string())
    }
}

/// Configuration for creating a [`BalancerServer`].
pub struct BalancerConfig {
    /// The router to serve.
    pub router: Arc<RequestRouter>,
    /// Template for worker addresses, e.g. `http://server{id}:{port}`.
    pub address_template: String,
}

/// Load balancer HTTP server backed by a [`hashlb_router::Router`].
pub struct BalancerServer {
    router: Router,
}

impl BalancerServer {
    /// Create a new balancer server with the given configuration.
    pub fn new(config: BalancerConfig) -> Self {
        let state = AppState {
            router: config.router,
            address_template: config.address_template.into(),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the axum [`Router`] for the balancer API.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/add", post(handlers::add_worker))
            .route("/rm", post(handlers::remove_worker))
            .route("/bulk", post(handlers::bulk))
            .route("/servers", get(handlers::servers))
            // Static segments above take priority over the capture.
            .route("/{request_id}", get(handlers::forward))
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the balancer API on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "balancer listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    ///
    /// When `shutdown` completes, the server stops accepting new connections
    /// and waits for in-flight requests to finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "balancer listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
