//! Shared test harness for hashlb integration tests.
//!
//! Provides [`TestCluster`], a router over N in-process workers with
//! failure injection, and helpers that bind real worker and balancer
//! servers on ephemeral ports.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hashlb_http::{BalancerConfig, BalancerServer, DEFAULT_ADDRESS_TEMPLATE, WorkerServer};
use hashlb_router::{ClientError, Router, RouterConfig, WorkerClient};
use hashlb_types::WorkerId;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

// =========================================================================
// Mock worker client
// =========================================================================

/// Worker client that answers in-process.
///
/// Supports failure injection: addresses in `down` refuse every call.
#[derive(Default)]
pub struct MockWorkerClient {
    down: RwLock<HashSet<String>>,
}

impl MockWorkerClient {
    async fn check(&self, address: &str) -> Result<(), ClientError> {
        if self.down.read().await.contains(address) {
            return Err(ClientError::Request {
                address: address.to_string(),
                message: "worker is down".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerClient for MockWorkerClient {
    async fn greet(&self, address: &str) -> Result<Value, ClientError> {
        self.check(address).await?;
        Ok(json!({ "message": format!("Hello from {address}"), "status": "successful" }))
    }

    async fn heartbeat(&self, address: &str) -> Result<(), ClientError> {
        self.check(address).await
    }
}

// =========================================================================
// TestCluster
// =========================================================================

/// Address the harness assigns to worker `n`.
pub fn worker_address(n: u32) -> String {
    format!("http://server{n}:5000")
}

/// A router with workers `1..=n` behind a [`MockWorkerClient`].
pub struct TestCluster {
    router: Arc<Router>,
    client: Arc<MockWorkerClient>,
}

impl TestCluster {
    /// Default ring geometry with `n` workers.
    pub async fn new(n: u32) -> Self {
        Self::with_config(n, RouterConfig::default()).await
    }

    /// Custom ring geometry with `n` workers.
    pub async fn with_config(n: u32, config: RouterConfig) -> Self {
        let config = RouterConfig {
            request_timeout: Duration::from_millis(500),
            heartbeat_timeout: Duration::from_millis(500),
            ..config
        };
        let client = Arc::new(MockWorkerClient::default());
        let router = Router::with_workers(
            config,
            client.clone(),
            (1..=n).map(|i| (WorkerId::new(i), worker_address(i))),
        )
        .await
        .expect("cluster should fit on the ring");

        Self {
            router: Arc::new(router),
            client,
        }
    }

    /// The shared router.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Make worker `n` refuse every call.
    pub async fn kill_worker(&self, n: u32) {
        self.client.down.write().await.insert(worker_address(n));
    }

    /// Bring worker `n` back.
    pub async fn revive_worker(&self, n: u32) {
        self.client.down.write().await.remove(&worker_address(n));
    }

    /// Register worker `n` at its harness address.
    pub async fn add_worker(&self, n: u32) {
        self.router
            .add_worker(WorkerId::new(n), worker_address(n))
            .await
            .expect("add_worker should succeed");
    }

    /// Resolve every id in `ids` without forwarding.
    pub async fn owners(&self, ids: impl IntoIterator<Item = u64>) -> Vec<Option<WorkerId>> {
        let ring = self.router.ring().await;
        ids.into_iter().map(|id| ring.lookup(id)).collect()
    }
}

// =========================================================================
// Real servers
// =========================================================================

/// A server running on an ephemeral local port.
pub struct RunningServer {
    /// Bound address.
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RunningServer {
    /// Base URL, e.g. `http://127.0.0.1:40123`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the server; its port refuses connections afterwards.
    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

async fn spawn_router(app: axum::Router) -> RunningServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    RunningServer { addr, handle }
}

/// Start a stub worker introducing itself as `server_id`.
pub async fn spawn_worker(server_id: &str) -> RunningServer {
    spawn_router(WorkerServer::new(server_id).into_router()).await
}

/// Start a balancer serving `router`.
pub async fn spawn_balancer(router: Arc<Router>) -> RunningServer {
    let server = BalancerServer::new(BalancerConfig {
        router,
        address_template: DEFAULT_ADDRESS_TEMPLATE.to_string(),
    });
    spawn_router(server.into_router()).await
}
