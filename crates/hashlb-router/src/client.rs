//! Worker-facing transport.
//!
//! A worker exposes two endpoints: `GET /home` answers with an identifying
//! greeting and `GET /heartbeat` answers with an empty body while the worker
//! is alive. Neither carries state.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;

/// Trait abstracting the calls the router makes to a worker.
///
/// This allows substituting an in-process client in tests (avoiding the
/// need for real worker processes and network access).
#[async_trait::async_trait]
pub trait WorkerClient: Send + Sync {
    /// Forward a request to the worker's greeting endpoint.
    async fn greet(&self, address: &str) -> Result<Value, ClientError>;

    /// Probe the worker's liveness endpoint.
    async fn heartbeat(&self, address: &str) -> Result<(), ClientError>;
}

/// [`WorkerClient`] speaking JSON over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    /// Create a client whose requests are cut off after `timeout`.
    ///
    /// The router wraps every call in its own timeout as well; this one
    /// stops the underlying connection from lingering after the router has
    /// given up.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get(&self, address: &str, path: &str) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{path}", address.trim_end_matches('/'));
        debug!(%url, "calling worker");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Request {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn greet(&self, address: &str) -> Result<Value, ClientError> {
        self.get(address, "/home")
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ClientError::Decode {
                address: address.to_string(),
                message: e.to_string(),
            })
    }

    async fn heartbeat(&self, address: &str) -> Result<(), ClientError> {
        self.get(address, "/heartbeat").await?;
        Ok(())
    }
}
