//! Error types for the router.

use hashlb_ring::RingError;
use hashlb_types::WorkerId;

/// Errors that can occur during routing and administration.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Ring construction or placement failed.
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    /// The router configuration cannot produce a usable ring.
    #[error("invalid router config: {0}")]
    InvalidConfig(String),

    /// A worker with this id is already registered.
    #[error("worker already registered: {0}")]
    DuplicateWorker(WorkerId),

    /// No worker with this id is registered.
    #[error("unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// The ring holds no workers.
    #[error("no servers available")]
    NoWorkersAvailable,

    /// The selected worker failed to answer in time.
    #[error("worker {worker} unreachable: {reason}")]
    WorkerUnreachable {
        /// The worker the request was routed to.
        worker: WorkerId,
        /// Transport failure or timeout description.
        reason: String,
    },
}

impl RouterError {
    /// Message safe to show an API client.
    ///
    /// Dispatch failures collapse to fixed strings so worker addresses and
    /// transport details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::NoWorkersAvailable => "No servers available".to_string(),
            Self::WorkerUnreachable { .. } => "Server error".to_string(),
            Self::UnknownWorker(_) => "Server not found".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors from talking to a single worker.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Build(String),

    /// The request never produced a response (connect, reset, timeout).
    #[error("request to {address} failed: {message}")]
    Request {
        /// Worker base URL.
        address: String,
        /// Underlying failure.
        message: String,
    },

    /// The worker answered with a non-success status.
    #[error("{address} answered with status {status}")]
    Status {
        /// Worker base URL.
        address: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not valid JSON.
    #[error("invalid response body from {address}: {message}")]
    Decode {
        /// Worker base URL.
        address: String,
        /// Decoder error.
        message: String,
    },
}
