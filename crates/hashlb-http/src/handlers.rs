//! Balancer request handlers.
//!
//! Bodies are parsed by hand rather than through axum's `Json` extractor so
//! that malformed input gets the same `{"message", "status"}` error shape as
//! every other failure.

use std::collections::BTreeMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::AppState;
use crate::error::ApiError;
use hashlb_types::{BulkOutcome, WorkerId};

/// Standard success body for admin calls.
fn successful(message: &str) -> Json<Value> {
    Json(json!({ "message": message, "status": "successful" }))
}

// -----------------------------------------------------------------------
// GET /{request_id}: forward one request
// -----------------------------------------------------------------------

/// Route one request id and relay the worker's greeting.
pub(crate) async fn forward(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id: u64 = request_id
        .parse()
        .map_err(|_| ApiError::invalid("Invalid request ID"))?;

    let outcome = state.router.route(request_id).await?;
    debug!(request_id, worker = %outcome.worker, "forwarded");
    Ok(Json(outcome.payload))
}

// -----------------------------------------------------------------------
// POST /add: register a worker
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddWorkerRequest {
    #[serde(alias = "server_id")]
    worker_id: u32,
    port: u16,
}

/// Register a worker at the address derived from its id and port.
pub(crate) async fn add_worker(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: AddWorkerRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid("Invalid request data"))?;

    let worker = WorkerId::new(req.worker_id);
    let address = state.worker_address(worker, req.port);
    let slots = state.router.add_worker(worker, address.clone()).await?;

    info!(%worker, %address, slots = slots.len(), "add_worker");
    Ok(successful("Successfully added"))
}

// -----------------------------------------------------------------------
// POST /rm: remove a worker
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RemoveWorkerRequest {
    #[serde(alias = "server_id")]
    worker_id: u32,
}

/// Remove a worker and its virtual nodes.
pub(crate) async fn remove_worker(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: RemoveWorkerRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid("Invalid request data"))?;

    let worker = WorkerId::new(req.worker_id);
    state.router.remove_worker(worker).await?;

    info!(%worker, "remove_worker");
    Ok(successful("Successfully removed"))
}

// -----------------------------------------------------------------------
// POST /bulk: route many ids
// -----------------------------------------------------------------------

/// One entry of the `results` array.
#[derive(Debug, Serialize)]
pub(crate) struct BulkItem {
    /// The id as the client sent it (may be invalid).
    request_id: Value,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<BulkOutcome> for BulkItem {
    fn from(outcome: BulkOutcome) -> Self {
        match outcome {
            BulkOutcome::Successful { request_id, server } => Self {
                request_id: request_id.into(),
                status: "successful",
                server: Some(server.name()),
                message: None,
            },
            BulkOutcome::Error {
                request_id,
                message,
            } => Self {
                request_id: request_id.into(),
                status: "error",
                server: None,
                message: Some(message),
            },
        }
    }
}

/// Route every id in `request_ids`; entries that are not non-negative
/// integers fail individually without touching the router.
pub(crate) async fn bulk(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let data: Value =
        serde_json::from_slice(&body).map_err(|_| ApiError::invalid("Invalid request data"))?;
    let raw_ids = data
        .get("request_ids")
        .ok_or_else(|| ApiError::invalid("Invalid request data"))?
        .as_array()
        .ok_or_else(|| ApiError::invalid("request_ids must be a list"))?;

    let valid: Vec<u64> = raw_ids.iter().filter_map(Value::as_u64).collect();
    let report = state.router.route_bulk(&valid).await;

    let mut routed = report.results.into_iter();
    let mut results = Vec::with_capacity(raw_ids.len());
    for raw in raw_ids {
        // Routed outcomes come back in the same order the valid ids went in.
        let outcome = raw.as_u64().and_then(|_| routed.next());
        let item = match outcome {
            Some(outcome) => BulkItem::from(outcome),
            None => BulkItem {
                request_id: raw.clone(),
                status: "error",
                server: None,
                message: Some("Invalid request ID".into()),
            },
        };
        results.push(item);
    }

    let request_counts: BTreeMap<String, u64> = report
        .request_counts
        .into_iter()
        .map(|(worker, count)| (worker.name(), count))
        .collect();

    info!(total = results.len(), "bulk");
    Ok(Json(json!({
        "results": results,
        "request_counts": request_counts,
        "status": "successful",
    })))
}

// -----------------------------------------------------------------------
// GET /servers: health report
// -----------------------------------------------------------------------

/// Probe every worker and report health, counters and ring totals.
pub(crate) async fn servers(State(state): State<AppState>) -> Json<Value> {
    let report = state.router.health_report().await;

    let servers: BTreeMap<String, Value> = report
        .servers
        .iter()
        .map(|(worker, status)| {
            (
                worker.name(),
                json!({
                    "url": status.url,
                    "status": status.status,
                    "request_count": status.request_count,
                }),
            )
        })
        .collect();

    Json(json!({
        "servers": servers,
        "replica_count": report.replica_count,
        "virtual_servers_per_replica": report.virtual_servers_per_replica,
        "total_virtual_servers": report.total_virtual_servers,
        "status": "successful",
    }))
}
