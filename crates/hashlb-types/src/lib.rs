//! Shared types and identifiers for hashlb.
//!
//! This crate defines the types used across the hashlb workspace:
//! identifiers ([`WorkerId`], [`Slot`]), the ring hashing policy
//! ([`HashPolicy`]), and the reporting structures handed out by the router
//! ([`WorkerSnapshot`], [`WorkerHealth`], [`HealthReport`], [`BulkReport`]).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// An address in the fixed-size ring keyspace, always in `[0, num_slots)`.
pub type Slot = usize;

/// Identifier for a physical backend worker.
///
/// Workers are numbered by the operator (the default deployment uses
/// `1..=3`). The numeric value feeds the linear virtual-node formula, so it
/// is part of the placement contract, not just a label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Wrap a raw worker number.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw worker number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Report name for this worker, e.g. `Server3`.
    pub fn name(self) -> String {
        self.to_string()
    }
}

impl From<u32> for WorkerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server{}", self.0)
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ring policy
// ---------------------------------------------------------------------------

/// Hash functions used to place virtual nodes and to locate requests.
///
/// Both policies share the same probing, removal and lookup logic; they only
/// differ in where a virtual node or a request key first lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// `Φ(w, j) = w + 3j + 25` and `H(k) = 3k + 2172`, both mod `num_slots`.
    ///
    /// Collision-prone on purpose: neighbouring workers land on neighbouring
    /// slots, which keeps the probing path busy.
    #[default]
    Linear,
    /// First 8 bytes of `blake3("<w>:<j>")` and `blake3(k)`, mod `num_slots`.
    Blake3,
}

impl fmt::Display for HashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("linear"),
            Self::Blake3 => f.write_str("blake3"),
        }
    }
}

impl FromStr for HashPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unknown hash policy {other:?} (expected \"linear\" or \"blake3\")"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Read-only view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Base URL the worker answers on.
    pub address: String,
    /// Requests this worker answered successfully.
    pub request_count: u64,
}

/// Liveness classification from a heartbeat probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    /// The probe answered before the timeout.
    Healthy,
    /// The probe failed or timed out.
    Unhealthy,
}

/// Health of a single worker, as reported by `GET /servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Base URL the worker answers on.
    pub url: String,
    /// Probe result.
    pub status: WorkerHealth,
    /// Requests this worker answered successfully.
    pub request_count: u64,
}

/// Aggregate health report over every registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Per-worker status.
    pub servers: BTreeMap<WorkerId, WorkerStatus>,
    /// Number of registered workers.
    pub replica_count: usize,
    /// Virtual nodes each worker owns.
    pub virtual_servers_per_replica: usize,
    /// Virtual nodes across all workers.
    pub total_virtual_servers: usize,
}

impl HealthReport {
    /// Number of workers classified healthy.
    pub fn healthy_count(&self) -> usize {
        self.servers
            .values()
            .filter(|s| s.status == WorkerHealth::Healthy)
            .count()
    }
}

/// Outcome of routing one id inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BulkOutcome {
    /// A worker answered.
    Successful {
        /// The request id that was routed.
        request_id: u64,
        /// The worker that answered.
        server: WorkerId,
    },
    /// Routing failed for this id only.
    Error {
        /// The request id that was routed.
        request_id: u64,
        /// Why this id failed.
        message: String,
    },
}

impl BulkOutcome {
    /// The request id this outcome belongs to.
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Successful { request_id, .. } | Self::Error { request_id, .. } => *request_id,
        }
    }

    /// The worker that answered, if any.
    pub fn server(&self) -> Option<WorkerId> {
        match self {
            Self::Successful { server, .. } => Some(*server),
            Self::Error { .. } => None,
        }
    }

    /// Whether a worker answered.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Successful { .. })
    }
}

/// Result of a bulk dispatch: per-id outcomes plus a counter snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// One outcome per requested id, in input order.
    pub results: Vec<BulkOutcome>,
    /// Request counters after the batch finished.
    pub request_counts: BTreeMap<WorkerId, u64>,
}
