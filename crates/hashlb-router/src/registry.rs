//! Worker registry: addresses and live request counters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashlb_types::{WorkerId, WorkerSnapshot};

use crate::error::RouterError;

#[derive(Debug)]
struct WorkerEntry {
    address: String,
    request_count: Arc<AtomicU64>,
}

/// Where to send one request, and the counter credited with its answer.
///
/// The counter belongs to the registration that was current when the
/// target was taken. Once that worker is removed, bumping it changes
/// nothing visible, even if the same id has been registered again.
#[derive(Debug, Clone)]
pub struct DispatchTarget {
    /// Worker base URL.
    pub address: String,
    request_count: Arc<AtomicU64>,
}

impl DispatchTarget {
    /// Count one answered request.
    pub fn record_dispatch(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mapping from worker id to its address and request counter.
///
/// Entries are only added or removed by the [`Router`](crate::Router), which
/// keeps them in step with the ring. Counters are shared atomics so a
/// dispatch can bump one after the lock is released.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<WorkerId, WorkerEntry>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker with a zero request count.
    pub fn add(&mut self, worker: WorkerId, address: impl Into<String>) -> Result<(), RouterError> {
        if self.workers.contains_key(&worker) {
            return Err(RouterError::DuplicateWorker(worker));
        }
        self.workers.insert(
            worker,
            WorkerEntry {
                address: address.into(),
                request_count: Arc::new(AtomicU64::new(0)),
            },
        );
        Ok(())
    }

    /// Drop a worker and its counter.
    pub fn remove(&mut self, worker: WorkerId) -> Result<(), RouterError> {
        self.workers
            .remove(&worker)
            .map(|_| ())
            .ok_or(RouterError::UnknownWorker(worker))
    }

    /// Count one answered request for `worker`. Unknown workers are ignored.
    pub fn record_dispatch(&self, worker: WorkerId) {
        if let Some(entry) = self.workers.get(&worker) {
            entry.request_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Address and counter handle of `worker`, if registered.
    pub fn dispatch_target(&self, worker: WorkerId) -> Option<DispatchTarget> {
        self.workers.get(&worker).map(|e| DispatchTarget {
            address: e.address.clone(),
            request_count: Arc::clone(&e.request_count),
        })
    }

    /// Address of `worker`, if registered.
    pub fn address_of(&self, worker: WorkerId) -> Option<&str> {
        self.workers.get(&worker).map(|e| e.address.as_str())
    }

    /// Current request count of `worker`, if registered.
    pub fn request_count(&self, worker: WorkerId) -> Option<u64> {
        self.workers
            .get(&worker)
            .map(|e| e.request_count.load(Ordering::Relaxed))
    }

    /// Whether `worker` is registered.
    pub fn contains(&self, worker: WorkerId) -> bool {
        self.workers.contains_key(&worker)
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Point-in-time copy of every entry, ordered by worker id.
    pub fn snapshot(&self) -> BTreeMap<WorkerId, WorkerSnapshot> {
        self.workers
            .iter()
            .map(|(id, entry)| {
                (
                    *id,
                    WorkerSnapshot {
                        address: entry.address.clone(),
                        request_count: entry.request_count.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Request counts only, ordered by worker id.
    pub fn request_counts(&self) -> BTreeMap<WorkerId, u64> {
        self.workers
            .iter()
            .map(|(id, entry)| (*id, entry.request_count.load(Ordering::Relaxed)))
            .collect()
    }
}
