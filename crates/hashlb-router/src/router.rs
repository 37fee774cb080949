//! [`Router`], the dispatch façade tying ring, registry and transport together.
//!
//! The ring and the registry live in one `Topology` behind one lock, so a
//! reader never sees a worker that is on the ring but not registered (or the
//! reverse). Network calls happen after the lock is released.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hashlb_ring::HashRing;
use hashlb_types::{
    BulkOutcome, BulkReport, HashPolicy, HealthReport, Slot, WorkerHealth, WorkerId,
    WorkerSnapshot, WorkerStatus,
};
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::WorkerClient;
use crate::error::RouterError;
use crate::registry::WorkerRegistry;

/// Configuration for creating a [`Router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Ring size.
    pub num_slots: usize,
    /// Virtual nodes per worker.
    pub virtual_servers: usize,
    /// Placement and request hash functions.
    pub policy: HashPolicy,
    /// Upper bound on a forwarded request.
    pub request_timeout: Duration,
    /// Upper bound on a heartbeat probe.
    pub heartbeat_timeout: Duration,
    /// Maximum in-flight routes per bulk request.
    pub bulk_concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            num_slots: 512,
            virtual_servers: 9,
            policy: HashPolicy::Linear,
            request_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(2),
            bulk_concurrency: 32,
        }
    }
}

/// A request a worker answered.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    /// The worker that answered.
    pub worker: WorkerId,
    /// Its address.
    pub address: String,
    /// The worker's greeting payload.
    pub payload: Value,
}

/// Ring and registry, always mutated together.
#[derive(Debug)]
struct Topology {
    ring: HashRing,
    registry: WorkerRegistry,
}

/// Routes request ids to workers and keeps per-worker counters.
pub struct Router {
    topology: RwLock<Topology>,
    client: Arc<dyn WorkerClient>,
    config: RouterConfig,
}

impl Router {
    /// Create a router with an empty ring.
    pub fn new(config: RouterConfig, client: Arc<dyn WorkerClient>) -> Result<Self, RouterError> {
        if config.virtual_servers == 0 {
            return Err(RouterError::InvalidConfig(
                "virtual_servers must be at least 1".into(),
            ));
        }
        if config.virtual_servers > config.num_slots {
            return Err(RouterError::InvalidConfig(format!(
                "virtual_servers ({}) exceeds num_slots ({})",
                config.virtual_servers, config.num_slots
            )));
        }
        if config.bulk_concurrency == 0 {
            return Err(RouterError::InvalidConfig(
                "bulk_concurrency must be at least 1".into(),
            ));
        }

        let ring = HashRing::new(config.num_slots, config.policy)?;
        info!(
            num_slots = config.num_slots,
            virtual_servers = config.virtual_servers,
            policy = %config.policy,
            "router created"
        );

        Ok(Self {
            topology: RwLock::new(Topology {
                ring,
                registry: WorkerRegistry::new(),
            }),
            client,
            config,
        })
    }

    /// Create a router and register `workers` in order.
    pub async fn with_workers(
        config: RouterConfig,
        client: Arc<dyn WorkerClient>,
        workers: impl IntoIterator<Item = (WorkerId, String)>,
    ) -> Result<Self, RouterError> {
        let router = Self::new(config, client)?;
        for (worker, address) in workers {
            router.add_worker(worker, address).await?;
        }
        Ok(router)
    }

    /// Return the router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Register a worker with the configured number of virtual nodes.
    pub async fn add_worker(
        &self,
        worker: WorkerId,
        address: impl Into<String>,
    ) -> Result<Vec<Slot>, RouterError> {
        self.add_worker_with_replicas(worker, address, self.config.virtual_servers)
            .await
    }

    /// Register a worker with an explicit number of virtual nodes.
    ///
    /// The ring is updated first; if placement fails nothing is registered.
    pub async fn add_worker_with_replicas(
        &self,
        worker: WorkerId,
        address: impl Into<String>,
        replicas: usize,
    ) -> Result<Vec<Slot>, RouterError> {
        if replicas == 0 {
            return Err(RouterError::InvalidConfig(
                "a worker needs at least one virtual node".into(),
            ));
        }

        let address = address.into();
        let mut topology = self.topology.write().await;

        if topology.registry.contains(worker) {
            return Err(RouterError::DuplicateWorker(worker));
        }

        let slots = topology.ring.place(worker, replicas)?;
        if let Err(e) = topology.registry.add(worker, address.clone()) {
            // Unreachable while the duplicate check above holds, but never
            // leave slots behind for an unregistered worker.
            topology.ring.remove(worker);
            return Err(e);
        }

        info!(%worker, %address, replicas, "worker added");
        Ok(slots)
    }

    /// Remove a worker from the ring and the registry.
    pub async fn remove_worker(&self, worker: WorkerId) -> Result<(), RouterError> {
        let mut topology = self.topology.write().await;

        if !topology.registry.contains(worker) {
            return Err(RouterError::UnknownWorker(worker));
        }

        topology.ring.remove(worker);
        topology.registry.remove(worker)?;

        info!(%worker, "worker removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Route one request id to its worker and forward it.
    ///
    /// The worker's counter only moves when it actually answers.
    pub async fn route(&self, request_id: u64) -> Result<RouteOutcome, RouterError> {
        let (worker, target) = {
            let topology = self.topology.read().await;
            let worker = topology
                .ring
                .lookup(request_id)
                .ok_or(RouterError::NoWorkersAvailable)?;
            let target = topology
                .registry
                .dispatch_target(worker)
                .ok_or(RouterError::NoWorkersAvailable)?;
            (worker, target)
        };

        debug!(request_id, %worker, "routing request");

        let payload = match tokio::time::timeout(
            self.config.request_timeout,
            self.client.greet(&target.address),
        )
        .await
        {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                warn!(request_id, %worker, %e, "worker request failed");
                return Err(RouterError::WorkerUnreachable {
                    worker,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(request_id, %worker, "worker request timed out");
                return Err(RouterError::WorkerUnreachable {
                    worker,
                    reason: format!("timed out after {:?}", self.config.request_timeout),
                });
            }
        };

        // Counts against the registration this request was sent to, even if
        // the worker has been removed or re-added since.
        target.record_dispatch();

        Ok(RouteOutcome {
            worker,
            address: target.address,
            payload,
        })
    }

    /// Route every id independently, at most `bulk_concurrency` at a time.
    ///
    /// Returns one outcome per id in input order, followed by a counter
    /// snapshot taken once every route has finished. A failing id never
    /// affects the others. Failure messages are the client-facing ones from
    /// [`RouterError::client_message`].
    pub async fn route_bulk(self: &Arc<Self>, request_ids: &[u64]) -> BulkReport {
        let permits = Arc::new(Semaphore::new(self.config.bulk_concurrency));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<BulkOutcome>> = vec![None; request_ids.len()];

        for (index, &request_id) in request_ids.iter().enumerate() {
            // Spawn only under a held permit; finished tasks are reaped as
            // we go so the set never grows with the input.
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    slots[index] = Some(BulkOutcome::Error {
                        request_id,
                        message: "dispatch pool closed".into(),
                    });
                    continue;
                }
            };
            while let Some(joined) = tasks.try_join_next() {
                collect_bulk_outcome(&mut slots, joined);
            }

            let router = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = match router.route(request_id).await {
                    Ok(routed) => BulkOutcome::Successful {
                        request_id,
                        server: routed.worker,
                    },
                    Err(e) => BulkOutcome::Error {
                        request_id,
                        message: e.client_message(),
                    },
                };
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            collect_bulk_outcome(&mut slots, joined);
        }

        let results: Vec<BulkOutcome> = slots
            .into_iter()
            .zip(request_ids)
            .map(|(outcome, &request_id)| {
                outcome.unwrap_or_else(|| BulkOutcome::Error {
                    request_id,
                    message: "route task aborted".into(),
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(total = results.len(), succeeded, "bulk route complete");

        BulkReport {
            results,
            request_counts: self.request_counts().await,
        }
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Probe every registered worker and report its health and counter.
    ///
    /// Probes run concurrently and never change the registry.
    pub async fn health_report(&self) -> HealthReport {
        let (workers, total_virtual_servers) = {
            let topology = self.topology.read().await;
            (
                topology.registry.snapshot(),
                topology.ring.occupied_count(),
            )
        };

        let mut probes = JoinSet::new();
        for (worker, snapshot) in &workers {
            let worker = *worker;
            let address = snapshot.address.clone();
            let client = Arc::clone(&self.client);
            let timeout = self.config.heartbeat_timeout;
            probes.spawn(async move {
                let healthy = matches!(
                    tokio::time::timeout(timeout, client.heartbeat(&address)).await,
                    Ok(Ok(()))
                );
                (worker, healthy)
            });
        }

        let mut health: BTreeMap<WorkerId, WorkerHealth> = BTreeMap::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok((worker, healthy)) = joined {
                let status = if healthy {
                    WorkerHealth::Healthy
                } else {
                    warn!(%worker, "heartbeat failed");
                    WorkerHealth::Unhealthy
                };
                health.insert(worker, status);
            }
        }

        let replica_count = workers.len();
        let servers = workers
            .into_iter()
            .map(|(worker, snapshot)| {
                let status = health
                    .get(&worker)
                    .copied()
                    .unwrap_or(WorkerHealth::Unhealthy);
                (
                    worker,
                    WorkerStatus {
                        url: snapshot.address,
                        status,
                        request_count: snapshot.request_count,
                    },
                )
            })
            .collect();

        HealthReport {
            servers,
            replica_count,
            virtual_servers_per_replica: self.config.virtual_servers,
            total_virtual_servers,
        }
    }

    /// Current request counters, ordered by worker id.
    pub async fn request_counts(&self) -> BTreeMap<WorkerId, u64> {
        self.topology.read().await.registry.request_counts()
    }

    /// Point-in-time copy of the registry.
    pub async fn workers(&self) -> BTreeMap<WorkerId, WorkerSnapshot> {
        self.topology.read().await.registry.snapshot()
    }

    /// Return a clone of the current ring.
    pub async fn ring(&self) -> HashRing {
        self.topology.read().await.ring.clone()
    }

    /// Resolve a request id without forwarding it.
    pub async fn lookup(&self, request_id: u64) -> Option<WorkerId> {
        self.topology.read().await.ring.lookup(request_id)
    }
}

fn collect_bulk_outcome(
    slots: &mut [Option<BulkOutcome>],
    joined: Result<(usize, BulkOutcome), tokio::task::JoinError>,
) {
    match joined {
        Ok((index, outcome)) => slots[index] = Some(outcome),
        Err(e) => warn!(%e, "bulk route task failed"),
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
