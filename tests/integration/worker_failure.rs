//! Integration test: worker failure.
//!
//! Dead workers stay on the ring until removed; only their own requests
//! fail, and their counters stay put.

use hashlb_integration_tests::TestCluster;
use hashlb_router::{RouterConfig, RouterError};
use hashlb_types::{HashPolicy, WorkerHealth, WorkerId};

fn w(n: u32) -> WorkerId {
    WorkerId::new(n)
}

fn spread_config() -> RouterConfig {
    RouterConfig {
        num_slots: 2048,
        virtual_servers: 32,
        policy: HashPolicy::Blake3,
        ..RouterConfig::default()
    }
}

/// Requests owned by a dead worker fail; everything else succeeds.
#[tokio::test]
async fn test_dead_worker_fails_only_its_requests() {
    let c = TestCluster::with_config(4, spread_config()).await;
    c.kill_worker(2).await;

    let owners = c.owners(0..400).await;
    for (id, owner) in (0..400u64).zip(owners) {
        let result = c.router().route(id).await;
        if owner == Some(w(2)) {
            assert!(
                matches!(result, Err(RouterError::WorkerUnreachable { worker, .. }) if worker == w(2)),
                "request {id} should fail on the dead worker"
            );
        } else {
            assert_eq!(result.unwrap().worker, owner.unwrap());
        }
    }

    let counts = c.router().request_counts().await;
    assert_eq!(counts[&w(2)], 0);
    assert!(counts[&w(1)] > 0);
}

/// A revived worker answers again without re-registration.
#[tokio::test]
async fn test_revived_worker_answers() {
    let c = TestCluster::new(3).await;
    c.kill_worker(1).await;
    assert!(c.router().route(0).await.is_err());

    c.revive_worker(1).await;
    let outcome = c.router().route(0).await.unwrap();
    assert_eq!(outcome.worker, w(1));
    assert_eq!(c.router().request_counts().await[&w(1)], 1);
}

/// Health probes flag the dead worker but never evict it.
#[tokio::test]
async fn test_health_report_keeps_dead_worker() {
    let c = TestCluster::new(3).await;
    c.kill_worker(3).await;

    let report = c.router().health_report().await;
    assert_eq!(report.replica_count, 3);
    assert_eq!(report.healthy_count(), 2);
    assert_eq!(report.servers[&w(3)].status, WorkerHealth::Unhealthy);
    assert_eq!(report.total_virtual_servers, 27);

    assert!(c.router().ring().await.contains(w(3)));
    assert_eq!(c.owners([1000]).await, vec![Some(w(3))]);
}

/// Bulk routing isolates failures to the dead worker's ids.
#[tokio::test]
async fn test_bulk_with_dead_worker() {
    let c = TestCluster::with_config(5, spread_config()).await;
    c.kill_worker(4).await;

    let ids: Vec<u64> = (0..1000).collect();
    let owners = c.owners(ids.iter().copied()).await;
    let report = c.router().route_bulk(&ids).await;

    let mut failed = 0;
    for ((result, owner), id) in report.results.iter().zip(&owners).zip(&ids) {
        assert_eq!(result.request_id(), *id);
        if *owner == Some(w(4)) {
            assert!(!result.is_success());
            failed += 1;
        } else {
            assert!(result.is_success());
        }
    }
    assert!(failed > 0);
    assert_eq!(report.request_counts[&w(4)], 0);
    assert_eq!(
        report.request_counts.values().sum::<u64>(),
        1000 - failed as u64
    );
}

/// Removing a dead worker moves its keys to live ones.
#[tokio::test]
async fn test_removing_dead_worker_recovers_its_keys() {
    let c = TestCluster::new(3).await;
    c.kill_worker(3).await;
    assert!(c.router().route(1000).await.is_err());

    c.router().remove_worker(w(3)).await.unwrap();
    let outcome = c.router().route(1000).await.unwrap();
    assert_ne!(outcome.worker, w(3));
    assert!(!c.router().request_counts().await.contains_key(&w(3)));
}

/// With every worker down nothing is counted.
#[tokio::test]
async fn test_all_workers_down() {
    let c = TestCluster::new(3).await;
    for n in 1..=3 {
        c.kill_worker(n).await;
    }

    let ids: Vec<u64> = (0..50).collect();
    let report = c.router().route_bulk(&ids).await;
    assert!(report.results.iter().all(|r| !r.is_success()));
    assert!(report.request_counts.values().all(|&n| n == 0));

    let health = c.router().health_report().await;
    assert_eq!(health.healthy_count(), 0);
}
