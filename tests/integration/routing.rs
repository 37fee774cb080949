//! Integration test: routing properties across the ring and router.
//!
//! Determinism, minimal remapping on membership changes, and how each hash
//! policy spreads load.

use hashlb_integration_tests::TestCluster;
use hashlb_ring::HashRing;
use hashlb_router::RouterConfig;
use hashlb_types::{HashPolicy, WorkerId};

fn w(n: u32) -> WorkerId {
    WorkerId::new(n)
}

fn blake3_config() -> RouterConfig {
    RouterConfig {
        num_slots: 4096,
        virtual_servers: 32,
        policy: HashPolicy::Blake3,
        ..RouterConfig::default()
    }
}

/// Three workers on the default ring land where the linear formulas say.
#[tokio::test]
async fn test_default_layout_matches_known_positions() {
    let c = TestCluster::new(3).await;
    let ring = c.router().ring().await;

    assert_eq!(ring.occupied_count(), 27);
    assert_eq!(ring.worker_count(), 3);
    for j in 0..9 {
        assert_eq!(ring.owner_of(26 + 3 * j), Some(w(1)));
        assert_eq!(ring.owner_of(27 + 3 * j), Some(w(2)));
        assert_eq!(ring.owner_of(28 + 3 * j), Some(w(3)));
    }

    assert_eq!(c.owners([0, 1, 1000]).await, vec![Some(w(1)), Some(w(1)), Some(w(3))]);
}

/// Two routers built the same way agree on every key.
#[tokio::test]
async fn test_lookup_deterministic_across_routers() {
    for config in [RouterConfig::default(), blake3_config()] {
        let a = TestCluster::with_config(5, config.clone()).await;
        let b = TestCluster::with_config(5, config).await;
        assert_eq!(a.owners(0..5000).await, b.owners(0..5000).await);
    }
}

/// Adding a worker only moves keys onto that worker.
#[tokio::test]
async fn test_adding_worker_only_moves_keys_to_it() {
    for config in [RouterConfig::default(), blake3_config()] {
        let c = TestCluster::with_config(5, config).await;
        let before = c.router().ring().await;

        c.add_worker(6).await;
        let after = c.router().ring().await;

        let remaps = HashRing::diff(&before, &after, 0..10_000);
        assert!(!remaps.is_empty(), "a new worker should take some keys");
        for remap in &remaps {
            assert_eq!(remap.to, Some(w(6)), "key {} moved elsewhere", remap.key);
        }
    }
}

/// Removing a worker only moves the keys it owned.
#[tokio::test]
async fn test_removing_worker_only_moves_its_keys() {
    for config in [RouterConfig::default(), blake3_config()] {
        let c = TestCluster::with_config(5, config).await;
        let before = c.router().ring().await;

        c.router().remove_worker(w(3)).await.unwrap();
        let after = c.router().ring().await;

        for remap in HashRing::diff(&before, &after, 0..10_000) {
            assert_eq!(remap.from, Some(w(3)), "key {} was not on w3", remap.key);
            assert!(remap.to.is_some());
            assert_ne!(remap.to, Some(w(3)));
        }
    }
}

/// Adding then removing a worker restores every owner.
#[tokio::test]
async fn test_add_remove_restores_owners() {
    let c = TestCluster::with_config(4, blake3_config()).await;
    let before = c.owners(0..5000).await;

    c.add_worker(9).await;
    c.router().remove_worker(w(9)).await.unwrap();

    assert_eq!(c.owners(0..5000).await, before);
}

/// Every bulk result names the worker the ring resolves the id to.
#[tokio::test]
async fn test_route_bulk_matches_lookup() {
    let c = TestCluster::with_config(6, blake3_config()).await;
    let ids: Vec<u64> = (0..2000).collect();

    let report = c.router().route_bulk(&ids).await;
    let owners = c.owners(ids.iter().copied()).await;

    assert_eq!(report.results.len(), ids.len());
    for (result, owner) in report.results.iter().zip(owners) {
        assert!(result.is_success());
        assert_eq!(result.server(), owner);
    }
    assert_eq!(report.request_counts.values().sum::<u64>(), 2000);
}

/// Blake3 placement gives every worker a share of the traffic.
#[tokio::test]
async fn test_blake3_spreads_load() {
    let config = RouterConfig {
        num_slots: 8192,
        virtual_servers: 64,
        ..blake3_config()
    };
    let c = TestCluster::with_config(8, config).await;
    let ids: Vec<u64> = (0..4000).collect();

    let report = c.router().route_bulk(&ids).await;
    assert_eq!(report.request_counts.len(), 8);
    for (worker, count) in &report.request_counts {
        assert!(*count > 100, "{worker} only got {count} of 4000");
        assert!(*count < 1500, "{worker} got {count} of 4000");
    }
}

/// The linear formulas cluster every virtual node into slots 26..=52, so
/// everything outside that arc wraps to Server1.
#[tokio::test]
async fn test_linear_policy_favours_first_worker() {
    let c = TestCluster::new(3).await;
    let ids: Vec<u64> = (0..1000).collect();

    let report = c.router().route_bulk(&ids).await;
    let counts = &report.request_counts;

    assert_eq!(counts.values().sum::<u64>(), 1000);
    assert!(counts[&w(2)] <= 18);
    assert!(counts[&w(3)] <= 18);
    assert!(counts[&w(1)] >= 964);
}
