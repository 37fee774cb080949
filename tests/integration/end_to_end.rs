//! Integration test: real HTTP end to end.
//!
//! Stub workers and the balancer bind ephemeral local ports; the balancer
//! reaches the workers through `HttpWorkerClient` and tests drive it with
//! `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use hashlb_integration_tests::{RunningServer, spawn_balancer, spawn_worker};
use hashlb_router::{HttpWorkerClient, Router, RouterConfig};
use hashlb_types::WorkerId;
use serde_json::{Value, json};

/// Three live workers plus a balancer in front of them.
struct Deployment {
    workers: Vec<RunningServer>,
    balancer: RunningServer,
    router: Arc<Router>,
    http: reqwest::Client,
}

impl Deployment {
    async fn start(n: u32) -> Self {
        let mut workers = Vec::new();
        for i in 1..=n {
            workers.push(spawn_worker(&i.to_string()).await);
        }

        let config = RouterConfig {
            request_timeout: Duration::from_secs(2),
            heartbeat_timeout: Duration::from_secs(1),
            ..RouterConfig::default()
        };
        let client = HttpWorkerClient::new(config.request_timeout).unwrap();
        let router = Router::with_workers(
            config,
            Arc::new(client),
            workers
                .iter()
                .zip(1..)
                .map(|(server, i)| (WorkerId::new(i), server.url())),
        )
        .await
        .unwrap();
        let router = Arc::new(router);
        let balancer = spawn_balancer(Arc::clone(&router)).await;

        Self {
            workers,
            balancer,
            router,
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .http
            .get(format!("{}{path}", self.balancer.url()))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .http
            .post(format!("{}{path}", self.balancer.url()))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_forward_reaches_owning_worker() {
    let d = Deployment::start(3).await;

    let (status, body) = d.get("/0").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({ "message": "Hello from Server: 1", "status": "successful" })
    );

    let (status, body) = d.get("/1000").await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Hello from Server: 3");

    let (status, body) = d.get("/not-a-number").await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_bulk_over_http() {
    let d = Deployment::start(3).await;
    let ids: Vec<u64> = (0..300).collect();

    let (status, body) = d.post("/bulk", json!({ "request_ids": ids })).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "successful");

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 300);
    assert!(results.iter().all(|r| r["status"] == "successful"));
    assert_eq!(results[0]["server"], "Server1");

    let total: u64 = body["request_counts"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(total, 300);
    assert_eq!(d.router.request_counts().await.values().sum::<u64>(), 300);
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_servers_reports_live_workers() {
    let d = Deployment::start(3).await;
    d.get("/0").await;

    let (status, body) = d.get("/servers").await;
    assert_eq!(status, 200);
    assert_eq!(body["replica_count"], 3);
    assert_eq!(body["total_virtual_servers"], 27);
    for (i, worker) in d.workers.iter().enumerate() {
        let entry = &body["servers"][format!("Server{}", i + 1)];
        assert_eq!(entry["status"], "healthy");
        assert_eq!(entry["url"], worker.url());
    }
    assert_eq!(body["servers"]["Server1"]["request_count"], 1);
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_stopped_worker_is_unhealthy_and_unreachable() {
    let mut d = Deployment::start(3).await;

    // Stop Server3 before anything has connected to it.
    let server3 = d.workers.pop().unwrap();
    server3.stop().await;

    let (status, body) = d.get("/1000").await;
    assert_eq!(status, 503);
    assert_eq!(body, json!({ "message": "Server error", "status": "error" }));

    let (_, body) = d.get("/servers").await;
    assert_eq!(body["servers"]["Server3"]["status"], "unhealthy");
    assert_eq!(body["servers"]["Server1"]["status"], "healthy");
    assert_eq!(body["servers"]["Server3"]["request_count"], 0);

    // Removing it sends its keys elsewhere.
    let (status, _) = d.post("/rm", json!({ "worker_id": 3 })).await;
    assert_eq!(status, 200);
    let (status, _) = d.get("/1000").await;
    assert_eq!(status, 200);
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_admin_endpoints_over_http() {
    let d = Deployment::start(2).await;

    let (status, body) = d.post("/add", json!({ "worker_id": 7, "port": 5000 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Successfully added");
    assert_eq!(
        d.router.workers().await[&WorkerId::new(7)].address,
        "http://server7:5000"
    );

    let (status, _) = d.post("/add", json!({ "worker_id": 7, "port": 5000 })).await;
    assert_eq!(status, 409);

    let (status, body) = d.post("/rm", json!({ "worker_id": 7 })).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Successfully removed");

    let (status, body) = d.post("/rm", json!({ "worker_id": 7 })).await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Server not found");
}
