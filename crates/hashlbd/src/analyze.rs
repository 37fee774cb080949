//! `hashlbd analyze`: measure how a running balancer spreads requests.
//!
//! Sends one bulk request with ids `0..count`, reads back the per-worker
//! counters and prints them as a text bar chart.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Width of the longest bar in the distribution table.
const BAR_WIDTH: usize = 40;

/// How many times to try, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    request_counts: BTreeMap<String, u64>,
}

/// Base URL for `host`, adding `http://` when no scheme is given.
fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

async fn post_bulk(
    client: &reqwest::Client,
    url: &str,
    request_ids: &[u64],
) -> Result<BTreeMap<String, u64>> {
    let response = client
        .post(url)
        .json(&json!({ "request_ids": request_ids }))
        .send()
        .await
        .context("bulk request failed")?;

    let status = response.status();
    if !status.is_success() {
        bail!("balancer answered with status {status}");
    }

    let body: BulkResponse = response
        .json()
        .await
        .context("invalid bulk response body")?;
    Ok(body.request_counts)
}

/// Post `request_ids` to the balancer's `/bulk` endpoint and return the
/// per-worker counters it reports.
///
/// Transport errors and non-2xx answers are retried according to `retry`.
/// When every attempt fails the result is empty.
pub async fn fetch_distribution(
    client: &reqwest::Client,
    host: &str,
    request_ids: &[u64],
    retry: RetryPolicy,
) -> BTreeMap<String, u64> {
    let url = format!("{}/bulk", base_url(host));
    let attempts = retry.max_attempts.max(1);

    for attempt in 1..=attempts {
        match post_bulk(client, &url, request_ids).await {
            Ok(counts) => {
                info!(attempt, workers = counts.len(), "bulk analysis complete");
                return counts;
            }
            Err(e) => {
                warn!(attempt, attempts, error = %format!("{e:#}"), "bulk attempt failed");
                if attempt < attempts {
                    tokio::time::sleep(retry.backoff).await;
                }
            }
        }
    }

    warn!(attempts, "giving up on bulk analysis");
    BTreeMap::new()
}

/// Render counters as a table with bars scaled to the busiest worker.
///
/// Rows are ordered by worker name. Returns a one-line notice when there is
/// nothing to show.
pub fn render_distribution(counts: &BTreeMap<String, u64>) -> String {
    if counts.is_empty() {
        return "No request counts to report\n".to_string();
    }

    let total: u64 = counts.values().sum();
    let max = counts.values().copied().max().unwrap_or(0);
    let name_width = counts.keys().map(String::len).max().unwrap_or(0);

    let mut out = String::new();
    for (name, &count) in counts {
        let bar = if max == 0 {
            0
        } else {
            (count as usize * BAR_WIDTH).div_ceil(max as usize)
        };
        let share = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        let _ = writeln!(
            out,
            "{name:<name_width$}  {count:>6}  {share:>5.1}%  {}",
            "#".repeat(bar)
        );
    }
    let _ = writeln!(out, "{:<name_width$}  {total:>6}", "total");
    out
}
