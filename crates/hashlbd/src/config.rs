//! TOML configuration for the hashlb daemon.
//!
//! Every section is optional; a missing file or an empty one yields the
//! default three-worker deployment on port 6000.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use hashlb_router::RouterConfig;
use hashlb_types::{HashPolicy, WorkerId};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Listener and worker address derivation.
    pub balancer: BalancerSection,
    /// Ring geometry.
    pub ring: RingSection,
    /// Initial workers.
    pub workers: Vec<WorkerEntry>,
    /// Timeouts and fan-out.
    pub dispatch: DispatchSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[balancer]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BalancerSection {
    /// Address for the balancer HTTP API.
    pub listen_addr: String,
    /// Template for addresses of workers added at runtime.
    pub address_template: String,
}

impl Default for BalancerSection {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6000".to_string(),
            address_template: hashlb_http::DEFAULT_ADDRESS_TEMPLATE.to_string(),
        }
    }
}

/// `[ring]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RingSection {
    /// Number of slots on the ring.
    pub num_slots: usize,
    /// Virtual nodes per worker.
    pub virtual_servers: usize,
    /// `"linear"` or `"blake3"`.
    pub hash: HashPolicy,
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            num_slots: 512,
            virtual_servers: 9,
            hash: HashPolicy::Linear,
        }
    }
}

/// One `[[workers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerEntry {
    /// Worker id.
    pub id: u32,
    /// Worker base URL.
    pub address: String,
}

/// `[dispatch]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Forwarded request timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// Heartbeat probe timeout in milliseconds.
    pub heartbeat_timeout_ms: Option<u64>,
    /// Maximum in-flight routes per bulk request.
    pub bulk_concurrency: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective request timeout (default 5 s).
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.request_timeout_ms.unwrap_or(5_000))
    }

    /// Effective heartbeat timeout (default 2 s).
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.heartbeat_timeout_ms.unwrap_or(2_000))
    }

    /// Effective bulk fan-out (default 32).
    pub fn bulk_concurrency(&self) -> usize {
        self.dispatch.bulk_concurrency.unwrap_or(32)
    }

    /// Router settings derived from the `[ring]` and `[dispatch]` sections.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            num_slots: self.ring.num_slots,
            virtual_servers: self.ring.virtual_servers,
            policy: self.ring.hash,
            request_timeout: self.request_timeout(),
            heartbeat_timeout: self.heartbeat_timeout(),
            bulk_concurrency: self.bulk_concurrency(),
        }
    }

    /// Workers registered at startup.
    ///
    /// Falls back to servers 1 through 3 on port 5000 when none are listed.
    pub fn initial_workers(&self) -> Vec<(WorkerId, String)> {
        if self.workers.is_empty() {
            return (1..=3)
                .map(|n| (WorkerId::new(n), format!("http://server{n}:5000")))
                .collect();
        }
        self.workers
            .iter()
            .map(|w| (WorkerId::new(w.id), w.address.clone()))
            .collect()
    }
}

/// Parse a `--worker` flag of the form `<id>=<url>`.
pub fn parse_worker(s: &str) -> anyhow::Result<WorkerEntry> {
    let Some((id, address)) = s.split_once('=') else {
        bail!("expected <id>=<url>, got {s:?}");
    };
    let id: u32 = id
        .trim()
        .parse()
        .with_context(|| format!("invalid worker id in {s:?}"))?;
    let address = address.trim();
    if address.is_empty() {
        bail!("missing worker url in {s:?}");
    }
    Ok(WorkerEntry {
        id,
        address: address.to_string(),
    })
}
