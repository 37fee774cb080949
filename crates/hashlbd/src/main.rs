//! `hashlbd` — the hashlb daemon.
//!
//! One binary for every role in a deployment: the balancer itself, the stub
//! workers behind it, and a client that measures how requests spread.
//!
//! # Usage
//!
//! ```text
//! hashlbd start                                 # balancer on 0.0.0.0:6000
//! hashlbd start -c hashlb.toml                  # with a config file
//! hashlbd start --worker 1=http://127.0.0.1:5001 --worker 2=http://127.0.0.1:5002
//! hashlbd worker --id 1 --listen 0.0.0.0:5001   # stub worker
//! hashlbd analyze --host localhost:6000         # request distribution
//! hashlbd ring --probe 0 --probe 1000           # dump ring layout offline
//! ```

mod analyze;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hashlb_http::{BalancerConfig, BalancerServer, WorkerServer};
use hashlb_ring::HashRing;
use hashlb_router::{HttpWorkerClient, Router};
use hashlb_types::HashPolicy;
use tracing::{info, warn};

use analyze::RetryPolicy;
use config::{CliConfig, WorkerEntry};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "hashlbd",
    version,
    about = "Consistent-hashing load balancer daemon"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the load balancer.
    Start(StartArgs),

    /// Run a stub backend worker.
    Worker {
        /// Identifier reported by `/home`.
        #[arg(long, env = "SERVER_ID", default_value = hashlb_http::UNKNOWN_SERVER_ID)]
        id: String,

        /// Listen address.
        #[arg(short, long, default_value = "0.0.0.0:5000")]
        listen: String,
    },

    /// Send a bulk request to a running balancer and print the distribution.
    Analyze {
        /// Balancer host, e.g. `localhost:6000`.
        #[arg(long, default_value = "localhost:6000")]
        host: String,

        /// Number of request ids to send (ids `0..count`).
        #[arg(short = 'n', long, default_value = "1000")]
        count: u64,

        /// Total attempts before giving up.
        #[arg(long, default_value = "3")]
        retries: u32,

        /// Pause between attempts in milliseconds.
        #[arg(long, default_value = "2000")]
        backoff_ms: u64,

        /// Per-attempt timeout in seconds.
        #[arg(long, default_value = "500")]
        timeout_secs: u64,
    },

    /// Print the ring layout the current configuration produces.
    Ring {
        /// Request ids to resolve against the ring.
        #[arg(short, long)]
        probe: Vec<u64>,
    },
}

/// Overrides for `hashlbd start`.
#[derive(Args, Debug)]
struct StartArgs {
    /// Override listen address (e.g. "127.0.0.1:6000").
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the number of ring slots.
    #[arg(long)]
    slots: Option<usize>,

    /// Override virtual nodes per worker.
    #[arg(long)]
    virtual_servers: Option<usize>,

    /// Override the hash policy (`linear` or `blake3`).
    #[arg(long)]
    hash: Option<HashPolicy>,

    /// Initial worker as `<id>=<url>`. Can be specified multiple times;
    /// replaces the configured worker list.
    #[arg(short, long, value_parser = parse_worker_arg)]
    worker: Vec<WorkerEntry>,
}

fn parse_worker_arg(s: &str) -> Result<WorkerEntry, String> {
    config::parse_worker(s).map_err(|e| format!("{e:#}"))
}

impl StartArgs {
    /// CLI args override config file values.
    fn apply(self, config: &mut CliConfig) {
        if let Some(addr) = self.listen {
            config.balancer.listen_addr = addr;
        }
        if let Some(slots) = self.slots {
            config.ring.num_slots = slots;
        }
        if let Some(k) = self.virtual_servers {
            config.ring.virtual_servers = k;
        }
        if let Some(hash) = self.hash {
            config.ring.hash = hash;
        }
        if !self.worker.is_empty() {
            config.workers = self.worker;
        }
    }
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start(args) => {
            args.apply(&mut config);
            cmd_start(config).await
        }
        Commands::Worker { id, listen } => cmd_worker(id, listen).await,
        Commands::Analyze {
            host,
            count,
            retries,
            backoff_ms,
            timeout_secs,
        } => {
            let retry = RetryPolicy {
                max_attempts: retries,
                backoff: Duration::from_millis(backoff_ms),
            };
            cmd_analyze(&host, count, retry, Duration::from_secs(timeout_secs)).await
        }
        Commands::Ring { probe } => cmd_ring(&config, &probe),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// -----------------------------------------------------------------------
// hashlbd start
// -----------------------------------------------------------------------

/// Build the router described by `config` and register its initial workers.
async fn build_router(config: &CliConfig) -> Result<Arc<Router>> {
    let client = HttpWorkerClient::new(config.request_timeout())
        .context("failed to create worker client")?;
    let router = Router::with_workers(
        config.router_config(),
        Arc::new(client),
        config.initial_workers(),
    )
    .await
    .context("failed to initialize router")?;
    Ok(Arc::new(router))
}

async fn cmd_start(config: CliConfig) -> Result<()> {
    info!("starting hashlbd");
    info!(
        listen = %config.balancer.listen_addr,
        num_slots = config.ring.num_slots,
        virtual_servers = config.ring.virtual_servers,
        hash = %config.ring.hash,
        bulk_concurrency = config.bulk_concurrency(),
        "balancer configuration"
    );

    let router = build_router(&config).await?;
    for (worker, snapshot) in router.workers().await {
        info!(%worker, address = %snapshot.address, "initial worker");
    }

    let server = BalancerServer::new(BalancerConfig {
        router,
        address_template: config.balancer.address_template.clone(),
    });

    server
        .serve_with_shutdown(&config.balancer.listen_addr, shutdown_signal())
        .await
        .context("balancer server failed")?;

    info!("balancer stopped");
    Ok(())
}

// -----------------------------------------------------------------------
// hashlbd worker
// -----------------------------------------------------------------------

async fn cmd_worker(id: String, listen: String) -> Result<()> {
    info!(server_id = %id, %listen, "starting worker");
    WorkerServer::new(id)
        .serve_with_shutdown(&listen, shutdown_signal())
        .await
        .context("worker server failed")?;
    Ok(())
}

// -----------------------------------------------------------------------
// hashlbd analyze
// -----------------------------------------------------------------------

async fn cmd_analyze(host: &str, count: u64, retry: RetryPolicy, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to create http client")?;

    let request_ids: Vec<u64> = (0..count).collect();
    println!("Sending {count} requests to {host}...");

    let counts = analyze::fetch_distribution(&client, host, &request_ids, retry).await;
    if counts.is_empty() {
        println!(
            "Failed to fetch request counts after {} attempts",
            retry.max_attempts
        );
    }
    print!("{}", analyze::render_distribution(&counts));
    Ok(())
}

// -----------------------------------------------------------------------
// hashlbd ring
// -----------------------------------------------------------------------

/// Render the ring built from `config` without contacting any worker.
fn describe_ring(config: &CliConfig, probes: &[u64]) -> Result<String> {
    use std::fmt::Write as _;

    let mut ring = HashRing::new(config.ring.num_slots, config.ring.hash)
        .context("failed to create ring")?;
    for (worker, _) in config.initial_workers() {
        ring.place(worker, config.ring.virtual_servers)
            .with_context(|| format!("failed to place {worker}"))?;
    }

    let mut out = String::new();
    writeln!(
        out,
        "ring: {} slots, {} occupied, hash={}",
        ring.num_slots(),
        ring.occupied_count(),
        ring.policy()
    )?;
    for worker in ring.worker_ids() {
        let slots = ring.slots_of(worker).unwrap_or_default();
        let slots: Vec<String> = slots.iter().map(ToString::to_string).collect();
        writeln!(out, "  {worker}: {}", slots.join(" "))?;
    }
    for &id in probes {
        let owner = ring
            .lookup(id)
            .map_or_else(|| "-".to_string(), |w| w.to_string());
        writeln!(out, "  request {id} -> slot {} -> {owner}", ring.request_slot(id))?;
    }
    Ok(out)
}

fn cmd_ring(config: &CliConfig, probes: &[u64]) -> Result<()> {
    print!("{}", describe_ring(config, probes)?);
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
