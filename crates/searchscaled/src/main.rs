//! searchscaled — the searchscale daemon.
//!
//! Runs next to one node of the search cluster and assembles:
//! - State store (redb)
//! - Mastership oracle (cluster manager lookup)
//! - Metrics fetcher + recommender
//! - Provisioner (command-backed)
//! - Control loop, recovery watchdog and policy watcher
//!
//! # Usage
//!
//! ```text
//! searchscaled run --config /etc/searchscale/policy.toml --data-dir /var/lib/searchscale
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use searchscale_cluster::{ClusterClient, ClusterMastership, MetricsFetcher, StaticMastership};
use searchscale_config::PolicyConfig;
use searchscale_control::{
    Collaborators, ControlLoop, FilePolicyLoader, MastershipOracle, RecoveryWatchdog,
    Tenure, run_policy_watcher,
};
use searchscale_provision::{CommandProvider, LiveInventory, Provisioner};
use searchscale_recommend::Recommender;
use searchscale_state::StateStore;

const DEFAULT_LOG_FILTER: &str = "info,searchscale=debug,searchscaled=debug";

#[derive(Parser)]
#[command(name = "searchscaled", about = "searchscale daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop and recovery watchdog until Ctrl-C.
    Run {
        /// Policy file (TOML); re-read on every tick.
        #[arg(long)]
        config: PathBuf,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/searchscale")]
        data_dir: PathBuf,

        /// Seconds between ticks of both loops.
        #[arg(long, default_value = "300")]
        polling_interval: u64,

        /// Upper bound in seconds for one provisioning call.
        #[arg(long, default_value = "1800")]
        provision_timeout: u64,

        /// Treat this process as master without asking the cluster.
        #[arg(long)]
        standalone: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Run {
            config,
            data_dir,
            polling_interval,
            provision_timeout,
            standalone,
        } => {
            run(
                config,
                data_dir,
                Duration::from_secs(polling_interval),
                Duration::from_secs(provision_timeout),
                standalone,
            )
            .await
        }
    }
}

async fn run(
    config: PathBuf,
    data_dir: PathBuf,
    interval: Duration,
    provision_timeout: Duration,
    standalone: bool,
) -> anyhow::Result<()> {
    info!(config = %config.display(), "searchscale daemon starting");

    // A broken policy at start-up is fatal; later it only skips ticks.
    let policy = PolicyConfig::from_file(&config)
        .with_context(|| format!("loading policy {}", config.display()))?;
    info!(
        cluster = %policy.cluster.name,
        endpoint = %policy.cluster.endpoint,
        tasks = policy.tasks.len(),
        "policy loaded"
    );

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join("searchscale.redb");
    let state = StateStore::open(&db_path)
        .with_context(|| format!("opening state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");

    // ── Collaborators ──────────────────────────────────────────

    let mastership: Arc<dyn MastershipOracle> = if standalone {
        info!("standalone mode; this process is always master");
        Arc::new(StaticMastership(true))
    } else {
        let client = ClusterClient::from_details(&policy.cluster);
        Arc::new(ClusterMastership::new(client, &policy.cluster.node_name))
    };

    let provisioner = Provisioner::new(
        state.clone(),
        Arc::new(CommandProvider::new()),
        Arc::new(LiveInventory),
    );

    let deps = Collaborators {
        state: Arc::new(state.clone()),
        mastership,
        policy: Arc::new(FilePolicyLoader::new(config.clone())),
        metrics: Arc::new(MetricsFetcher::new(state.clone())),
        recommender: Arc::new(Recommender::new(state)),
        executor: Arc::new(provisioner),
        tenure: Tenure::default(),
    };

    let control = ControlLoop::new(deps.clone()).with_provision_timeout(provision_timeout);
    let watchdog = RecoveryWatchdog::new(deps, false).with_provision_timeout(provision_timeout);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let control_shutdown = shutdown_rx.clone();
    let watchdog_shutdown = shutdown_rx.clone();
    let watcher_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let control_handle = tokio::spawn(async move {
        control.run(interval, control_shutdown).await;
    });

    let watchdog_handle = tokio::spawn(watchdog.run(interval, watchdog_shutdown));

    let watcher_handle = tokio::spawn(run_policy_watcher(config, watcher_shutdown));

    info!(
        interval_secs = interval.as_secs(),
        provision_timeout_secs = provision_timeout.as_secs(),
        "searchscale daemon running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // A provisioning call in flight finishes before its loop sees shutdown.
    let _ = control_handle.await;
    let _ = watchdog_handle.await;
    let _ = watcher_handle.await;

    info!("searchscale daemon stopped");
    Ok(())
}
