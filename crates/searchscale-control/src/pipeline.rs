//! Seams between the control loops and the subsystems they drive.
//!
//! The loops only ever see these traits. Concrete implementations live in
//! `searchscale-cluster` (mastership, metrics), `searchscale-recommend`
//! and `searchscale-provision`; tests substitute recording stubs.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use searchscale_config::{ClusterDetails, ConfigResult, PolicyConfig};
use searchscale_state::{ClusterState, Family, StateResult, StateStore};

/// Boxed, sendable future returned by the async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A proposed scaling action, valid for a single decision cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    /// Policy task that produced it.
    pub task: String,
    pub direction: Family,
    pub nodes: u32,
}

/// Read access to the shared cluster state, plus the one write that
/// starts a new operation.
pub trait StateSource: Send + Sync {
    /// Fresh read of the cluster state. Never served from a cache.
    fn refresh_cluster_state(&self) -> BoxFuture<'_, StateResult<ClusterState>>;

    /// Compare-and-set `observed` (which must be idle) into the pending
    /// phase of `direction`.
    fn begin_operation<'a>(
        &'a self,
        observed: &'a ClusterState,
        direction: Family,
        task: &'a str,
        nodes: u32,
    ) -> BoxFuture<'a, StateResult<ClusterState>>;
}

/// Answers "is this process the elected coordinator right now?".
pub trait MastershipOracle: Send + Sync {
    fn is_master(&self) -> BoxFuture<'_, anyhow::Result<bool>>;
}

/// Supplies the current policy. Called on every decision, never cached.
pub trait PolicyLoader: Send + Sync {
    fn load_policy(&self) -> ConfigResult<PolicyConfig>;
}

/// Refreshes the metrics store for the cluster.
pub trait MetricsPipeline: Send + Sync {
    fn refresh_metrics<'a>(&'a self, cluster: &'a ClusterDetails) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Turns policy + stored metrics into an ordered list of actions.
pub trait RecommendationPipeline: Send + Sync {
    fn evaluate<'a>(
        &'a self,
        policy: &'a PolicyConfig,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Recommendation>>>;
}

/// Performs the infrastructure change for an operation already recorded
/// in `state`, and moves the state back to idle on success.
pub trait ProvisioningExecutor: Send + Sync {
    fn scale_out<'a>(&'a self, policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool>;

    fn scale_in<'a>(&'a self, policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool>;
}

/// Whether this process started an operation during its current
/// leadership tenure.
///
/// Shared by the control loop and the watchdog of one process. Set before
/// the idle → pending write, cleared whenever either loop observes that
/// this process is not master.
#[derive(Debug, Clone, Default)]
pub struct Tenure {
    started: Arc<AtomicBool>,
}

impl Tenure {
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}

/// Everything a control loop needs, shareable between tasks.
///
/// Clones share the same [`Tenure`]; give both loops of one process clones
/// of a single value.
#[derive(Clone)]
pub struct Collaborators {
    pub state: Arc<dyn StateSource>,
    pub mastership: Arc<dyn MastershipOracle>,
    pub policy: Arc<dyn PolicyLoader>,
    pub metrics: Arc<dyn MetricsPipeline>,
    pub recommender: Arc<dyn RecommendationPipeline>,
    pub executor: Arc<dyn ProvisioningExecutor>,
    pub tenure: Tenure,
}

impl Collaborators {
    /// Query the oracle, treating an error as "not master".
    ///
    /// A negative answer ends the current tenure.
    pub async fn is_master(&self) -> bool {
        let master = match self.mastership.is_master().await {
            Ok(master) => master,
            Err(e) => {
                warn!(error = %e, "mastership check failed; assuming not master");
                false
            }
        };
        if !master && self.tenure.started() {
            debug!("mastership lost; tenure ended");
            self.tenure.end();
        }
        master
    }
}

impl StateSource for StateStore {
    fn refresh_cluster_state(&self) -> BoxFuture<'_, StateResult<ClusterState>> {
        Box::pin(async move { self.get_cluster_state() })
    }

    fn begin_operation<'a>(
        &'a self,
        observed: &'a ClusterState,
        direction: Family,
        task: &'a str,
        nodes: u32,
    ) -> BoxFuture<'a, StateResult<ClusterState>> {
        Box::pin(async move { StateStore::begin_operation(self, observed, direction, task, nodes) })
    }
}

/// Loads the policy from a TOML file on every call.
#[derive(Debug, Clone)]
pub struct FilePolicyLoader {
    path: PathBuf,
}

impl FilePolicyLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PolicyLoader for FilePolicyLoader {
    fn load_policy(&self) -> ConfigResult<PolicyConfig> {
        PolicyConfig::from_file(&self.path)
    }
}
