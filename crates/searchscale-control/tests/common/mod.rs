//! Recording stubs for the control-plane seams.
//!
//! State is a real in-memory `StateStore`; everything else counts calls and
//! answers whatever the test scripted.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use searchscale_config::{ClusterDetails, ConfigError, ConfigResult, PolicyConfig};
use searchscale_control::{
    BoxFuture, Collaborators, MastershipOracle, MetricsPipeline, PolicyLoader,
    ProvisioningExecutor, Recommendation, RecommendationPipeline, StateSource, Tenure,
};
use searchscale_state::{ClusterState, Family, Phase, StateError, StateResult, StateStore};

pub const POLICY: &str = r#"
[cluster]
name = "search-test"
node_name = "node-1"
endpoint = "127.0.0.1:9200"
min_nodes = 1
max_nodes = 5

[cluster.credentials]
username = "admin"
password = "admin"

[provision]
scale_out_command = ["true"]
scale_in_command = ["true"]

[[tasks]]
name = "scale_up_by_1"

[[tasks.rules]]
metric = "cpu"
stat = "avg"
limit = 80.0
decision_period = "5m"
"#;

// ── Mastership ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct FlagMastership {
    master: AtomicBool,
    broken: AtomicBool,
    pub calls: AtomicUsize,
}

impl FlagMastership {
    pub fn set(&self, master: bool) {
        self.master.store(master, Ordering::SeqCst);
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

impl MastershipOracle for FlagMastership {
    fn is_master(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let broken = self.broken.load(Ordering::SeqCst);
        let master = self.master.load(Ordering::SeqCst);
        Box::pin(async move {
            if broken {
                anyhow::bail!("cluster unreachable");
            }
            Ok(master)
        })
    }
}

// ── Policy ─────────────────────────────────────────────────────────

pub struct SwitchPolicy {
    valid: AtomicBool,
    pub loads: AtomicUsize,
}

impl SwitchPolicy {
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl Default for SwitchPolicy {
    fn default() -> Self {
        Self {
            valid: AtomicBool::new(true),
            loads: AtomicUsize::new(0),
        }
    }
}

impl PolicyLoader for SwitchPolicy {
    fn load_policy(&self) -> ConfigResult<PolicyConfig> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.valid.load(Ordering::SeqCst) {
            PolicyConfig::parse(POLICY)
        } else {
            Err(ConfigError::Cluster("min_nodes (9) exceeds max_nodes (1)".into()))
        }
    }
}

// ── Metrics ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CountingMetrics {
    pub calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingMetrics {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl MetricsPipeline for CountingMetrics {
    fn refresh_metrics<'a>(&'a self, _cluster: &'a ClusterDetails) -> BoxFuture<'a, anyhow::Result<()>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                anyhow::bail!("node stats request timed out");
            }
            Ok(())
        })
    }
}

// ── Recommendations ────────────────────────────────────────────────

#[derive(Default)]
pub struct FixedRecommender {
    list: Mutex<Vec<Recommendation>>,
    pub calls: AtomicUsize,
}

impl FixedRecommender {
    pub fn set(&self, list: Vec<Recommendation>) {
        *self.list.lock().unwrap() = list;
    }
}

impl RecommendationPipeline for FixedRecommender {
    fn evaluate<'a>(
        &'a self,
        _policy: &'a PolicyConfig,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Recommendation>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let list = self.list.lock().unwrap().clone();
        Box::pin(async move { Ok(list) })
    }
}

pub fn recommend(direction: Family, nodes: u32) -> Recommendation {
    let task = match direction {
        Family::ScaleUp => format!("scale_up_by_{nodes}"),
        Family::ScaleDown => format!("scale_down_by_{nodes}"),
    };
    Recommendation {
        task,
        direction,
        nodes,
    }
}

// ── Executor ───────────────────────────────────────────────────────

/// Behaves like a real executor on success: walks the phase back to idle.
/// On failure it leaves the phase untouched.
pub struct RecordingExecutor {
    store: StateStore,
    succeed: AtomicBool,
    hang: AtomicBool,
    pub scale_out_calls: AtomicUsize,
    pub scale_in_calls: AtomicUsize,
    pub seen_phases: Mutex<Vec<Phase>>,
}

impl RecordingExecutor {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            succeed: AtomicBool::new(true),
            hang: AtomicBool::new(false),
            scale_out_calls: AtomicUsize::new(0),
            scale_in_calls: AtomicUsize::new(0),
            seen_phases: Mutex::new(Vec::new()),
        }
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn total_calls(&self) -> usize {
        self.scale_out_calls.load(Ordering::SeqCst) + self.scale_in_calls.load(Ordering::SeqCst)
    }

    fn run<'a>(&'a self, family: Family, state: &'a ClusterState) -> BoxFuture<'a, bool> {
        self.seen_phases.lock().unwrap().push(state.phase);
        Box::pin(async move {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if !self.succeed.load(Ordering::SeqCst) {
                return false;
            }
            let mut current = self.store.get_cluster_state().unwrap();
            if current.phase.is_pending() {
                current = self
                    .store
                    .transition(&current, Phase::in_progress(family))
                    .unwrap();
            }
            self.store.transition(&current, Phase::Idle).unwrap();
            true
        })
    }
}

impl ProvisioningExecutor for RecordingExecutor {
    fn scale_out<'a>(&'a self, _policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool> {
        self.scale_out_calls.fetch_add(1, Ordering::SeqCst);
        self.run(Family::ScaleUp, state)
    }

    fn scale_in<'a>(&'a self, _policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool> {
        self.scale_in_calls.fetch_add(1, Ordering::SeqCst);
        self.run(Family::ScaleDown, state)
    }
}

// ── State sources ──────────────────────────────────────────────────

/// A state store that cannot be reached.
pub struct UnreachableState;

impl StateSource for UnreachableState {
    fn refresh_cluster_state(&self) -> BoxFuture<'_, StateResult<ClusterState>> {
        Box::pin(async { Err(StateError::Read("connection reset".into())) })
    }

    fn begin_operation<'a>(
        &'a self,
        _observed: &'a ClusterState,
        _direction: Family,
        _task: &'a str,
        _nodes: u32,
    ) -> BoxFuture<'a, StateResult<ClusterState>> {
        Box::pin(async { Err(StateError::Write("connection reset".into())) })
    }
}

/// Another writer touches the record right after every read.
pub struct RacingState(pub StateStore);

impl StateSource for RacingState {
    fn refresh_cluster_state(&self) -> BoxFuture<'_, StateResult<ClusterState>> {
        Box::pin(async move {
            let snapshot = self.0.get_cluster_state()?;
            self.0.put_cluster_state(&snapshot)?;
            Ok(snapshot)
        })
    }

    fn begin_operation<'a>(
        &'a self,
        observed: &'a ClusterState,
        direction: Family,
        task: &'a str,
        nodes: u32,
    ) -> BoxFuture<'a, StateResult<ClusterState>> {
        Box::pin(async move { self.0.begin_operation(observed, direction, task, nodes) })
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub store: StateStore,
    pub mastership: Arc<FlagMastership>,
    pub policy: Arc<SwitchPolicy>,
    pub metrics: Arc<CountingMetrics>,
    pub recommender: Arc<FixedRecommender>,
    pub executor: Arc<RecordingExecutor>,
    /// Shared by every `Collaborators` built from this harness, as in one
    /// daemon process.
    pub tenure: Tenure,
}

impl Harness {
    pub fn new() -> Self {
        let store = StateStore::open_in_memory().unwrap();
        Self {
            executor: Arc::new(RecordingExecutor::new(store.clone())),
            store,
            mastership: Arc::new(FlagMastership::default()),
            policy: Arc::new(SwitchPolicy::default()),
            metrics: Arc::new(CountingMetrics::default()),
            recommender: Arc::new(FixedRecommender::default()),
            tenure: Tenure::default(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        self.collaborators_with_state(Arc::new(self.store.clone()))
    }

    pub fn collaborators_with_state(&self, state: Arc<dyn StateSource>) -> Collaborators {
        Collaborators {
            state,
            mastership: self.mastership.clone(),
            policy: self.policy.clone(),
            metrics: self.metrics.clone(),
            recommender: self.recommender.clone(),
            executor: self.executor.clone(),
            tenure: self.tenure.clone(),
        }
    }

    /// Put the cluster into `phase` through legal transitions.
    pub fn force_phase(&self, phase: Phase) -> ClusterState {
        let idle = self.store.get_cluster_state().unwrap();
        let Some(family) = phase.family() else {
            return idle;
        };
        let pending = self
            .store
            .begin_operation(&idle, family, "scale_by_test", 2)
            .unwrap();
        if phase.is_pending() {
            return pending;
        }
        self.store.transition(&pending, phase).unwrap()
    }

    pub fn phase(&self) -> Phase {
        self.store.get_cluster_state().unwrap().phase
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics.calls.load(Ordering::SeqCst)
    }

    pub fn recommend_calls(&self) -> usize {
        self.recommender.calls.load(Ordering::SeqCst)
    }

    pub fn provision_calls(&self) -> usize {
        self.executor.total_calls()
    }
}
