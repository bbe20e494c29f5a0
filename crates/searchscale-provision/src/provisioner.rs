//! Provisioner — drives one recorded operation through the provider and
//! keeps the cluster state in step with it.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use searchscale_cluster::ClusterClient;
use searchscale_config::{ClusterDetails, PolicyConfig};
use searchscale_control::{BoxFuture, ProvisioningExecutor};
use searchscale_state::{ClusterState, Family, Phase, StateStore, store::epoch_secs};

use crate::provider::NodeProvider;

/// Reports how many nodes the cluster has right now.
pub trait NodeInventory: Send + Sync {
    fn live_nodes<'a>(&'a self, cluster: &'a ClusterDetails) -> BoxFuture<'a, anyhow::Result<u32>>;
}

/// Asks the cluster itself.
#[derive(Debug, Clone, Default)]
pub struct LiveInventory;

impl NodeInventory for LiveInventory {
    fn live_nodes<'a>(&'a self, cluster: &'a ClusterDetails) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(async move { ClusterClient::from_details(cluster).node_count().await })
    }
}

/// Executes scaling operations recorded in the state store.
pub struct Provisioner {
    state: StateStore,
    provider: Arc<dyn NodeProvider>,
    inventory: Arc<dyn NodeInventory>,
}

impl Provisioner {
    pub fn new(
        state: StateStore,
        provider: Arc<dyn NodeProvider>,
        inventory: Arc<dyn NodeInventory>,
    ) -> Self {
        Self {
            state,
            provider,
            inventory,
        }
    }

    /// Carry out the operation in `observed`, which must belong to `direction`.
    ///
    /// Returns true once the cluster is back to idle.
    pub async fn execute(
        &self,
        direction: Family,
        policy: &PolicyConfig,
        observed: &ClusterState,
    ) -> bool {
        if observed.phase.family() != Some(direction) {
            error!(phase = %observed.phase, %direction, "phase does not match requested direction");
            return false;
        }

        let mut current = observed.clone();
        if current.phase.is_pending() {
            let now = epoch_secs();
            let mut next = current.with_phase(Phase::in_progress(direction), now);
            next.provision_started_at = Some(now);
            current = match self.state.compare_and_set(current.revision, &next) {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, phase = %observed.phase, "failed to mark operation in progress");
                    return false;
                }
            };
        }

        let nodes = self.bounded_nodes(direction, policy, current.remaining_nodes).await;
        if nodes == 0 {
            info!(%direction, cluster = %policy.cluster.name, "cluster already at its bound; nothing to provision");
        } else {
            let result = match direction {
                Family::ScaleUp => self.provider.add_nodes(policy, nodes).await,
                Family::ScaleDown => self.provider.remove_nodes(policy, nodes).await,
            };
            if let Err(e) = result {
                warn!(error = %e, %direction, nodes, "provider failed");
                self.record_failure(&current, &e);
                return false;
            }
        }

        let now = epoch_secs();
        let mut done = current.with_phase(Phase::Idle, now);
        done.remaining_nodes = 0;
        done.last_provisioned_at = Some(now);
        done.last_error = None;
        match self.state.compare_and_set(current.revision, &done) {
            Ok(state) => {
                info!(%direction, nodes, revision = state.revision, "operation finished; cluster idle");
                true
            }
            Err(e) => {
                error!(error = %e, %direction, "provisioned but could not record completion");
                false
            }
        }
    }

    /// Limit `requested` so the cluster stays within `min_nodes..=max_nodes`.
    async fn bounded_nodes(&self, direction: Family, policy: &PolicyConfig, requested: u32) -> u32 {
        let cluster = &policy.cluster;
        let live = match self.inventory.live_nodes(cluster).await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, requested, "node count unavailable; not clamping");
                return requested;
            }
        };
        let headroom = match direction {
            Family::ScaleUp => cluster.max_nodes.saturating_sub(live),
            Family::ScaleDown => live.saturating_sub(cluster.min_nodes),
        };
        let nodes = requested.min(headroom);
        if nodes != requested {
            debug!(requested, live, nodes, %direction, "node count clamped");
        }
        nodes
    }

    fn record_failure(&self, current: &ClusterState, err: &anyhow::Error) {
        let mut failed = current.clone();
        failed.last_error = Some(format!("{err:#}"));
        failed.updated_at = epoch_secs();
        if let Err(e) = self.state.compare_and_set(current.revision, &failed) {
            warn!(error = %e, "could not record provisioning failure");
        }
    }
}

impl ProvisioningExecutor for Provisioner {
    fn scale_out<'a>(&'a self, policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool> {
        Box::pin(self.execute(Family::ScaleUp, policy, state))
    }

    fn scale_in<'a>(&'a self, policy: &'a PolicyConfig, state: &'a ClusterState) -> BoxFuture<'a, bool> {
        Box::pin(self.execute(Family::ScaleDown, policy, state))
    }
}
