//! Main control loop — the only path that starts a new scaling operation.
//!
//! Every tick re-reads the cluster state and mastership, and only a master
//! looking at an idle cluster goes on to load the policy, refresh metrics,
//! evaluate recommendations and hand the result to orchestration. Each
//! tick makes at most one decide/attempt cycle and never retries.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use searchscale_state::Phase;

use crate::orchestrate::{self, DEFAULT_PROVISION_TIMEOUT, HandoffOutcome};
use crate::pipeline::Collaborators;

/// Why a tick ended where it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The cluster state could not be read; nothing was done.
    StateUnavailable,
    NotMaster,
    /// An operation is pending or in progress somewhere in the cluster.
    Busy(Phase),
    PolicyInvalid,
    MetricsUnavailable,
    RecommendationFailed,
    Handoff(HandoffOutcome),
}

pub struct ControlLoop {
    deps: Collaborators,
    provision_timeout: Duration,
}

impl ControlLoop {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            deps,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }

    /// Bound each provisioning call by `timeout`.
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Run one decide-and-act cycle.
    pub async fn tick(&self) -> TickOutcome {
        let deps = &self.deps;

        let state = match deps.state.refresh_cluster_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "cluster state unavailable; skipping tick");
                return TickOutcome::StateUnavailable;
            }
        };

        if !deps.is_master().await {
            debug!("not master; skipping tick");
            return TickOutcome::NotMaster;
        }

        if !state.is_idle() {
            debug!(phase = %state.phase, "operation already underway; not starting another");
            return TickOutcome::Busy(state.phase);
        }

        let policy = match deps.policy.load_policy() {
            Ok(policy) => policy,
            Err(e) => {
                error!(error = %e, "policy failed to load; no recommendation this tick");
                return TickOutcome::PolicyInvalid;
            }
        };

        if let Err(e) = deps.metrics.refresh_metrics(&policy.cluster).await {
            warn!(error = %e, cluster = %policy.cluster.name, "metrics refresh failed");
            return TickOutcome::MetricsUnavailable;
        }

        let recommendations = match deps.recommender.evaluate(&policy).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "recommendation evaluation failed");
                return TickOutcome::RecommendationFailed;
            }
        };
        debug!(count = recommendations.len(), "recommendations evaluated");

        let outcome = orchestrate::hand_off(
            deps,
            &policy,
            &state,
            &recommendations,
            self.provision_timeout,
        )
        .await;
        TickOutcome::Handoff(outcome)
    }

    /// Run the control loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "control loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "control tick finished");
                }
                _ = shutdown.changed() => {
                    info!("control loop shutting down");
                    break;
                }
            }
        }
    }
}
