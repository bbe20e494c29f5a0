//! Provisioning orchestration shared by the control loop and the watchdog.
//!
//! The control loop hands over a fresh recommendation list; the watchdog
//! hands over a direction recovered from the persisted phase. Either way
//! exactly one executor call is made, bounded by a timeout, and its result
//! is reported without retrying and without touching the phase on failure:
//! a non-idle phase is what lets the next coordinator resume the work.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use searchscale_config::PolicyConfig;
use searchscale_state::{ClusterState, Family, StateError};

use crate::pipeline::{Collaborators, ProvisioningExecutor, Recommendation};

/// Default upper bound for a single provisioning call.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Result of one executor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Succeeded,
    Failed,
    /// The call did not finish in time and was cancelled.
    TimedOut,
}

impl ProvisionOutcome {
    pub fn is_success(self) -> bool {
        self == ProvisionOutcome::Succeeded
    }
}

/// What happened to a recommendation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Empty list; nothing to do this tick.
    NoAction,
    /// Someone else moved the cluster state after we read it.
    Conflict,
    /// The pending transition could not be written.
    StateUnavailable,
    Provisioned {
        recommendation: Recommendation,
        outcome: ProvisionOutcome,
    },
}

/// Invoke the executor call matching `direction`, bounded by `timeout`.
pub async fn provision(
    executor: &dyn ProvisioningExecutor,
    direction: Family,
    policy: &PolicyConfig,
    state: &ClusterState,
    timeout: Duration,
) -> ProvisionOutcome {
    let call = match direction {
        Family::ScaleUp => {
            debug!(phase = %state.phase, "calling scale-out");
            executor.scale_out(policy, state)
        }
        Family::ScaleDown => {
            debug!(phase = %state.phase, "calling scale-in");
            executor.scale_in(policy, state)
        }
    };

    match tokio::time::timeout(timeout, call).await {
        Ok(true) => {
            info!(%direction, cluster = %policy.cluster.name, "provisioning completed");
            ProvisionOutcome::Succeeded
        }
        Ok(false) => {
            warn!(
                %direction,
                cluster = %policy.cluster.name,
                "provisioning failed; phase left for resumption"
            );
            ProvisionOutcome::Failed
        }
        Err(_) => {
            warn!(
                %direction,
                cluster = %policy.cluster.name,
                timeout_secs = timeout.as_secs(),
                "provisioning timed out; phase left for resumption"
            );
            ProvisionOutcome::TimedOut
        }
    }
}

/// Start an operation for the first recommendation and provision it.
///
/// `observed` is the idle snapshot the caller decided on. The idle → pending
/// move is a compare-and-set against it, so a concurrent writer makes this
/// a no-op instead of a second operation. The operation is recorded in the
/// process's [`Tenure`](crate::pipeline::Tenure) so this process's watchdog
/// leaves it alone.
pub async fn hand_off(
    deps: &Collaborators,
    policy: &PolicyConfig,
    observed: &ClusterState,
    recommendations: &[Recommendation],
    timeout: Duration,
) -> HandoffOutcome {
    let Some(chosen) = recommendations.first() else {
        debug!("no recommendation this tick");
        return HandoffOutcome::NoAction;
    };
    if recommendations.len() > 1 {
        debug!(
            chosen = %chosen.task,
            skipped = recommendations.len() - 1,
            "acting on the highest-priority recommendation only"
        );
    }

    // Claimed before the write so the watchdog never sees our pending
    // phase without the claim.
    let claimed_before = deps.tenure.started();
    deps.tenure.mark_started();

    let pending = match deps
        .state
        .begin_operation(observed, chosen.direction, &chosen.task, chosen.nodes)
        .await
    {
        Ok(pending) => pending,
        Err(e) => {
            if !claimed_before {
                deps.tenure.end();
            }
            if let StateError::Conflict { .. } = e {
                warn!(error = %e, task = %chosen.task, "cluster state moved; not starting operation");
                return HandoffOutcome::Conflict;
            }
            error!(error = %e, task = %chosen.task, "failed to record pending operation");
            return HandoffOutcome::StateUnavailable;
        }
    };
    info!(
        task = %chosen.task,
        direction = %chosen.direction,
        nodes = chosen.nodes,
        revision = pending.revision,
        "scaling operation started"
    );

    let outcome = provision(
        deps.executor.as_ref(),
        chosen.direction,
        policy,
        &pending,
        timeout,
    )
    .await;

    HandoffOutcome::Provisioned {
        recommendation: chosen.clone(),
        outcome,
    }
}
