//! Recovery watchdog — resumes an operation left mid-flight by a previous
//! coordinator.
//!
//! Runs on the same interval as the control loop but independently of it.
//! It reacts only to the tick on which this process *becomes* master while
//! the persisted phase is non-idle, and then replays the already-decided
//! direction from the phase. A master that stays master does not trigger
//! again; resumption is one-shot per leadership acquisition.
//!
//! The two loops tick independently, so the control loop may already have
//! started an operation in this tenure before the watchdog's first tick as
//! master. The shared tenure marker tells the two cases apart.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use searchscale_state::Family;

use crate::orchestrate::{self, DEFAULT_PROVISION_TIMEOUT, ProvisionOutcome};
use crate::pipeline::Collaborators;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogOutcome {
    StateUnavailable,
    /// Nothing in flight.
    Idle,
    /// Something is in flight but mastership did not just arrive.
    NoEdge,
    /// Mastership just arrived, but the operation in flight was started by
    /// this process's own control loop in the same tenure.
    OwnTenure,
    PolicyInvalid,
    Resumed {
        direction: Family,
        outcome: ProvisionOutcome,
    },
}

pub struct RecoveryWatchdog {
    deps: Collaborators,
    provision_timeout: Duration,
    /// Mastership observed on the previous tick.
    previous_master: bool,
}

impl RecoveryWatchdog {
    /// Create a watchdog that assumes `previous_master` for the tick before
    /// its first one.
    pub fn new(deps: Collaborators, previous_master: bool) -> Self {
        Self {
            deps,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            previous_master,
        }
    }

    /// Bound each resumed provisioning call by `timeout`.
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Seed the retained mastership from the oracle.
    ///
    /// A process that is already master at boot is not a leadership change.
    pub async fn prime(&mut self) {
        self.previous_master = self.deps.is_master().await;
        debug!(master = self.previous_master, "watchdog primed");
    }

    pub fn previous_master(&self) -> bool {
        self.previous_master
    }

    pub async fn tick(&mut self) -> WatchdogOutcome {
        let state = self.deps.state.refresh_cluster_state().await;
        let current_master = self.deps.is_master().await;
        let previous_master = std::mem::replace(&mut self.previous_master, current_master);

        let state = match state {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "cluster state unavailable; watchdog skipping tick");
                return WatchdogOutcome::StateUnavailable;
            }
        };

        let Some(direction) = state.phase.family() else {
            return WatchdogOutcome::Idle;
        };

        if previous_master || !current_master {
            return WatchdogOutcome::NoEdge;
        }

        if self.deps.tenure.started() {
            debug!(phase = %state.phase, "operation started by this process this tenure; not resuming");
            return WatchdogOutcome::OwnTenure;
        }

        info!(
            phase = %state.phase,
            task = state.rule_triggered.as_deref().unwrap_or("unknown"),
            "became master with an unfinished operation; resuming"
        );

        let policy = match self.deps.policy.load_policy() {
            Ok(policy) => policy,
            Err(e) => {
                error!(error = %e, phase = %state.phase, "policy failed to load; cannot resume");
                return WatchdogOutcome::PolicyInvalid;
            }
        };

        let outcome = orchestrate::provision(
            self.deps.executor.as_ref(),
            direction,
            &policy,
            &state,
            self.provision_timeout,
        )
        .await;

        if outcome.is_success() {
            info!(%direction, "resumed operation completed");
        } else {
            warn!(%direction, ?outcome, "resumed operation did not complete");
        }
        WatchdogOutcome::Resumed { direction, outcome }
    }

    /// Prime from the oracle, then run until shutdown.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.prime().await;
        info!(interval_secs = interval.as_secs(), "recovery watchdog started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "watchdog tick finished");
                }
                _ = shutdown.changed() => {
                    info!("recovery watchdog shutting down");
                    break;
                }
            }
        }
    }
}
