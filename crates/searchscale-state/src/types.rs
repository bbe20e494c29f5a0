//! Domain types for the searchscale state store.
//!
//! [`ClusterState`] is the cluster-wide record of what is happening right
//! now; [`MetricSample`] is one node's load at one instant. Both are
//! serializable to/from JSON for storage in redb tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the search cluster.
pub type NodeId = String;

// ── Phase ─────────────────────────────────────────────────────────

/// Operational phase of the cluster.
///
/// Anything other than [`Phase::Idle`] means a scaling operation has been
/// decided and not yet completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    ScaleUpPending,
    ScaleUpInProgress,
    ScaleDownPending,
    ScaleDownInProgress,
}

/// Direction of a scaling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Add capacity (scale-out).
    ScaleUp,
    /// Remove capacity (scale-in).
    ScaleDown,
}

impl Phase {
    pub fn is_idle(self) -> bool {
        self == Phase::Idle
    }

    /// The direction this phase belongs to; `None` for `Idle`.
    pub fn family(self) -> Option<Family> {
        match self {
            Phase::Idle => None,
            Phase::ScaleUpPending | Phase::ScaleUpInProgress => Some(Family::ScaleUp),
            Phase::ScaleDownPending | Phase::ScaleDownInProgress => Some(Family::ScaleDown),
        }
    }

    pub fn pending(family: Family) -> Self {
        match family {
            Family::ScaleUp => Phase::ScaleUpPending,
            Family::ScaleDown => Phase::ScaleDownPending,
        }
    }

    pub fn in_progress(family: Family) -> Self {
        match family {
            Family::ScaleUp => Phase::ScaleUpInProgress,
            Family::ScaleDown => Phase::ScaleDownInProgress,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Phase::ScaleUpPending | Phase::ScaleDownPending)
    }

    /// Whether `self → next` is a legal move of the state machine.
    ///
    /// Staying in the same phase is always allowed (bookkeeping writes).
    /// Operations never switch direction without passing through `Idle`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        if self == next {
            return true;
        }
        match (self.family(), next.family()) {
            (None, Some(_)) => next.is_pending(),
            (Some(_), None) => true,
            (Some(a), Some(b)) => a == b && self.is_pending() && !next.is_pending(),
            (None, None) => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ScaleUpPending => "scale_up_pending",
            Phase::ScaleUpInProgress => "scale_up_in_progress",
            Phase::ScaleDownPending => "scale_down_pending",
            Phase::ScaleDownInProgress => "scale_down_in_progress",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::ScaleUp => "scale_up",
            Family::ScaleDown => "scale_down",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Cluster state ─────────────────────────────────────────────────

/// The cluster-wide operational record.
///
/// Every process only ever holds a snapshot of this; the store is the
/// source of truth and the snapshot must be refreshed before each decision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterState {
    pub phase: Phase,
    /// Phase before the most recent transition.
    pub previous_phase: Phase,
    /// Incremented on every write; compare-and-set checks against it.
    pub revision: u64,
    /// Task that started the current (or last) operation.
    pub rule_triggered: Option<String>,
    /// Nodes still to add or remove for the current operation.
    pub remaining_nodes: u32,
    /// Unix timestamp (seconds) when provisioning started.
    pub provision_started_at: Option<u64>,
    /// Unix timestamp (seconds) of the last completed provisioning.
    pub last_provisioned_at: Option<u64>,
    /// Last provisioning failure, if the operation is stalled.
    pub last_error: Option<String>,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

impl ClusterState {
    pub fn is_idle(&self) -> bool {
        self.phase.is_idle()
    }

    /// Copy of this state moved to `next`, remembering the current phase.
    ///
    /// Does not touch `revision`; the store assigns it on commit.
    pub fn with_phase(&self, next: Phase, now: u64) -> ClusterState {
        ClusterState {
            phase: next,
            previous_phase: self.phase,
            updated_at: now,
            ..self.clone()
        }
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// Point-in-time load sample for one cluster node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub node_id: NodeId,
    /// Unix timestamp (seconds) the sample was taken.
    pub epoch: u64,
    /// CPU utilisation (0–100).
    pub cpu_percent: f64,
    /// OS memory utilisation (0–100).
    pub mem_percent: f64,
    /// JVM heap utilisation (0–100).
    pub heap_percent: f64,
    /// Disk utilisation (0–100).
    pub disk_percent: f64,
}

impl MetricSample {
    /// Build the composite key for the metrics table.
    ///
    /// The epoch is zero-padded so lexical order equals time order.
    pub fn table_key(&self) -> String {
        format!("{:020}:{}", self.epoch, self.node_id)
    }
}
