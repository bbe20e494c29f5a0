//! searchscale-control — the mastership-gated scaling control plane.
//!
//! Three independent background tasks share nothing but the persisted
//! cluster state:
//!
//! ```text
//! ControlLoop        every interval: state → master? → idle? → policy
//!                    → metrics → recommend → hand_off → executor
//! RecoveryWatchdog   every interval: state → master edge (false→true)
//!                    with non-idle phase → executor (direction from phase)
//! policy watcher     on file events: log that stale recommendations are void
//! ```
//!
//! # Exclusivity
//!
//! Only a master that sees `Phase::Idle` starts an operation, and the
//! idle → pending move is a compare-and-set on the state's revision, so at
//! most one operation is active cluster-wide as long as the mastership
//! oracle never reports two masters at once.
//!
//! # Resumption
//!
//! A failed, timed-out or interrupted operation leaves the phase non-idle.
//! The control loop then declines to start anything new, and the watchdog
//! of whichever process next acquires mastership replays the recorded
//! direction. Nothing retries within one leadership tenure: an operation
//! the control loop started is marked in the shared [`Tenure`], and the
//! watchdog of the same process skips it until mastership is lost.

pub mod controller;
pub mod orchestrate;
pub mod pipeline;
pub mod watchdog;
pub mod watcher;

pub use controller::{ControlLoop, TickOutcome};
pub use orchestrate::{DEFAULT_PROVISION_TIMEOUT, HandoffOutcome, ProvisionOutcome};
pub use pipeline::{
    BoxFuture, Collaborators, FilePolicyLoader, MastershipOracle, MetricsPipeline, PolicyLoader,
    ProvisioningExecutor, Recommendation, RecommendationPipeline, StateSource, Tenure,
};
pub use watchdog::{RecoveryWatchdog, WatchdogOutcome};
pub use watcher::{ChangeEvent, ChangeKind, run_policy_watcher, watch_for_change};
