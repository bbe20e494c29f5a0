//! searchscale-cluster — access to the search cluster's HTTP API.
//!
//! Provides the concrete collaborators the control loops talk to:
//!
//! ```text
//! ClusterClient            GET + JSON decode, basic auth, timeout
//!   ├── ClusterMastership  /_cat/cluster_manager → "is this node master?"
//!   ├── MetricsFetcher     /_nodes/stats → MetricSample rows in the StateStore
//!   └── node_count()       /_cat/nodes → live cluster size
//! ```

pub mod client;
pub mod mastership;
pub mod metrics;

#[cfg(test)]
mod test_server;

pub use client::ClusterClient;
pub use mastership::{ClusterMastership, StaticMastership};
pub use metrics::MetricsFetcher;
