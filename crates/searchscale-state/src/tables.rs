//! redb table definitions for the searchscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// The cluster state record, stored under [`CLUSTER_STATE_KEY`].
pub const CLUSTER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster_state");

/// Metric samples keyed by `{epoch:020}:{node_id}`.
pub const METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("metrics");

pub const CLUSTER_STATE_KEY: &str = "current";
