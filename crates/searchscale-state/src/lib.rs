//! searchscale-state — persisted cluster state for searchscale.
//!
//! Backed by [redb](https://docs.rs/redb), holds the single shared
//! [`ClusterState`] record that tells every process whether the cluster is
//! idle or has a scaling operation pending/in progress, plus the metric
//! samples the recommendation pipeline reads.
//!
//! # Architecture
//!
//! Values are JSON-serialized into redb's `&[u8]` value columns. The
//! cluster state lives under a single well-known key and every write bumps
//! its `revision`, which is what compare-and-set transitions check against.
//! Metric samples are keyed `{epoch:020}:{node_id}` so a range scan returns
//! them in time order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
