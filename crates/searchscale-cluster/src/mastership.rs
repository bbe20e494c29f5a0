//! Mastership oracles.
//!
//! The search cluster already elects a cluster manager; the process running
//! on that node is the coordinator. Election itself is the cluster's job,
//! these types only ask who won.

use serde::Deserialize;
use tracing::debug;

use searchscale_control::{BoxFuture, MastershipOracle};

use crate::client::ClusterClient;

#[derive(Debug, Deserialize)]
struct ClusterManagerRow {
    node: String,
}

/// Asks the cluster which node is the elected cluster manager and compares
/// it with the local node's name.
pub struct ClusterMastership {
    client: ClusterClient,
    node_name: String,
}

impl ClusterMastership {
    pub fn new(client: ClusterClient, node_name: &str) -> Self {
        Self {
            client,
            node_name: node_name.to_string(),
        }
    }

    pub async fn check(&self) -> anyhow::Result<bool> {
        let rows: Vec<ClusterManagerRow> = self
            .client
            .get_json("/_cat/cluster_manager?format=json")
            .await?;
        let manager = rows
            .first()
            .map(|row| row.node.as_str())
            .ok_or_else(|| anyhow::anyhow!("cluster reported no elected manager"))?;
        let is_master = manager == self.node_name;
        debug!(%manager, local = %self.node_name, is_master, "mastership checked");
        Ok(is_master)
    }
}

impl MastershipOracle for ClusterMastership {
    fn is_master(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(self.check())
    }
}

/// Fixed answer; used for single-node deployments.
#[derive(Debug, Clone, Copy)]
pub struct StaticMastership(pub bool);

impl MastershipOracle for StaticMastership {
    fn is_master(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        let master = self.0;
        Box::pin(async move { Ok(master) })
    }
}
