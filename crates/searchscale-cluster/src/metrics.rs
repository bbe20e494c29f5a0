//! Metrics fetcher — pulls per-node load from the cluster and persists it.
//!
//! Each refresh reads `/_nodes/stats/os,jvm,fs`, turns every node into one
//! [`MetricSample`] stamped with the same epoch, writes the samples to the
//! state store and prunes samples that fell out of the retention window.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use searchscale_config::ClusterDetails;
use searchscale_control::{BoxFuture, MetricsPipeline};
use searchscale_state::{MetricSample, StateStore, store::epoch_secs};

use crate::client::ClusterClient;

#[derive(Debug, Default, Deserialize)]
pub struct NodesStats {
    #[serde(default)]
    pub nodes: HashMap<String, NodeStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub name: String,
    pub os: OsStats,
    pub jvm: JvmStats,
    pub fs: FsStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsStats {
    pub cpu: CpuStats,
    pub mem: MemStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub percent: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemStats {
    pub used_percent: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JvmStats {
    pub mem: JvmMemStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JvmMemStats {
    pub heap_used_percent: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FsStats {
    pub total: FsTotal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FsTotal {
    pub total_in_bytes: u64,
    pub available_in_bytes: u64,
}

impl FsTotal {
    fn used_percent(&self) -> f64 {
        if self.total_in_bytes == 0 {
            return 0.0;
        }
        let used = self.total_in_bytes.saturating_sub(self.available_in_bytes);
        used as f64 * 100.0 / self.total_in_bytes as f64
    }
}

/// Convert a `_nodes/stats` response into samples taken at `epoch`.
///
/// Nodes are identified by name; unnamed nodes fall back to their id.
pub fn samples_from_stats(stats: &NodesStats, epoch: u64) -> Vec<MetricSample> {
    let mut samples: Vec<MetricSample> = stats
        .nodes
        .iter()
        .map(|(id, node)| MetricSample {
            node_id: if node.name.is_empty() {
                id.clone()
            } else {
                node.name.clone()
            },
            epoch,
            cpu_percent: node.os.cpu.percent,
            mem_percent: node.os.mem.used_percent,
            heap_percent: node.jvm.mem.heap_used_percent,
            disk_percent: node.fs.total.used_percent(),
        })
        .collect();
    samples.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    samples
}

/// Fetches node metrics into the state store.
pub struct MetricsFetcher {
    state: StateStore,
    /// How long samples are kept.
    retention: Duration,
}

impl MetricsFetcher {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            retention: Duration::from_secs(3600),
        }
    }

    /// Set the sample retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Fetch one round of samples and persist them.
    pub async fn fetch(&self, client: &ClusterClient) -> anyhow::Result<Vec<MetricSample>> {
        let stats: NodesStats = client.get_json("/_nodes/stats/os,jvm,fs").await?;
        let epoch = epoch_secs();
        let samples = samples_from_stats(&stats, epoch);

        for sample in &samples {
            self.state.put_metric_sample(sample)?;
        }
        let pruned = self
            .state
            .prune_metric_samples(epoch.saturating_sub(self.retention.as_secs()))?;

        debug!(nodes = samples.len(), pruned, epoch, "metrics snapshot persisted");
        Ok(samples)
    }
}

impl MetricsPipeline for MetricsFetcher {
    fn refresh_metrics<'a>(&'a self, cluster: &'a ClusterDetails) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let client = ClusterClient::from_details(cluster);
            let samples = self.fetch(&client).await?;
            info!(cluster = %cluster.name, nodes = samples.len(), "metrics refreshed");
            Ok(())
        })
    }
}
