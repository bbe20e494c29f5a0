//! Policy file parser.
//!
//! The policy is a TOML document with three sections: the target cluster,
//! how to provision nodes for it, and the ordered list of scaling tasks.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use searchscale_state::Family;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub cluster: ClusterDetails,
    pub provision: ProvisionConfig,
    #[serde(default)]
    pub tasks: Vec<TaskDetails>,
}

/// The search cluster being scaled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterDetails {
    pub name: String,
    /// Name this process's node reports to the cluster.
    pub node_name: String,
    /// `host:port` of the cluster's HTTP API.
    pub endpoint: String,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub credentials: Credentials,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Commands that add or remove nodes; argv form, no shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionConfig {
    pub scale_out_command: Vec<String>,
    pub scale_in_command: Vec<String>,
}

/// A named scaling task and the rules that trigger it.
///
/// The name encodes the action: `scale_up_by_<n>` or `scale_down_by_<n>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetails {
    pub name: String,
    #[serde(default)]
    pub operator: Operator,
    pub rules: Vec<Rule>,
}

/// How a task combines its rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    #[default]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub metric: Metric,
    pub stat: Stat,
    /// Threshold, in percent.
    pub limit: f64,
    /// Window of samples the rule looks at (e.g. "9m").
    pub decision_period: String,
    /// For `stat = "count"`: samples beyond the limit needed to fire.
    pub occurrences: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Mem,
    Heap,
    Disk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Avg,
    Min,
    Max,
    Count,
}

impl PolicyConfig {
    /// Read, parse and validate a policy file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content)?;
        debug!(?path, tasks = config.tasks.len(), "policy loaded");
        Ok(config)
    }

    /// Parse and validate a policy document.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: PolicyConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let cluster = &self.cluster;
        if cluster.endpoint.trim().is_empty() {
            return Err(ConfigError::Cluster("endpoint is empty".into()));
        }
        if cluster.node_name.trim().is_empty() {
            return Err(ConfigError::Cluster("node_name is empty".into()));
        }
        if cluster.min_nodes == 0 {
            return Err(ConfigError::Cluster("min_nodes must be at least 1".into()));
        }
        if cluster.min_nodes > cluster.max_nodes {
            return Err(ConfigError::Cluster(format!(
                "min_nodes ({}) exceeds max_nodes ({})",
                cluster.min_nodes, cluster.max_nodes
            )));
        }

        if self.provision.scale_out_command.is_empty() {
            return Err(ConfigError::Provision("scale_out_command is empty".into()));
        }
        if self.provision.scale_in_command.is_empty() {
            return Err(ConfigError::Provision("scale_in_command is empty".into()));
        }

        for task in &self.tasks {
            task.validate()?;
        }
        Ok(())
    }
}

impl TaskDetails {
    /// Direction and node count encoded in the task name.
    pub fn action(&self) -> Option<(Family, u32)> {
        let (family, count) = if let Some(n) = self.name.strip_prefix("scale_up_by_") {
            (Family::ScaleUp, n)
        } else if let Some(n) = self.name.strip_prefix("scale_down_by_") {
            (Family::ScaleDown, n)
        } else {
            return None;
        };
        match count.parse::<u32>() {
            Ok(n) if n > 0 => Some((family, n)),
            _ => None,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::Task {
            task: self.name.clone(),
            reason,
        };

        if self.action().is_none() {
            return Err(invalid(
                "name must be scale_up_by_<n> or scale_down_by_<n> with n >= 1".into(),
            ));
        }
        if self.rules.is_empty() {
            return Err(invalid("at least one rule is required".into()));
        }
        for rule in &self.rules {
            if !(0.0..=100.0).contains(&rule.limit) {
                return Err(invalid(format!(
                    "{:?} limit {} is outside 0-100",
                    rule.metric, rule.limit
                )));
            }
            if parse_duration(&rule.decision_period).is_none() {
                return Err(invalid(format!(
                    "unparseable decision_period {:?}",
                    rule.decision_period
                )));
            }
            if rule.stat == Stat::Count && rule.occurrences.unwrap_or(0) == 0 {
                return Err(invalid("count rules need occurrences >= 1".into()));
            }
        }
        Ok(())
    }
}

impl Rule {
    /// The rule's look-back window.
    pub fn window(&self) -> Duration {
        parse_duration(&self.decision_period).unwrap_or(Duration::from_secs(300))
    }
}
