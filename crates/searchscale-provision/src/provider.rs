//! Node providers — the infrastructure side of a scaling operation.

use std::process::Stdio;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::{debug, info};

use searchscale_config::PolicyConfig;
use searchscale_control::BoxFuture;
use searchscale_state::Family;

/// Adds or removes cluster nodes.
pub trait NodeProvider: Send + Sync {
    fn add_nodes<'a>(&'a self, policy: &'a PolicyConfig, count: u32) -> BoxFuture<'a, anyhow::Result<()>>;

    fn remove_nodes<'a>(&'a self, policy: &'a PolicyConfig, count: u32) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Runs the policy's provisioning commands as child processes.
///
/// The command gets `SEARCHSCALE_CLUSTER`, `SEARCHSCALE_DIRECTION` and
/// `SEARCHSCALE_NODES` in its environment. A non-zero exit is a failure
/// carrying the command's stderr. Dropping the future kills the child.
#[derive(Debug, Clone, Default)]
pub struct CommandProvider;

impl CommandProvider {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, policy: &PolicyConfig, direction: Family, count: u32) -> anyhow::Result<()> {
        let argv = match direction {
            Family::ScaleUp => &policy.provision.scale_out_command,
            Family::ScaleDown => &policy.provision.scale_in_command,
        };
        let Some((program, args)) = argv.split_first() else {
            bail!("no {direction} command configured");
        };

        info!(%program, %direction, nodes = count, cluster = %policy.cluster.name, "running provisioning command");
        let output = Command::new(program)
            .args(args)
            .env("SEARCHSCALE_CLUSTER", &policy.cluster.name)
            .env("SEARCHSCALE_DIRECTION", direction.as_str())
            .env("SEARCHSCALE_NODES", count.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning {program}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{program} exited with {}: {}", output.status, stderr.trim());
        }
        debug!(
            %program,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "provisioning command finished"
        );
        Ok(())
    }
}

impl NodeProvider for CommandProvider {
    fn add_nodes<'a>(&'a self, policy: &'a PolicyConfig, count: u32) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.run(policy, Family::ScaleUp, count))
    }

    fn remove_nodes<'a>(&'a self, policy: &'a PolicyConfig, count: u32) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.run(policy, Family::ScaleDown, count))
    }
}
