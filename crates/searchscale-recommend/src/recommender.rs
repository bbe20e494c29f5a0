//! Recommender — evaluates policy tasks against stored metric samples.
//!
//! Reads every sample inside the longest decision period once per
//! evaluation, then narrows to each rule's own window. Output order follows
//! the policy's task order.

use std::time::Duration;

use tracing::{debug, info};

use searchscale_config::{Metric, Operator, PolicyConfig, Rule, Stat, TaskDetails};
use searchscale_control::{BoxFuture, Recommendation, RecommendationPipeline};
use searchscale_state::{Family, MetricSample, StateStore, store::epoch_secs};

/// Evaluates scaling tasks over the metrics in the state store.
pub struct Recommender {
    state: StateStore,
}

impl Recommender {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Evaluate every task in `policy` as of `now` (unix seconds).
    pub fn evaluate_at(
        &self,
        policy: &PolicyConfig,
        now: u64,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let longest = policy
            .tasks
            .iter()
            .flat_map(|task| task.rules.iter())
            .map(Rule::window)
            .max()
            .unwrap_or(Duration::ZERO);
        let samples = self
            .state
            .list_metric_samples_since(now.saturating_sub(longest.as_secs()))?;

        let mut recommendations = Vec::new();
        for task in &policy.tasks {
            let Some((direction, nodes)) = task.action() else {
                debug!(task = %task.name, "task name carries no action; skipping");
                continue;
            };
            if task_fires(task, direction, &samples, now) {
                info!(task = %task.name, %direction, nodes, "task triggered");
                recommendations.push(Recommendation {
                    task: task.name.clone(),
                    direction,
                    nodes,
                });
            }
        }
        Ok(recommendations)
    }
}

impl RecommendationPipeline for Recommender {
    fn evaluate<'a>(
        &'a self,
        policy: &'a PolicyConfig,
    ) -> BoxFuture<'a, anyhow::Result<Vec<Recommendation>>> {
        Box::pin(async move { self.evaluate_at(policy, epoch_secs()) })
    }
}

fn task_fires(task: &TaskDetails, direction: Family, samples: &[MetricSample], now: u64) -> bool {
    let mut fired = task
        .rules
        .iter()
        .map(|rule| rule_fires(rule, direction, samples, now));
    match task.operator {
        Operator::And => fired.all(|f| f),
        Operator::Or => fired.any(|f| f),
    }
}

fn rule_fires(rule: &Rule, direction: Family, samples: &[MetricSample], now: u64) -> bool {
    let since = now.saturating_sub(rule.window().as_secs());
    let values: Vec<f64> = samples
        .iter()
        .filter(|s| s.epoch >= since)
        .map(|s| metric_value(s, rule.metric))
        .collect();
    if values.is_empty() {
        return false;
    }

    let beyond = |v: f64| match direction {
        Family::ScaleUp => v > rule.limit,
        Family::ScaleDown => v < rule.limit,
    };

    let fired = match rule.stat {
        Stat::Avg => beyond(values.iter().sum::<f64>() / values.len() as f64),
        Stat::Min => beyond(values.iter().copied().fold(f64::INFINITY, f64::min)),
        Stat::Max => beyond(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        Stat::Count => {
            let hits = values.iter().filter(|v| beyond(**v)).count() as u32;
            hits >= rule.occurrences.unwrap_or(1)
        }
    };
    debug!(
        metric = ?rule.metric,
        stat = ?rule.stat,
        limit = rule.limit,
        samples = values.len(),
        fired,
        "rule evaluated"
    );
    fired
}

fn metric_value(sample: &MetricSample, metric: Metric) -> f64 {
    match metric {
        Metric::Cpu => sample.cpu_percent,
        Metric::Mem => sample.mem_percent,
        Metric::Heap => sample.heap_percent,
        Metric::Disk => sample.disk_percent,
    }
}
