//! StateStore — redb-backed persistence for searchscale.
//!
//! Provides the cluster state record with compare-and-set transitions and
//! an append-only table of metric samples. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(CLUSTER_STATE).map_err(map_err!(Table))?;
        txn.open_table(METRICS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Cluster state ──────────────────────────────────────────────

    /// Read the current cluster state.
    ///
    /// An absent record reads as the default idle state at revision 0.
    pub fn get_cluster_state(&self) -> StateResult<ClusterState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTER_STATE).map_err(map_err!(Table))?;
        match table.get(CLUSTER_STATE_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(ClusterState::default()),
        }
    }

    /// Unconditionally overwrite the cluster state.
    ///
    /// This is the operator escape hatch for clearing a stalled operation;
    /// the control loops only ever write through [`Self::compare_and_set`].
    pub fn put_cluster_state(&self, state: &ClusterState) -> StateResult<ClusterState> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(CLUSTER_STATE).map_err(map_err!(Table))?;
            let current = read_state(&table)?;
            stored = ClusterState {
                revision: current.revision + 1,
                ..state.clone()
            };
            write_state(&mut table, &stored)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(phase = %stored.phase, revision = stored.revision, "cluster state overwritten");
        Ok(stored)
    }

    /// Write `next` only if the stored revision is still `expected_revision`.
    ///
    /// The read, check and write share one write transaction, so two
    /// callers holding the same snapshot cannot both succeed. Returns the
    /// committed state with its new revision.
    pub fn compare_and_set(
        &self,
        expected_revision: u64,
        next: &ClusterState,
    ) -> StateResult<ClusterState> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(CLUSTER_STATE).map_err(map_err!(Table))?;
            let current = read_state(&table)?;
            if current.revision != expected_revision {
                return Err(StateError::Conflict {
                    expected: expected_revision,
                    found: current.revision,
                });
            }
            if !current.phase.can_transition_to(next.phase) {
                return Err(StateError::InvalidTransition {
                    from: current.phase,
                    to: next.phase,
                });
            }
            stored = ClusterState {
                revision: expected_revision + 1,
                ..next.clone()
            };
            write_state(&mut table, &stored)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            phase = %stored.phase,
            previous = %stored.previous_phase,
            revision = stored.revision,
            "cluster state committed"
        );
        Ok(stored)
    }

    /// Move an idle cluster into the pending phase of `family`.
    ///
    /// `observed` must be the snapshot the caller decided on; if anyone
    /// wrote in between, this fails with [`StateError::Conflict`].
    pub fn begin_operation(
        &self,
        observed: &ClusterState,
        family: Family,
        task: &str,
        nodes: u32,
    ) -> StateResult<ClusterState> {
        let next_phase = Phase::pending(family);
        if !observed.is_idle() {
            return Err(StateError::InvalidTransition {
                from: observed.phase,
                to: next_phase,
            });
        }
        let mut next = observed.with_phase(next_phase, epoch_secs());
        next.rule_triggered = Some(task.to_string());
        next.remaining_nodes = nodes;
        next.last_error = None;
        self.compare_and_set(observed.revision, &next)
    }

    /// Move the cluster from `observed.phase` to `next`.
    pub fn transition(&self, observed: &ClusterState, next: Phase) -> StateResult<ClusterState> {
        let next_state = observed.with_phase(next, epoch_secs());
        self.compare_and_set(observed.revision, &next_state)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Insert a metric sample.
    pub fn put_metric_sample(&self, sample: &MetricSample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List samples taken at or after `since` (unix seconds), oldest first.
    pub fn list_metric_samples_since(&self, since: u64) -> StateResult<Vec<MetricSample>> {
        let floor = format!("{since:020}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METRICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(floor.as_str()..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: MetricSample =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(sample);
        }
        Ok(results)
    }

    /// Delete samples taken before `before` (unix seconds). Returns number deleted.
    pub fn prune_metric_samples(&self, before: u64) -> StateResult<u32> {
        let ceiling = format!("{before:020}");
        // Collect keys in a read transaction first.
        let mut keys: Vec<String> = Vec::new();
        {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            for entry in table.range(..ceiling.as_str()).map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                keys.push(key.value().to_string());
            }
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(METRICS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if count > 0 {
            debug!(count, before, "pruned metric samples");
        }
        Ok(count)
    }
}

fn read_state(table: &redb::Table<'_, &'static str, &'static [u8]>) -> StateResult<ClusterState> {
    match table.get(CLUSTER_STATE_KEY).map_err(map_err!(Read))? {
        Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
        None => Ok(ClusterState::default()),
    }
}

fn write_state(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    state: &ClusterState,
) -> StateResult<()> {
    let value = serde_json::to_vec(state).map_err(map_err!(Serialize))?;
    table
        .insert(CLUSTER_STATE_KEY, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
