//! Versioned persistence for the policy table

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use linefollow_core::{Action, LineFollowError, Result, STATE_COUNT};

use crate::qtable::QTable;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Durable form of a [`QTable`] plus its hyperparameter metadata.
///
/// Serialized as a single self-describing JSON document; the declared
/// dimensions are validated on load and a mismatch is an error, never a
/// silent resize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version
    pub version: u32,
    /// Declared number of states (rows)
    pub state_count: usize,
    /// Declared number of actions (columns)
    pub action_count: usize,
    /// Exploration rate at save time
    pub epsilon: f64,
    /// Value estimates, state-major
    pub values: Vec<Vec<f64>>,
}

impl Snapshot {
    /// Capture the table and current exploration rate as one atomic unit.
    #[must_use]
    pub fn capture(table: &QTable, epsilon: f64) -> Self {
        let values = table
            .values
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            state_count: STATE_COUNT,
            action_count: Action::COUNT,
            epsilon,
            values,
        }
    }

    /// Validate the snapshot and rebuild the table and exploration rate.
    pub fn into_table(self) -> Result<(QTable, f64)> {
        if self.version != SNAPSHOT_VERSION {
            return Err(LineFollowError::SnapshotVersion(self.version));
        }
        let rows_consistent = self.values.len() == self.state_count
            && self.values.iter().all(|row| row.len() == self.action_count);
        if self.state_count != STATE_COUNT || self.action_count != Action::COUNT || !rows_consistent
        {
            return Err(LineFollowError::SnapshotDimensionMismatch {
                expected_states: STATE_COUNT,
                expected_actions: Action::COUNT,
                found_states: self.state_count,
                found_actions: self.action_count,
            });
        }
        let flat: Vec<f64> = self.values.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((STATE_COUNT, Action::COUNT), flat)
            .map_err(|err| LineFollowError::Other(err.into()))?;
        Ok((QTable { values }, self.epsilon))
    }

    /// Write the snapshot atomically: serialize to a sibling temp file,
    /// then rename over the target path.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }

    /// Read a snapshot from disk.
    ///
    /// Returns `Ok(None)` when no file exists at `path`, leaving the caller
    /// free to start from a fresh zero table.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot: Self = serde_json::from_str(&json)?;
        Ok(Some(snapshot))
    }
}
