//! Error types shared across the line-follower crates

use std::path::PathBuf;

use thiserror::Error;

/// Error type for control, learning and persistence operations
#[derive(Error, Debug)]
pub enum LineFollowError {
    /// State id outside the configured state space
    #[error("invalid state id: {0}")]
    InvalidState(usize),

    /// Action id outside the action enumeration
    #[error("invalid action id: {0}")]
    InvalidAction(usize),

    /// Snapshot dimensions disagree with the configured table
    #[error("snapshot dimension mismatch: expected {expected_states}x{expected_actions}, found {found_states}x{found_actions}")]
    SnapshotDimensionMismatch {
        /// Configured state count
        expected_states: usize,
        /// Configured action count
        expected_actions: usize,
        /// State count declared by the snapshot
        found_states: usize,
        /// Action count declared by the snapshot
        found_actions: usize,
    },

    /// Snapshot format version this build does not understand
    #[error("unsupported snapshot version: {0}")]
    SnapshotVersion(u32),

    /// No snapshot at the given path when one is required
    #[error("no snapshot found at {}", .0.display())]
    SnapshotMissing(PathBuf),

    /// Unrecoverable transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for line-follower operations
pub type Result<T> = std::result::Result<T, LineFollowError>;
