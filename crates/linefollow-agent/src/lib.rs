//! Tabular Q-learning agent for the line-follower client
//!
//! This crate provides the learning half of the control loop:
//! - a dense action-value table with epsilon-greedy selection and the
//!   Bellman update rule
//! - versioned snapshot persistence so a learned policy survives runs
//! - exploration-rate schedules for epsilon decay

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod qtable;
pub mod schedule;
pub mod snapshot;

// Re-export agent components
pub use qtable::{QLearningConfig, QTable};
pub use schedule::{ConstantSchedule, ExponentialSchedule, LinearSchedule, Schedule};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{QLearningConfig, QTable, Schedule, Snapshot};
    pub use linefollow_core::prelude::*;
}
