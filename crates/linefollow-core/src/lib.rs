//! Core types for the line-follower Q-learning client
//!
//! This crate holds the domain vocabulary shared by the agent and the
//! simulator client: sensor readings, the discrete state encoding, the
//! action enumeration with its wheel-speed mapping, the reward table,
//! and the common error type.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod error;
pub mod reward;
pub mod sensor;
pub mod state;
pub mod transition;

// Re-export core types
pub use action::{Action, STOP_SPEEDS};
pub use error::{LineFollowError, Result};
pub use reward::{reward_for, Reward, OFF_TRACK_PENALTY};
pub use sensor::{SensorReading, CHANNEL_COUNT};
pub use state::{encode, State, LINE_THRESHOLD, STATE_COUNT};
pub use transition::Transition;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        encode, reward_for, Action, LineFollowError, Result, Reward, SensorReading, State,
        Transition,
    };
}
