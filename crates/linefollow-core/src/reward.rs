//! Reward shaping over discrete line states

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Reward for states matching none of the listed patterns (robot fully
/// off the line).
pub const OFF_TRACK_PENALTY: f64 = -20.0;

/// Scalar reward signal.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// Create a new reward
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Get the reward value
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Reward {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Reward> for f64 {
    fn from(reward: Reward) -> Self {
        reward.0
    }
}

/// Hand-authored state-pattern rules, highest priority first.
const REWARD_RULES: &[(&[u8], f64)] = &[
    // Center channel only: on the line.
    (&[0b00100], 20.0),
    // Line drifting one channel off center.
    (&[0b01100, 0b00110], 10.0),
    // Line under an inner channel only.
    (&[0b01000, 0b00010], 5.0),
    // Line out at a corner channel.
    (&[0b10000, 0b00001], -5.0),
];

/// Reward for arriving in `state`.
///
/// Evaluates the pattern rules in priority order, first match wins; any
/// state matching no rule earns [`OFF_TRACK_PENALTY`]. Total over the state
/// domain and a pure function of the state value.
#[must_use]
pub fn reward_for(state: State) -> Reward {
    for (patterns, value) in REWARD_RULES {
        if patterns.contains(&state.0) {
            return Reward(*value);
        }
    }
    Reward(OFF_TRACK_PENALTY)
}
