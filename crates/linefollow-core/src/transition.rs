//! One step of experience

use serde::{Deserialize, Serialize};

use crate::{Action, Reward, State};

/// A single `(state, action, reward, next_state)` step.
///
/// Built once per tick when a previous step exists, consumed by exactly
/// one Bellman update and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// State the action was taken from
    pub state: State,
    /// Action taken
    pub action: Action,
    /// Reward observed after acting
    pub reward: Reward,
    /// State the action led to
    pub next_state: State,
}

impl Transition {
    /// Create a new transition
    #[must_use]
    pub fn new(state: State, action: Action, reward: Reward, next_state: State) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
        }
    }
}
