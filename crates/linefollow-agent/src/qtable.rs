//! Dense action-value table with epsilon-greedy selection

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use linefollow_core::{Action, LineFollowError, Result, Reward, State, STATE_COUNT};

/// Hyperparameters for the Q-learning update rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QLearningConfig {
    /// Step size of the Bellman update (alpha)
    pub learning_rate: f64,
    /// Weight of future value (gamma)
    pub discount_factor: f64,
    /// Chance of choosing a random action (epsilon)
    pub epsilon: f64,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.9,
            epsilon: 0.2,
        }
    }
}

/// Value estimates for every `(state, action)` pair.
///
/// The table is dense, `[STATE_COUNT x Action::COUNT]`, zero-initialized,
/// and exclusively owned by the control loop; updates are strictly
/// sequential, one per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    pub(crate) values: Array2<f64>,
}

impl QTable {
    /// Fresh zero-initialized table sized to the full state/action space.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Array2::zeros((STATE_COUNT, Action::COUNT)),
        }
    }

    /// Out-of-range states fail fast rather than being clamped or wrapped.
    fn row_index(state: State) -> Result<usize> {
        if state.in_range() {
            Ok(state.index())
        } else {
            Err(LineFollowError::InvalidState(state.index()))
        }
    }

    /// Stored value estimate for one `(state, action)` pair.
    pub fn value(&self, state: State, action: Action) -> Result<f64> {
        let row = Self::row_index(state)?;
        Ok(self.values[[row, action.index()]])
    }

    /// Best stored value over all actions in `state`.
    pub fn max_value(&self, state: State) -> Result<f64> {
        let row = self.values.row(Self::row_index(state)?);
        Ok(row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Value-maximizing action for `state`.
    ///
    /// Ties break toward the earliest member of the action enumeration,
    /// keeping exploitation deterministic and reproducible.
    pub fn greedy_action(&self, state: State) -> Result<Action> {
        let row = self.values.row(Self::row_index(state)?);
        let mut best = Action::ALL[0];
        let mut best_value = row[0];
        for (action, &value) in Action::ALL.iter().zip(row.iter()).skip(1) {
            if value > best_value {
                best = *action;
                best_value = value;
            }
        }
        Ok(best)
    }

    /// Epsilon-greedy action selection.
    ///
    /// With probability `epsilon` draws uniformly from the action
    /// enumeration, otherwise exploits via [`Self::greedy_action`].
    /// `epsilon = 0` is pure exploitation and consults no randomness.
    pub fn select_action(&self, state: State, epsilon: f64) -> Result<Action> {
        if epsilon > 0.0 {
            let mut rng = rand::thread_rng();
            if rng.gen::<f64>() < epsilon {
                return Ok(Action::ALL[rng.gen_range(0..Action::COUNT)]);
            }
        }
        self.greedy_action(state)
    }

    /// One Bellman update:
    /// `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`.
    pub fn update(
        &mut self,
        state: State,
        action: Action,
        reward: Reward,
        next_state: State,
        learning_rate: f64,
        discount_factor: f64,
    ) -> Result<()> {
        let row = Self::row_index(state)?;
        let max_future = self.max_value(next_state)?;
        let cell = &mut self.values[[row, action.index()]];
        *cell += learning_rate * (reward.value() + discount_factor * max_future - *cell);
        Ok(())
    }
}

impl Default for QTable {
    fn default() -> Self {
        Self::new()
    }
}
