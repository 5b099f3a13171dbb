//! Discrete control actions and their wheel-speed mapping

use serde::{Deserialize, Serialize};

/// Wheel speeds that bring the robot to a halt.
///
/// Used as the actuation fallback whenever no declared action applies,
/// and as the final command on shutdown.
pub const STOP_SPEEDS: (f64, f64) = (0.0, 0.0);

/// Closed set of control actions.
///
/// The declaration order is load-bearing: it is the policy table's column
/// index, the wire protocol's `Action` id, and the tie-break order for
/// greedy selection. Do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Drive straight ahead
    Forward,
    /// Gentle left turn
    Left,
    /// Gentle right turn
    Right,
    /// Tight left turn
    SharpLeft,
    /// Tight right turn
    SharpRight,
}

impl Action {
    /// All actions in enumeration order.
    pub const ALL: [Self; 5] = [
        Self::Forward,
        Self::Left,
        Self::Right,
        Self::SharpLeft,
        Self::SharpRight,
    ];

    /// Number of actions in the enumeration.
    pub const COUNT: usize = Self::ALL.len();

    /// Column index into the policy table, also the wire id.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Decode a table column or wire id back into an action.
    ///
    /// Returns `None` for undeclared ids; callers that must always actuate
    /// fall back to [`STOP_SPEEDS`].
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Differential wheel speeds `(left, right)` commanded by this action.
    #[must_use]
    pub fn wheel_speeds(self) -> (f64, f64) {
        match self {
            Self::Forward => (2.0, 2.0),
            Self::Left => (1.0, 2.0),
            Self::Right => (2.0, 1.0),
            Self::SharpLeft => (0.5, 2.0),
            Self::SharpRight => (2.0, 0.5),
        }
    }
}
