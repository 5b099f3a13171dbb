//! Discrete state encoding over thresholded sensor bits

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sensor::{SensorReading, CHANNEL_COUNT};

/// Intensity above this cut counts as "on the line".
pub const LINE_THRESHOLD: f64 = 0.3;

/// Number of reachable discrete states (`2^CHANNEL_COUNT`)
pub const STATE_COUNT: usize = 1 << CHANNEL_COUNT;

/// Discretized sensor pattern, in `[0, STATE_COUNT)`.
///
/// The inner value is the thresholded sensor bits packed
/// most-significant-first in channel order, so `left_corner` is bit 4 and
/// `right_corner` is bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct State(pub u8);

impl State {
    /// Row index into the policy table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether the id lies inside the state space.
    #[must_use]
    pub fn in_range(self) -> bool {
        (self.0 as usize) < STATE_COUNT
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05b}", self.0)
    }
}

/// Quantize a sensor reading into a discrete state.
///
/// Each channel is thresholded at [`LINE_THRESHOLD`] and the resulting bits
/// are packed most-significant-first in channel order, so a reading lighting
/// only the middle channel encodes to `0b00100`. Pure and deterministic: two
/// readings that threshold identically always yield the same state.
#[must_use]
pub fn encode(reading: &SensorReading) -> State {
    let mut bits = 0u8;
    for intensity in reading.channels() {
        bits = (bits << 1) | u8::from(intensity > LINE_THRESHOLD);
    }
    State(bits)
}
