//! Sensor readings from the simulator's line-sensor array

use serde::{Deserialize, Serialize};

/// Number of line-sensor channels on the robot
pub const CHANNEL_COUNT: usize = 5;

/// One frame of line-sensor intensities, each in `[0.0, 1.0]`.
///
/// Field order matches the physical layout of the sensor bar, outermost
/// left channel first. The wire protocol carries these as a named JSON
/// object under the `"sensors"` key of a `sensor_update` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Outermost left channel
    pub left_corner: f64,
    /// Inner left channel
    pub left: f64,
    /// Center channel
    pub middle: f64,
    /// Inner right channel
    pub right: f64,
    /// Outermost right channel
    pub right_corner: f64,
}

impl SensorReading {
    /// Create a reading from individual channel intensities.
    #[must_use]
    pub fn new(left_corner: f64, left: f64, middle: f64, right: f64, right_corner: f64) -> Self {
        Self {
            left_corner,
            left,
            middle,
            right,
            right_corner,
        }
    }

    /// Channel intensities in the fixed encoding order, leftmost first.
    ///
    /// This order is load-bearing: the state encoder packs bits from it
    /// most-significant-first.
    #[must_use]
    pub fn channels(&self) -> [f64; CHANNEL_COUNT] {
        [
            self.left_corner,
            self.left,
            self.middle,
            self.right,
            self.right_corner,
        ]
    }
}
