//! Propagation model of the ground wave

use serde::{Deserialize, Serialize};

use crate::core::constants::SIGNAL_VELOCITY_M_PER_NS;

/// Constant propagation speed converting between distance and travel time.
///
/// Distances are in meters, times in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalVelocity {
    meters_per_ns: f64,
}

impl Default for SignalVelocity {
    fn default() -> Self {
        Self { meters_per_ns: SIGNAL_VELOCITY_M_PER_NS }
    }
}

impl SignalVelocity {
    pub fn new(meters_per_ns: f64) -> Self {
        Self { meters_per_ns }
    }

    pub fn meters_per_ns(&self) -> f64 {
        self.meters_per_ns
    }

    /// Travel time in nanoseconds over `distance` meters
    pub fn get_distance_time(&self, distance: f64) -> f64 {
        distance / self.meters_per_ns
    }

    /// Distance in meters covered in `time` nanoseconds
    pub fn get_time_distance(&self, time: f64) -> f64 {
        time * self.meters_per_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use proptest::prelude::*;

    #[test]
    fn test_get_distance_time() {
        let velocity = SignalVelocity::default();
        assert_approx_eq!(velocity.get_distance_time(10_000.0), 33_440.0, 0.5);
    }

    #[test]
    fn test_get_time_distance() {
        let velocity = SignalVelocity::default();
        assert_approx_eq!(velocity.get_time_distance(100.0), 29.904, 1e-9);
    }

    proptest! {
        #[test]
        fn prop_time_and_distance_are_inverse(distance in 0.0f64..2.0e7) {
            let velocity = SignalVelocity::default();
            let back = velocity.get_time_distance(velocity.get_distance_time(distance));
            prop_assert!((back - distance).abs() <= 1e-9 * distance.max(1.0));
        }
    }
}
