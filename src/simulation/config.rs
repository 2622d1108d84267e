//! Tunable parameters of the motion and demand models

use super::types::{
    DEFAULT_SPEED_LIMIT, MIN_SPEED, REACTION_TIME, SECURITY_DISTANCE, VEHICLE_LENGTH,
};

/// Parameters shared by the kinematics, congestion and generator code
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Vehicle length in meters
    pub vehicle_length: f64,
    /// Driver reaction time in seconds
    pub reaction_time: f64,
    /// Gap below which a follower starts braking
    pub security_distance: f64,
    /// Speed floor for transit time estimates on jammed edges
    pub min_speed: f64,
    /// Global arrival frequency (vehicles per second per site)
    pub frequency: f64,
    /// Whether generated vehicles drive back to their departure site
    pub round_trip: bool,
    /// Speed limit used by the map generator when none is given
    pub default_speed_limit: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            vehicle_length: VEHICLE_LENGTH,
            reaction_time: REACTION_TIME,
            security_distance: SECURITY_DISTANCE,
            min_speed: MIN_SPEED,
            frequency: 1.0,
            round_trip: false,
            default_speed_limit: DEFAULT_SPEED_LIMIT,
        }
    }
}

impl SimConfig {
    /// Car-following speed for a given gap to the vehicle ahead.
    ///
    /// Steady state of the braking relation used by the kinematics:
    /// a driver covering `gap - vehicle_length` within its reaction time.
    pub fn following_speed(&self, gap: f64) -> f64 {
        ((gap - self.vehicle_length) / self.reaction_time).max(0.0)
    }

    /// Braking advance for one tick given the gap to the vehicle ahead
    pub fn braking_advance(&self, gap: f64, delta_secs: f64) -> f64 {
        (gap - self.vehicle_length) / (1.0 + self.reaction_time / delta_secs)
    }
}
