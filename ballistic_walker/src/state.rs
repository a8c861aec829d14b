use ballistic_diffeq::state::state_array::StateArray;
use serde::{Deserialize, Serialize};

/// `[q1, q2, q3, u1, u2, u3]` in rad and rad/s.
///
/// q1 is the stance leg angle from the upward vertical, q2 and q3 are the swing
/// thigh and shank angles from the downward vertical, all counter-clockwise
/// positive with x pointing forward.
pub type WalkerState = StateArray<6>;

pub const STATE_LABELS: [&str; 6] = ["q1", "q2", "q3", "u1", "u2", "u3"];

pub fn walker_state(angles: [f64; 3], rates: [f64; 3]) -> WalkerState {
    StateArray::new([
        angles[0], angles[1], angles[2], rates[0], rates[1], rates[2],
    ])
}

pub fn angles(state: &WalkerState) -> [f64; 3] {
    [state[0], state[1], state[2]]
}

pub fn rates(state: &WalkerState) -> [f64; 3] {
    [state[3], state[4], state[5]]
}

/// Same configuration, every rate negated.
pub fn with_reversed_rates(state: &WalkerState) -> WalkerState {
    let mut reversed = *state;
    for rate in &mut reversed[3..] {
        *rate = -*rate;
    }
    reversed
}

/// Initial conditions as a user writes them, in degrees and degrees per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub angles_deg: [f64; 3],
    pub rates_deg: [f64; 3],
}

impl Default for InitialConditions {
    /// Start of swing for a normal walking stride.
    fn default() -> Self {
        Self {
            angles_deg: [14.0, -14.0, -60.0],
            rates_deg: [-50.0, 250.0, -150.0],
        }
    }
}

impl InitialConditions {
    pub fn new(angles_deg: [f64; 3], rates_deg: [f64; 3]) -> Self {
        Self {
            angles_deg,
            rates_deg,
        }
    }

    pub fn to_state(&self) -> WalkerState {
        walker_state(
            self.angles_deg.map(f64::to_radians),
            self.rates_deg.map(f64::to_radians),
        )
    }

    pub fn from_state(state: &WalkerState) -> Self {
        Self {
            angles_deg: angles(state).map(f64::to_degrees),
            rates_deg: rates(state).map(f64::to_degrees),
        }
    }
}
