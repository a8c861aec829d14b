use ballistic_diffeq::events::{ContinuousEvent, EventAction, EventDirection};

use crate::state::WalkerState;

pub const KNEE_LOCK: &str = "knee_lock";

/// Knee flexion `q2 - q3`, positive while the knee is bent.
pub fn knee_flexion(state: &WalkerState) -> f64 {
    state[1] - state[2]
}

/// Stops the swing when the knee straightens, i.e. when `q2 - q3` falls through
/// zero. A knee that starts hyperextended and bends does not trigger it.
pub fn knee_lock_event() -> ContinuousEvent<WalkerState> {
    ContinuousEvent::new(KNEE_LOCK, |x: &WalkerState, _t| knee_flexion(x))
        .with_direction(EventDirection::Falling)
        .with_action(EventAction::Terminate)
        .with_tol(1e-12)
}
