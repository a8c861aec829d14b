use std::{
    fmt::Debug,
    ops::{AddAssign, MulAssign},
};

use tolerance::Tolerance;

pub mod state_array;

/// Trait representing an integrable state for use in ODE solvers.
///
/// The solvers only ever scale, accumulate and copy states, so the required
/// arithmetic is kept to in-place operations on preallocated buffers. The
/// derivative of a state is represented by the same type.
pub trait OdeState:
    Clone + Debug + MulAssign<f64> + for<'a> AddAssign<&'a Self> + Send + 'static
{
    /// The tolerance model associated with the state, used for error estimation.
    type Tolerance: Tolerance<State = Self>;

    /// Flat view of the state components, used for output and finiteness checks.
    fn as_slice(&self) -> &[f64];

    fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|x| x.is_finite())
    }
}
