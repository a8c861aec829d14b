use std::ops::{AddAssign, Deref, DerefMut, MulAssign};

use tolerance::{Tolerance, Tolerances, compute_error};

use super::OdeState;

/// A fixed-size array wrapper representing a generic state vector with `N` f64 components.
///
/// This type is commonly used as a concrete state for ODE solvers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateArray<const N: usize>([f64; N]);

impl<const N: usize> StateArray<N> {
    /// Constructs a new `StateArray` from an array of `f64`.
    pub fn new(array: [f64; N]) -> Self {
        Self(array)
    }

    pub fn into_inner(self) -> [f64; N] {
        self.0
    }
}

impl<const N: usize> Default for StateArray<N> {
    /// Creates a `StateArray` with all elements initialized to zero.
    fn default() -> Self {
        Self([0.0; N])
    }
}

impl<const N: usize> From<[f64; N]> for StateArray<N> {
    fn from(array: [f64; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> AddAssign<&Self> for StateArray<N> {
    /// Adds each element from the right-hand side into `self` in-place.
    fn add_assign(&mut self, rhs: &Self) {
        for i in 0..N {
            self.0[i] += rhs.0[i];
        }
    }
}

impl<const N: usize> MulAssign<f64> for StateArray<N> {
    /// Multiplies each element of the array in-place by the given scalar.
    fn mul_assign(&mut self, rhs: f64) {
        for i in 0..N {
            self.0[i] *= rhs;
        }
    }
}

impl<const N: usize> OdeState for StateArray<N> {
    type Tolerance = StateArrayTolerances<N>;

    fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl<const N: usize> Deref for StateArray<N> {
    type Target = [f64; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for StateArray<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Stores optional per-element tolerance strategies for a `StateArray`.
///
/// If an entry is `None`, the global absolute and relative tolerances are used for that component.
#[derive(Clone, Copy, Debug)]
pub struct StateArrayTolerances<const N: usize>(pub [Option<Tolerances>; N]);

impl<const N: usize> Tolerance for StateArrayTolerances<N> {
    type State = StateArray<N>;

    /// Root-mean-square of the per-component error ratios.
    fn compute_error(
        &self,
        x_prev: &StateArray<N>,
        x: &StateArray<N>,
        x_err: &StateArray<N>,
        rel_tol: f64,
        abs_tol: f64,
    ) -> f64 {
        if N == 0 {
            return 0.0;
        }

        let mut sum_squared_errors = 0.0;

        for (i, tol) in self.0.iter().enumerate() {
            let component_error = if let Some(tol) = tol {
                tol.compute_error(x_prev.0[i], x.0[i], x_err.0[i])
            } else {
                compute_error(x_prev.0[i], x.0[i], x_err.0[i], rel_tol, abs_tol)
            };

            sum_squared_errors += component_error * component_error;
        }

        (sum_squared_errors / N as f64).sqrt()
    }
}

impl<const N: usize> Default for StateArrayTolerances<N> {
    /// Creates a new `StateArrayTolerances` with no component-specific tolerances.
    fn default() -> Self {
        Self([None; N])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn arithmetic_in_place() {
        let mut x = StateArray::new([1.0, 2.0, 3.0]);
        x *= 2.0;
        x += &StateArray::new([0.5, 0.5, 0.5]);
        assert_eq!(x.into_inner(), [2.5, 4.5, 6.5]);
    }

    #[test]
    fn finiteness() {
        assert!(StateArray::new([0.0, 1.0]).is_finite());
        assert!(!StateArray::new([0.0, f64::NAN]).is_finite());
        assert!(!StateArray::new([f64::INFINITY, 1.0]).is_finite());
    }

    #[test]
    fn rms_error() {
        let tol = StateArrayTolerances::<2>::default();
        let x = StateArray::new([0.0, 0.0]);
        let err = StateArray::new([3e-6, 4e-6]);
        // abs_tol only: ratios 3 and 4
        let e = tol.compute_error(&x, &x, &err, 0.0, 1e-6);
        assert_abs_diff_eq!(e, (12.5f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn component_override() {
        let mut tol = StateArrayTolerances::<2>::default();
        tol.0[1] = Some(Tolerances::new(0.0, 1.0));
        let x = StateArray::new([0.0, 0.0]);
        let err = StateArray::new([1e-6, 1e-6]);
        let e = tol.compute_error(&x, &x, &err, 0.0, 1e-6);
        // first component ratio 1, second ratio 1e-6
        assert_abs_diff_eq!(e, (0.5f64 * (1.0 + 1e-12)).sqrt(), epsilon = 1e-12);
    }
}
