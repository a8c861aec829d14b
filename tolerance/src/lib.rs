/// Relative and absolute tolerance pair used to scale local error estimates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub rel_tol: f64,
    pub abs_tol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-9,
        }
    }
}

impl Tolerances {
    pub fn new(rel_tol: f64, abs_tol: f64) -> Self {
        Self { rel_tol, abs_tol }
    }

    /// Scaled error of a single component, see [`compute_error`].
    pub fn compute_error(&self, x_prev: f64, x: f64, x_err: f64) -> f64 {
        compute_error(x_prev, x, x_err, self.rel_tol, self.abs_tol)
    }

    pub fn check_error(&self, x0: f64, xf: f64) -> bool {
        check_error(x0, xf, self.rel_tol, self.abs_tol)
    }

    /// Both tolerances must be finite and non-negative, and at least one positive.
    pub fn is_valid(&self) -> bool {
        self.rel_tol.is_finite()
            && self.abs_tol.is_finite()
            && self.rel_tol >= 0.0
            && self.abs_tol >= 0.0
            && (self.rel_tol > 0.0 || self.abs_tol > 0.0)
    }
}

/// Implemented by state types that know how to reduce a step's error estimate
/// to a single normalized number. Values <= 1.0 mean the step is accepted.
pub trait Tolerance: Default {
    type State;
    fn compute_error(
        &self,
        x_prev: &Self::State,
        x: &Self::State,
        x_err: &Self::State,
        rel_tol: f64,
        abs_tol: f64,
    ) -> f64;
}

/// Ratio of the error estimate `x_err` to the allowed error for a component
/// that moved from `x_prev` to `x` during the step.
pub fn compute_error(x_prev: f64, x: f64, x_err: f64, rel_tol: f64, abs_tol: f64) -> f64 {
    let scale = abs_tol + rel_tol * x_prev.abs().max(x.abs());
    if scale > 0.0 {
        x_err.abs() / scale
    } else {
        x_err.abs()
    }
}

/// True if `xf` is within `abs_tol` of `x0` or within `rel_tol` relative to `x0`.
pub fn check_error(x0: f64, xf: f64, rel_tol: f64, abs_tol: f64) -> bool {
    let abs_diff = (xf - x0).abs();
    let rel_diff = if x0.abs() > 1e-10 {
        abs_diff / x0.abs()
    } else {
        f64::INFINITY
    };
    abs_diff <= abs_tol || rel_diff <= rel_tol
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn error_scales_with_larger_magnitude() {
        let e = compute_error(1.0, -4.0, 2e-6, 1e-6, 0.0);
        assert_abs_diff_eq!(e, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn error_uses_abs_tol_near_zero() {
        let e = compute_error(0.0, 0.0, 1e-9, 1e-6, 1e-9);
        assert_abs_diff_eq!(e, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn check_error_relative_or_absolute() {
        assert!(check_error(100.0, 100.0001, 1e-5, 0.0));
        assert!(!check_error(100.0, 100.01, 1e-5, 0.0));
        assert!(check_error(0.0, 1e-12, 1e-6, 1e-9));
        assert!(!check_error(0.0, 1e-3, 1e-6, 1e-9));
    }

    #[test]
    fn validity() {
        assert!(Tolerances::default().is_valid());
        assert!(!Tolerances::new(0.0, 0.0).is_valid());
        assert!(!Tolerances::new(-1.0, 1e-6).is_valid());
        assert!(!Tolerances::new(f64::NAN, 1e-6).is_valid());
    }
}
