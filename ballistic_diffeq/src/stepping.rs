use tolerance::{Tolerance, Tolerances};

use crate::state::OdeState;

/// Adaptive step size controller.
///
/// Steps are accepted when the normalized RMS error is at most 1. The next step
/// size follows `safety * error^(-1 / (order + 1))`, clamped to the growth limits.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveStepControl {
    /// Relative tolerance used for error estimation.
    pub rel_tol: f64,
    /// Absolute tolerance used for error estimation.
    pub abs_tol: f64,
    /// First trial step. Estimated from the initial derivative when `None`.
    pub initial_dt: Option<f64>,
    /// Steps smaller than this end the run as a step size underflow.
    pub min_dt: f64,
    /// Optional maximum allowed step size.
    pub max_dt: Option<f64>,
    /// Upper bound on attempted (accepted + rejected) steps.
    pub max_steps: usize,
    pub safety: f64,
    pub min_growth: f64,
    pub max_growth: f64,
}

impl Default for AdaptiveStepControl {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-9,
            initial_dt: None,
            min_dt: 1e-14,
            max_dt: None,
            max_steps: 1_000_000,
            safety: 0.9,
            min_growth: 0.2,
            max_growth: 5.0,
        }
    }
}

impl AdaptiveStepControl {
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_initial_dt(mut self, dt: f64) -> Self {
        self.initial_dt = Some(dt);
        self
    }

    pub fn with_min_dt(mut self, min_dt: f64) -> Self {
        self.min_dt = min_dt;
        self
    }

    pub fn with_max_dt(mut self, max_dt: f64) -> Self {
        self.max_dt = Some(max_dt);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn tolerances(&self) -> Tolerances {
        Tolerances::new(self.rel_tol, self.abs_tol)
    }

    /// Computes the next step size from the step just attempted.
    ///
    /// - `dt`: step size just attempted
    /// - `error`: normalized RMS error of that step
    /// - `order`: order of the embedded error estimate
    pub fn next_dt(&self, dt: f64, error: f64, order: usize) -> f64 {
        let mut factor = if error <= 0.0 {
            self.max_growth
        } else {
            self.safety * error.powf(-1.0 / (order as f64 + 1.0))
        };
        factor = factor.clamp(self.min_growth, self.max_growth);
        if error > 1.0 {
            // never grow after a rejection
            factor = factor.min(1.0);
        }
        let mut new_dt = dt * factor;
        if let Some(max_dt) = self.max_dt {
            new_dt = new_dt.min(max_dt);
        }
        new_dt
    }

    /// Initial step guess from the magnitudes of the state and its derivative,
    /// both measured in units of the tolerances.
    pub fn starting_dt<State: OdeState>(
        &self,
        tolerances: &State::Tolerance,
        x0: &State,
        dx0: &State,
        span: f64,
    ) -> f64 {
        let mut dt = if let Some(dt) = self.initial_dt {
            dt
        } else {
            let d0 = tolerances.compute_error(x0, x0, x0, self.rel_tol, self.abs_tol);
            let d1 = tolerances.compute_error(x0, x0, dx0, self.rel_tol, self.abs_tol);
            if d0 < 1e-5 || d1 < 1e-5 {
                1e-6
            } else {
                0.01 * d0 / d1
            }
        };
        if let Some(max_dt) = self.max_dt {
            dt = dt.min(max_dt);
        }
        dt.min(span).max(self.min_dt)
    }

    pub fn is_valid(&self) -> bool {
        self.tolerances().is_valid()
            && self.min_dt.is_finite()
            && self.min_dt > 0.0
            && self.max_dt.is_none_or(|m| m.is_finite() && m > self.min_dt)
            && self.initial_dt.is_none_or(|dt| dt.is_finite() && dt > 0.0)
            && self.max_steps > 0
            && self.safety > 0.0
            && self.safety <= 1.0
            && self.min_growth > 0.0
            && self.min_growth <= 1.0
            && self.max_growth >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn step_grows_on_small_error() {
        let control = AdaptiveStepControl::default();
        let dt = control.next_dt(0.01, 1e-3, 4);
        assert!(dt > 0.01);
        assert!(dt <= 0.01 * control.max_growth);
    }

    #[test]
    fn step_shrinks_on_rejection() {
        let control = AdaptiveStepControl::default();
        let dt = control.next_dt(0.01, 50.0, 4);
        assert!(dt < 0.01);
        assert!(dt >= 0.01 * control.min_growth - 1e-18);
    }

    #[test]
    fn zero_error_uses_max_growth() {
        let control = AdaptiveStepControl::default();
        assert_abs_diff_eq!(control.next_dt(0.01, 0.0, 4), 0.05, epsilon = 1e-15);
    }

    #[test]
    fn max_dt_caps_growth() {
        let control = AdaptiveStepControl::default().with_max_dt(0.011);
        assert_abs_diff_eq!(control.next_dt(0.01, 0.0, 4), 0.011, epsilon = 1e-15);
    }

    #[test]
    fn validation() {
        assert!(AdaptiveStepControl::default().is_valid());
        assert!(!AdaptiveStepControl::default().with_rel_tol(-1.0).is_valid());
        assert!(!AdaptiveStepControl::default().with_min_dt(0.0).is_valid());
        assert!(!AdaptiveStepControl::default().with_max_steps(0).is_valid());
    }
}
