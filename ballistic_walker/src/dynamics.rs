use ballistic_diffeq::OdeModel;
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::{
    parameters::{InertialCoefficients, WalkerParameters},
    state::{WalkerState, angles, rates},
};

/// Largest condition number of the mass matrix accepted by the linear solve.
pub const DEFAULT_MAX_CONDITION: f64 = 1e12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DynamicsError {
    #[error("mass matrix is not positive definite at t = {t}")]
    SingularMassMatrix { t: f64, state: WalkerState },
    #[error("mass matrix condition number {condition:e} exceeds {limit:e} at t = {t}")]
    IllConditioned {
        t: f64,
        condition: f64,
        limit: f64,
        state: WalkerState,
    },
    #[error("non-finite state or acceleration at t = {t}")]
    NonFinite { t: f64, state: WalkerState },
}

impl DynamicsError {
    pub fn time(&self) -> f64 {
        match self {
            DynamicsError::SingularMassMatrix { t, .. }
            | DynamicsError::IllConditioned { t, .. }
            | DynamicsError::NonFinite { t, .. } => *t,
        }
    }

    /// The state the dynamics were evaluated at.
    pub fn state(&self) -> &WalkerState {
        match self {
            DynamicsError::SingularMassMatrix { state, .. }
            | DynamicsError::IllConditioned { state, .. }
            | DynamicsError::NonFinite { state, .. } => state,
        }
    }
}

/// Configuration-dependent mass matrix. Symmetric, and positive definite for
/// physical parameters.
pub fn mass_matrix(c: &InertialCoefficients, q: [f64; 3]) -> Matrix3<f64> {
    let [q1, q2, q3] = q;
    let m12 = -c.a12 * (q1 - q2).cos();
    let m13 = -c.a13 * (q1 - q3).cos();
    let m23 = c.a23 * (q2 - q3).cos();
    Matrix3::new(
        c.m11, m12, m13, //
        m12, c.m22, m23, //
        m13, m23, c.m33,
    )
}

/// Generalized forces: velocity-product terms plus gravity, with the mass
/// matrix times the accelerations on the other side.
pub fn forcing(c: &InertialCoefficients, q: [f64; 3], u: [f64; 3]) -> Vector3<f64> {
    let [q1, q2, q3] = q;
    let [u1, u2, u3] = u;
    let g = c.gravity;
    Vector3::new(
        c.a12 * (q1 - q2).sin() * u2 * u2 + c.a13 * (q1 - q3).sin() * u3 * u3 + g * c.b1 * q1.sin(),
        c.a12 * (q2 - q1).sin() * u1 * u1 - c.a23 * (q2 - q3).sin() * u3 * u3 - g * c.b2 * q2.sin(),
        c.a13 * (q3 - q1).sin() * u1 * u1 - c.a23 * (q3 - q2).sin() * u2 * u2 - g * c.b3 * q3.sin(),
    )
}

/// Ratio of the largest to the smallest eigenvalue of a symmetric matrix, or
/// `None` when the smallest is not positive.
pub fn condition_number(m: &Matrix3<f64>) -> Option<f64> {
    let eigenvalues = m.symmetric_eigenvalues();
    let min = eigenvalues.min();
    if min > 0.0 {
        Some(eigenvalues.max() / min)
    } else {
        None
    }
}

/// Equations of motion of the swing phase as an ODE model.
///
/// Holds its own copy of the precomputed coefficients, so one parameter set
/// can back any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct SwingDynamics {
    coefficients: InertialCoefficients,
    max_condition: f64,
}

impl SwingDynamics {
    pub fn new(params: &WalkerParameters) -> Self {
        Self {
            coefficients: params.coefficients(),
            max_condition: DEFAULT_MAX_CONDITION,
        }
    }

    pub fn with_max_condition(mut self, max_condition: f64) -> Self {
        self.max_condition = max_condition;
        self
    }

    pub fn coefficients(&self) -> &InertialCoefficients {
        &self.coefficients
    }

    /// Angular accelerations `[u1', u2', u3']` at `state`.
    pub fn accelerations(&self, t: f64, state: &WalkerState) -> Result<Vector3<f64>, DynamicsError> {
        if state.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::NonFinite { t, state: *state });
        }
        let q = angles(state);
        let mm = mass_matrix(&self.coefficients, q);
        let rhs = forcing(&self.coefficients, q, rates(state));

        let condition = condition_number(&mm)
            .ok_or(DynamicsError::SingularMassMatrix { t, state: *state })?;
        if condition > self.max_condition {
            return Err(DynamicsError::IllConditioned {
                t,
                condition,
                limit: self.max_condition,
                state: *state,
            });
        }
        let cholesky = mm
            .cholesky()
            .ok_or(DynamicsError::SingularMassMatrix { t, state: *state })?;
        let udot = cholesky.solve(&rhs);

        if udot.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::NonFinite { t, state: *state });
        }
        Ok(udot)
    }
}

impl OdeModel for SwingDynamics {
    type State = WalkerState;
    type Error = DynamicsError;

    fn f(&mut self, t: f64, x: &WalkerState, dx: &mut WalkerState) -> Result<(), DynamicsError> {
        let udot = self.accelerations(t, x)?;
        dx[0] = x[3];
        dx[1] = x[4];
        dx[2] = x[5];
        dx[3] = udot[0];
        dx[4] = udot[1];
        dx[5] = udot[2];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parameters::WalkerConfig,
        state::{InitialConditions, walker_state},
    };
    use approx::assert_abs_diff_eq;

    fn dynamics() -> SwingDynamics {
        SwingDynamics::new(&WalkerParameters::from_config(&WalkerConfig::default()).unwrap())
    }

    #[test]
    fn mass_matrix_symmetric_positive_definite() {
        let model = dynamics();
        let step = 0.37;
        for i in 0..17 {
            for j in 0..17 {
                for k in 0..17 {
                    let q = [
                        -3.0 + step * i as f64,
                        -3.0 + step * j as f64,
                        -3.0 + step * k as f64,
                    ];
                    let mm = mass_matrix(model.coefficients(), q);
                    assert_eq!(mm, mm.transpose());
                    assert!(mm.cholesky().is_some(), "not positive definite at {q:?}");
                    let cond = condition_number(&mm).unwrap();
                    assert!(cond < 1e3);
                }
            }
        }
    }

    #[test]
    fn equilibrium_at_rest_hanging() {
        // stance leg upright, swing leg hanging straight down
        let mut model = dynamics();
        let x = walker_state([0.0; 3], [0.0; 3]);
        let mut dx = WalkerState::default();
        model.f(0.0, &x, &mut dx).unwrap();
        for v in dx.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn stance_leg_tips_away_from_vertical() {
        // q1 > 0 puts the hip behind the foot, gravity increases q1
        let model = dynamics();
        let x = walker_state([0.1, 0.0, 0.0], [0.0; 3]);
        let udot = model.accelerations(0.0, &x).unwrap();
        assert!(udot[0] > 0.0);
    }

    #[test]
    fn accelerations_satisfy_equations() {
        let model = dynamics();
        let x = InitialConditions::default().to_state();
        let udot = model.accelerations(0.0, &x).unwrap();
        let mm = mass_matrix(model.coefficients(), angles(&x));
        let rhs = forcing(model.coefficients(), angles(&x), rates(&x));
        let residual = mm * udot - rhs;
        assert!(residual.norm() < 1e-10 * rhs.norm().max(1.0));
    }

    #[test]
    fn non_finite_state_is_reported() {
        let model = dynamics();
        let x = walker_state([0.0, f64::NAN, 0.0], [0.0; 3]);
        let err = model.accelerations(0.25, &x).unwrap_err();
        assert!(matches!(err, DynamicsError::NonFinite { t, .. } if t == 0.25));
        assert!(err.state()[1].is_nan());
    }

    #[test]
    fn degenerate_parameters_are_singular() {
        // massless, inertia-free links make the mass matrix all zeros
        let mut c = *dynamics().coefficients();
        c.m11 = 0.0;
        c.m22 = 0.0;
        c.m33 = 0.0;
        c.a12 = 0.0;
        c.a13 = 0.0;
        c.a23 = 0.0;
        let model = SwingDynamics {
            coefficients: c,
            ..dynamics()
        };
        let x = walker_state([0.1, 0.2, 0.3], [0.0; 3]);
        let err = model.accelerations(1.0, &x).unwrap_err();
        assert!(matches!(err, DynamicsError::SingularMassMatrix { .. }));
        assert_eq!(err.time(), 1.0);
    }

    #[test]
    fn condition_limit_is_enforced() {
        let model = dynamics().with_max_condition(1.0);
        let x = walker_state([0.1, 0.2, 0.3], [0.0; 3]);
        let err = model.accelerations(0.0, &x).unwrap_err();
        assert!(matches!(err, DynamicsError::IllConditioned { limit, .. } if limit == 1.0));
    }
}
