use serde::Serialize;
use thiserror::Error;

use crate::{
    parameters::{InertialCoefficients, WalkerParameters},
    simulation::Trajectory,
    state::WalkerState,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnergyError {
    #[error("no samples to check")]
    Empty,
    #[error("energy drifted by {drift:e} (relative) at t = {t}, allowed {tol:e}")]
    NotConserved { t: f64, drift: f64, tol: f64 },
}

/// Mechanical energy of one state, J. Potential energy is zero with every
/// centre of mass at the height of the stance foot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Energy {
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
}

pub fn energy(c: &InertialCoefficients, state: &WalkerState) -> Energy {
    let [q1, q2, q3, u1, u2, u3] = state.into_inner();

    let kinetic = 0.5 * (c.m11 * u1 * u1 + c.m22 * u2 * u2 + c.m33 * u3 * u3)
        - c.a12 * (q1 - q2).cos() * u1 * u2
        - c.a13 * (q1 - q3).cos() * u1 * u3
        + c.a23 * (q2 - q3).cos() * u2 * u3;
    let potential = c.gravity * (c.b1 * q1.cos() - c.b2 * q2.cos() - c.b3 * q3.cos());

    Energy {
        kinetic,
        potential,
        total: kinetic + potential,
    }
}

/// Energies along a trajectory, one per sample.
#[derive(Debug, Clone, Default)]
pub struct EnergyHistory {
    pub t: Vec<f64>,
    pub energies: Vec<Energy>,
}

impl EnergyHistory {
    pub fn new(params: &WalkerParameters, trajectory: &Trajectory) -> Self {
        let c = params.coefficients();
        Self {
            t: trajectory.times().to_vec(),
            energies: trajectory.states().iter().map(|x| energy(&c, x)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn totals(&self) -> impl Iterator<Item = f64> + '_ {
        self.energies.iter().map(|e| e.total)
    }

    /// Drift of each sample from the initial total energy, relative to it.
    /// When the initial total is tiny the drift is absolute.
    pub fn relative_drift(&self) -> Vec<f64> {
        let Some(e0) = self.energies.first().map(|e| e.total) else {
            return Vec::new();
        };
        let scale = if e0.abs() > 1e-12 { e0.abs() } else { 1.0 };
        self.totals().map(|e| (e - e0).abs() / scale).collect()
    }

    pub fn max_relative_drift(&self) -> f64 {
        self.relative_drift().into_iter().fold(0.0, f64::max)
    }

    /// Fails at the first sample whose drift exceeds `rel_tol`.
    pub fn check_conservation(&self, rel_tol: f64) -> Result<(), EnergyError> {
        if self.is_empty() {
            return Err(EnergyError::Empty);
        }
        match self
            .relative_drift()
            .into_iter()
            .zip(&self.t)
            // NaN counts as drift
            .find(|(drift, _)| !(*drift <= rel_tol))
        {
            Some((drift, t)) => Err(EnergyError::NotConserved {
                t: *t,
                drift,
                tol: rel_tol,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dynamics::mass_matrix,
        parameters::WalkerConfig,
        state::{InitialConditions, angles, rates, walker_state},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    fn coefficients() -> InertialCoefficients {
        WalkerParameters::from_config(&WalkerConfig::default())
            .unwrap()
            .coefficients()
    }

    #[test]
    fn kinetic_is_quadratic_form_of_mass_matrix() {
        let c = coefficients();
        for x in [
            InitialConditions::default().to_state(),
            walker_state([0.3, -1.2, 2.0], [4.0, -3.0, 7.5]),
            walker_state([-2.5, 0.4, 0.4], [-1.0, 0.0, 9.0]),
        ] {
            let u = Vector3::from(rates(&x));
            let expected = 0.5 * u.dot(&(mass_matrix(&c, angles(&x)) * u));
            let e = energy(&c, &x);
            assert_abs_diff_eq!(e.kinetic, expected, epsilon = 1e-12 * expected.max(1.0));
            assert_abs_diff_eq!(e.total, e.kinetic + e.potential);
        }
    }

    #[test]
    fn potential_at_rest_upright() {
        let c = coefficients();
        let e = energy(&c, &walker_state([0.0; 3], [0.0; 3]));
        assert_eq!(e.kinetic, 0.0);
        assert_abs_diff_eq!(e.potential, c.gravity * (c.b1 - c.b2 - c.b3), epsilon = 1e-12);
        assert!(e.potential > 0.0);
    }

    #[test]
    fn swinging_shank_up_raises_potential() {
        let c = coefficients();
        let down = energy(&c, &walker_state([0.0, 0.0, 0.0], [0.0; 3]));
        let up = energy(&c, &walker_state([0.0, 0.0, 1.0], [0.0; 3]));
        assert!(up.potential > down.potential);
    }

    #[test]
    fn drift_and_conservation_check() {
        let e = |total| Energy {
            kinetic: 0.0,
            potential: total,
            total,
        };
        let history = EnergyHistory {
            t: vec![0.0, 0.1, 0.2],
            energies: vec![e(100.0), e(100.0 + 1e-5), e(100.0 - 3e-4)],
        };
        assert_abs_diff_eq!(history.max_relative_drift(), 3e-6, epsilon = 1e-15);
        assert!(history.check_conservation(1e-5).is_ok());
        match history.check_conservation(1e-6) {
            Err(EnergyError::NotConserved { t, .. }) => assert_eq!(t, 0.2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            EnergyHistory::default().check_conservation(1.0),
            Err(EnergyError::Empty)
        );
    }

    #[test]
    fn non_finite_energy_fails_check() {
        let history = EnergyHistory {
            t: vec![0.0, 0.1],
            energies: vec![
                Energy {
                    kinetic: 1.0,
                    potential: 1.0,
                    total: 2.0,
                },
                Energy {
                    kinetic: f64::NAN,
                    potential: 1.0,
                    total: f64::NAN,
                },
            ],
        };
        assert!(history.check_conservation(1e-3).is_err());
    }
}
