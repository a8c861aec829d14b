use std::ops::Index;

use ballistic_diffeq::{
    OdeProblem, SolveFailure, SolveStats, SolveStatus, SolverError,
    saving::{MemoryResult, SaveMethod},
    solvers::Solver,
    stepping::AdaptiveStepControl,
};
use thiserror::Error;
use tolerance::Tolerances;
use tracing::{debug, info, warn};

use crate::{
    dynamics::{DEFAULT_MAX_CONDITION, DynamicsError, SwingDynamics},
    energy::EnergyHistory,
    events::knee_lock_event,
    parameters::WalkerParameters,
    state::{STATE_LABELS, WalkerState, with_reversed_rates},
};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("cannot reverse a run that never advanced past its first sample")]
    NothingToReverse,
}

/// Why a swing stopped before knee lock or the final time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NumericalFailure {
    #[error(transparent)]
    Dynamics(#[from] DynamicsError),
    #[error("step size {dt:e} fell below the minimum at t = {t}")]
    StepSizeUnderflow { t: f64, dt: f64 },
    #[error("exceeded {steps} steps at t = {t}")]
    MaxStepsExceeded { t: f64, steps: usize },
    #[error("state became non-finite after t = {t}")]
    NonFiniteState { t: f64 },
}

impl NumericalFailure {
    pub fn time(&self) -> f64 {
        match self {
            NumericalFailure::Dynamics(e) => e.time(),
            NumericalFailure::StepSizeUnderflow { t, .. }
            | NumericalFailure::MaxStepsExceeded { t, .. }
            | NumericalFailure::NonFiniteState { t } => *t,
        }
    }

    /// The offending state, when the failure came from evaluating the dynamics.
    pub fn state(&self) -> Option<&WalkerState> {
        match self {
            NumericalFailure::Dynamics(e) => Some(e.state()),
            _ => None,
        }
    }
}

impl From<SolveFailure<WalkerState, DynamicsError>> for NumericalFailure {
    fn from(failure: SolveFailure<WalkerState, DynamicsError>) -> Self {
        match failure {
            SolveFailure::Model { source, .. } => NumericalFailure::Dynamics(source),
            SolveFailure::StepSizeUnderflow { t, dt } => {
                NumericalFailure::StepSizeUnderflow { t, dt }
            }
            SolveFailure::MaxStepsExceeded { t, steps } => {
                NumericalFailure::MaxStepsExceeded { t, steps }
            }
            SolveFailure::NonFiniteState { t } => NumericalFailure::NonFiniteState { t },
        }
    }
}

/// How a swing run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationStatus {
    /// The knee locked at `t`.
    TerminatedByEvent { t: f64 },
    /// Reached the final time without the knee locking.
    CompletedAtTf { t: f64 },
    FailedNumerically(NumericalFailure),
}

impl IntegrationStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, IntegrationStatus::FailedNumerically(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            IntegrationStatus::TerminatedByEvent { .. } => "terminated_by_event",
            IntegrationStatus::CompletedAtTf { .. } => "completed_at_tf",
            IntegrationStatus::FailedNumerically(_) => "failed_numerically",
        }
    }
}

/// Time-ordered samples of a run.
#[derive(Debug, Clone)]
pub struct Trajectory {
    samples: MemoryResult<WalkerState>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.samples.t
    }

    pub fn states(&self) -> &[WalkerState] {
        &self.samples.y
    }

    pub fn state(&self, i: usize) -> Option<&WalkerState> {
        self.samples.y.get(i)
    }

    /// Component `k` of sample `i`, see [`WalkerState`] for the layout.
    pub fn coordinate(&self, i: usize, k: usize) -> Option<f64> {
        self.state(i).and_then(|x| x.get(k).copied())
    }

    /// Time history of component `k`.
    pub fn series(&self, k: usize) -> Vec<f64> {
        self.states().iter().map(|x| x[k]).collect()
    }

    /// Time history of angle `k` (0, 1 or 2) in degrees.
    pub fn angle_deg(&self, k: usize) -> Vec<f64> {
        self.states().iter().map(|x| x[k].to_degrees()).collect()
    }

    pub fn first(&self) -> Option<(f64, &WalkerState)> {
        Some((*self.samples.t.first()?, self.samples.y.first()?))
    }

    pub fn last(&self) -> Option<(f64, &WalkerState)> {
        self.samples.last()
    }

    /// Writes `t, q1, q2, q3, u1, u2, u3` rows to a CSV file.
    pub fn write_csv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), SolverError> {
        self.samples.write_csv(path, &STATE_LABELS)
    }
}

impl Index<usize> for Trajectory {
    type Output = WalkerState;

    fn index(&self, i: usize) -> &WalkerState {
        &self.samples.y[i]
    }
}

/// Result of one swing, kept whole even when it failed part way.
#[derive(Debug, Clone)]
pub struct SwingRun {
    pub trajectory: Trajectory,
    pub status: IntegrationStatus,
    pub stats: SolveStats,
}

impl SwingRun {
    pub fn knee_lock_time(&self) -> Option<f64> {
        match self.status {
            IntegrationStatus::TerminatedByEvent { t } => Some(t),
            _ => None,
        }
    }

    pub fn final_state(&self) -> Option<&WalkerState> {
        self.trajectory.last().map(|(_, x)| x)
    }

    /// Time of the last sample less the first.
    pub fn duration(&self) -> f64 {
        match (self.trajectory.first(), self.trajectory.last()) {
            (Some((t0, _)), Some((tf, _))) => tf - t0,
            _ => 0.0,
        }
    }

    pub fn energies(&self, params: &WalkerParameters) -> EnergyHistory {
        EnergyHistory::new(params, &self.trajectory)
    }

    /// Final state with the rates negated back, for comparing the end of a
    /// reversed run against the start of the forward one.
    pub fn reversed_state(&self) -> Option<WalkerState> {
        self.final_state().map(with_reversed_rates)
    }

    /// True when this reversed run lands back on `x0` within `tol`, componentwise.
    pub fn returns_to(&self, x0: &WalkerState, tol: &Tolerances) -> bool {
        self.reversed_state().is_some_and(|x| {
            x.iter()
                .zip(x0.iter())
                .all(|(xf, x0)| tol.check_error(*x0, *xf))
        })
    }
}

/// Settings for integrating swings. One value serves any number of runs.
#[derive(Debug, Clone, Copy)]
pub struct SwingSimulation {
    pub tspan: (f64, f64),
    pub step_control: AdaptiveStepControl,
    pub solver: Solver,
    pub save_method: SaveMethod,
    pub max_condition: f64,
}

impl Default for SwingSimulation {
    fn default() -> Self {
        Self {
            tspan: (0.0, 0.5),
            step_control: AdaptiveStepControl::default()
                .with_rel_tol(1e-10)
                .with_abs_tol(1e-12),
            solver: Solver::default(),
            save_method: SaveMethod::EveryStep,
            max_condition: DEFAULT_MAX_CONDITION,
        }
    }
}

impl SwingSimulation {
    pub fn with_tspan(mut self, t0: f64, tf: f64) -> Self {
        self.tspan = (t0, tf);
        self
    }

    pub fn with_tolerances(mut self, rel_tol: f64, abs_tol: f64) -> Self {
        self.step_control = self
            .step_control
            .with_rel_tol(rel_tol)
            .with_abs_tol(abs_tol);
        self
    }

    pub fn with_step_control(mut self, step_control: AdaptiveStepControl) -> Self {
        self.step_control = step_control;
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_save_interval(mut self, dt: f64) -> Self {
        self.save_method = SaveMethod::Interval(dt);
        self
    }

    pub fn with_max_condition(mut self, max_condition: f64) -> Self {
        self.max_condition = max_condition;
        self
    }

    /// Integrates one swing from `x0` until the knee locks or the final time.
    ///
    /// `Err` means the request itself was invalid. Numerical trouble during the
    /// swing is reported in the returned status, next to the samples obtained
    /// before it.
    pub fn run(&self, params: &WalkerParameters, x0: &WalkerState) -> Result<SwingRun, SimulationError> {
        info!(t0 = self.tspan.0, tf = self.tspan.1, solver = ?self.solver, "starting swing");
        let run = self.integrate(params, x0, self.tspan, true)?;
        log_outcome(&run);
        Ok(run)
    }

    /// Integrates backwards in time from the end of `forward`: rates negated,
    /// same duration, no knee-lock event.
    pub fn reverse(
        &self,
        params: &WalkerParameters,
        forward: &SwingRun,
    ) -> Result<SwingRun, SimulationError> {
        let (t0, tf, xf) = match (forward.trajectory.first(), forward.trajectory.last()) {
            (Some((t0, _)), Some((tf, xf))) if tf > t0 => (t0, tf, xf),
            _ => return Err(SimulationError::NothingToReverse),
        };
        let x_back = with_reversed_rates(xf);
        info!(duration = tf - t0, "starting reversed swing");
        let run = self.integrate(params, &x_back, (0.0, tf - t0), false)?;
        log_outcome(&run);
        Ok(run)
    }

    fn integrate(
        &self,
        params: &WalkerParameters,
        x0: &WalkerState,
        tspan: (f64, f64),
        knee_lock: bool,
    ) -> Result<SwingRun, SimulationError> {
        let model = SwingDynamics::new(params).with_max_condition(self.max_condition);
        let mut problem = OdeProblem::new(model);
        if knee_lock {
            problem = problem.with_continuous_event(knee_lock_event());
        }

        let solution =
            problem.solve_adaptive(x0, tspan, self.step_control, self.solver, self.save_method)?;

        let status = match solution.status {
            SolveStatus::Terminated { t, .. } => IntegrationStatus::TerminatedByEvent { t },
            SolveStatus::Completed => IntegrationStatus::CompletedAtTf { t: tspan.1 },
            SolveStatus::Failed(failure) => IntegrationStatus::FailedNumerically(failure.into()),
        };

        Ok(SwingRun {
            trajectory: Trajectory {
                samples: solution.result,
            },
            status,
            stats: solution.stats,
        })
    }
}

fn log_outcome(run: &SwingRun) {
    let stats = run.stats;
    match &run.status {
        IntegrationStatus::TerminatedByEvent { t } => info!(t, "knee locked"),
        IntegrationStatus::CompletedAtTf { t } => info!(t, "reached final time without knee lock"),
        IntegrationStatus::FailedNumerically(failure) => {
            warn!(t = failure.time(), %failure, "swing failed")
        }
    }
    debug!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        evaluations = stats.evaluations,
        samples = run.trajectory.len(),
        "integration statistics"
    );
}
