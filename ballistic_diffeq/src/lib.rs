use std::{error::Error, fmt::Debug};

use thiserror::Error;

/// Submodules for core ODE system components.
pub mod dense;
pub mod events;
pub mod rk;
pub mod saving;
pub mod solvers;
pub mod state;
pub mod stepping;
pub mod tableau;

use crate::events::{ContinuousEvent, EventManager, EventRecord};
use crate::saving::{MemoryResult, SaveMethod};
use crate::solvers::Solver;
use crate::state::OdeState;
use crate::stepping::AdaptiveStepControl;

/// Trait for defining a dynamical system model that can be numerically integrated.
///
/// Types implementing this trait must define how to compute the derivative (or RHS function)
/// of the ODE at a given time and state. A failed evaluation ends the solve and is
/// reported in the solution status, together with the state that caused it.
pub trait OdeModel: Debug {
    type State: OdeState;
    type Error: Error + Send + Sync + 'static;
    /// Compute the derivative at time `t` and state `state`, storing the result in `derivative`.
    fn f(
        &mut self,
        t: f64,
        state: &Self::State,
        derivative: &mut Self::State,
    ) -> Result<(), Self::Error>;
}

/// Problems with the solve request itself, detected before any step is taken,
/// and failures writing results.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{headers} headers for a state with {values} components")]
    HeaderMismatch { headers: usize, values: usize },
    #[error("initial state is not finite")]
    InitialStateNotFinite,
    #[error("invalid save interval {0}")]
    InvalidSaveInterval(f64),
    #[error("save interval {dt} needs {samples:e} samples, more than the step budget of {limit}")]
    SaveIntervalTooSmall { dt: f64, samples: f64, limit: usize },
    #[error("invalid step control settings")]
    InvalidStepControl,
    #[error("invalid time span ({0}, {1}), the final time must be finite and after the start")]
    InvalidTimeSpan(f64, f64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a solve ended before reaching the final time or a terminating event.
#[derive(Debug, Error)]
pub enum SolveFailure<State: Debug, E: Error + 'static> {
    #[error("model evaluation failed at t = {t}: {source}")]
    Model {
        t: f64,
        state: State,
        #[source]
        source: E,
    },
    #[error("step size {dt} fell below the minimum at t = {t}")]
    StepSizeUnderflow { t: f64, dt: f64 },
    #[error("exceeded {steps} steps at t = {t}")]
    MaxStepsExceeded { t: f64, steps: usize },
    #[error("state became non-finite after t = {t}")]
    NonFiniteState { t: f64 },
}

impl<State: Debug, E: Error + 'static> SolveFailure<State, E> {
    pub fn time(&self) -> f64 {
        match self {
            SolveFailure::Model { t, .. }
            | SolveFailure::StepSizeUnderflow { t, .. }
            | SolveFailure::MaxStepsExceeded { t, .. }
            | SolveFailure::NonFiniteState { t } => *t,
        }
    }
}

/// How a solve ended.
#[derive(Debug)]
pub enum SolveStatus<State: Debug, E: Error + 'static> {
    /// A terminating event fired at `t`.
    Terminated { event: String, t: f64 },
    /// Reached the final time without a terminating event.
    Completed,
    Failed(SolveFailure<State, E>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    pub accepted: usize,
    pub rejected: usize,
    /// Number of model evaluations.
    pub evaluations: usize,
}

/// Samples of a solve together with how it ended.
///
/// The samples are kept whatever the status, so a failed solve still shows
/// where it got to.
#[derive(Debug)]
pub struct OdeSolution<State: OdeState, E: Error + 'static> {
    pub result: MemoryResult<State>,
    pub status: SolveStatus<State, E>,
    pub stats: SolveStats,
    /// Non-terminating events that fired, in time order.
    pub events: Vec<EventRecord>,
}

/// Container for an ODE problem: the model and the events checked while solving it.
pub struct OdeProblem<Model>
where
    Model: OdeModel,
{
    pub model: Model,
    events: EventManager<Model::State>,
}

impl<Model> OdeProblem<Model>
where
    Model: OdeModel,
{
    /// Creates a new `OdeProblem` with no events.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            events: EventManager::new(),
        }
    }

    /// Adds a continuous event to the simulation.
    pub fn with_continuous_event(mut self, event: ContinuousEvent<Model::State>) -> Self {
        self.events.add_continuous(event);
        self
    }

    /// Solves the problem over `tspan` with adaptive steps.
    ///
    /// Returns `Err` only for an invalid request. Failures during integration are
    /// reported through the solution status.
    pub fn solve_adaptive(
        &mut self,
        x0: &Model::State,
        tspan: (f64, f64),
        step_control: AdaptiveStepControl,
        solver: Solver,
        save_method: SaveMethod,
    ) -> Result<OdeSolution<Model::State, Model::Error>, SolverError> {
        let (t0, tf) = tspan;
        if !t0.is_finite() || !tf.is_finite() || tf <= t0 {
            return Err(SolverError::InvalidTimeSpan(t0, tf));
        }
        if !step_control.is_valid() {
            return Err(SolverError::InvalidStepControl);
        }
        if let SaveMethod::Interval(dt) = save_method {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(SolverError::InvalidSaveInterval(dt));
            }
            let samples = (tf - t0) / dt;
            if samples > step_control.max_steps as f64 {
                return Err(SolverError::SaveIntervalTooSmall {
                    dt,
                    samples,
                    limit: step_control.max_steps,
                });
            }
        }
        if !x0.is_finite() {
            return Err(SolverError::InitialStateNotFinite);
        }

        Ok(solver.solve_adaptive(
            &mut self.model,
            x0,
            tspan,
            &step_control,
            &mut self.events,
            save_method,
        ))
    }
}
