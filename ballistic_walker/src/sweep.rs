use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    parameters::WalkerParameters,
    simulation::{IntegrationStatus, SimulationError, SwingRun, SwingSimulation},
    state::InitialConditions,
};

/// One initial condition of a sweep and what became of it.
#[derive(Debug)]
pub struct SweepOutcome {
    pub index: usize,
    pub initial: InitialConditions,
    pub run: Result<SwingRun, SimulationError>,
}

/// Many swings from different initial conditions against one parameter set.
#[derive(Debug, Clone)]
pub struct Sweep {
    simulation: SwingSimulation,
    initial_conditions: Vec<InitialConditions>,
}

impl Sweep {
    pub fn new(simulation: SwingSimulation, initial_conditions: Vec<InitialConditions>) -> Self {
        Self {
            simulation,
            initial_conditions,
        }
    }

    pub fn len(&self) -> usize {
        self.initial_conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial_conditions.is_empty()
    }

    /// Runs every swing in parallel. Outcomes come back in input order.
    pub fn run(&self, params: &WalkerParameters) -> Vec<SweepOutcome> {
        info!(runs = self.len(), "starting sweep");

        let mut outcomes: Vec<SweepOutcome> = self
            .initial_conditions
            .iter()
            .enumerate()
            .par_bridge()
            .map(|(index, initial)| {
                let run = self.simulation.run(params, &initial.to_state());
                debug!(index, "sweep run finished");
                SweepOutcome {
                    index,
                    initial: *initial,
                    run,
                }
            })
            .collect();
        outcomes.sort_by_key(|outcome| outcome.index);

        let summary = SweepSummary::from_outcomes(&outcomes);
        info!(
            terminated = summary.terminated,
            completed = summary.completed,
            failed = summary.failed,
            rejected = summary.rejected,
            "sweep finished"
        );
        outcomes
    }
}

/// Counts of how the runs of a sweep ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub terminated: usize,
    pub completed: usize,
    pub failed: usize,
    /// Requests that were invalid and never integrated.
    pub rejected: usize,
}

impl SweepSummary {
    pub fn from_outcomes(outcomes: &[SweepOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match &outcome.run {
                Ok(run) => match run.status {
                    IntegrationStatus::TerminatedByEvent { .. } => summary.terminated += 1,
                    IntegrationStatus::CompletedAtTf { .. } => summary.completed += 1,
                    IntegrationStatus::FailedNumerically(_) => summary.failed += 1,
                },
                Err(_) => summary.rejected += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.terminated + self.completed + self.failed + self.rejected
    }
}
