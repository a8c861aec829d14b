use std::path::Path;

use ballistic_diffeq::SolverError;
use csv::Writer;
use serde::Serialize;
use thiserror::Error;

use crate::{
    energy::EnergyHistory,
    parameters::WalkerParameters,
    simulation::{IntegrationStatus, SwingRun},
    sweep::SweepOutcome,
};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("plot error: {0}")]
    Plot(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("trajectory has {samples} samples but energy history has {energies}")]
    LengthMismatch { samples: usize, energies: usize },
}

#[derive(Serialize)]
struct TrajectoryRow {
    t: f64,
    q1: f64,
    q2: f64,
    q3: f64,
    u1: f64,
    u2: f64,
    u3: f64,
    kinetic: f64,
    potential: f64,
    total: f64,
}

/// Writes one row per sample: time, state in rad and rad/s, and the energies.
pub fn write_trajectory_csv<P: AsRef<Path>>(
    path: P,
    run: &SwingRun,
    energies: &EnergyHistory,
) -> Result<(), OutputError> {
    let trajectory = &run.trajectory;
    if trajectory.len() != energies.len() {
        return Err(OutputError::LengthMismatch {
            samples: trajectory.len(),
            energies: energies.len(),
        });
    }

    let mut writer = Writer::from_path(path)?;
    for ((t, x), e) in trajectory
        .times()
        .iter()
        .zip(trajectory.states())
        .zip(&energies.energies)
    {
        writer.serialize(TrajectoryRow {
            t: *t,
            q1: x[0],
            q2: x[1],
            q3: x[2],
            u1: x[3],
            u2: x[4],
            u3: x[5],
            kinetic: e.kinetic,
            potential: e.potential,
            total: e.total,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SweepRow {
    run: usize,
    q1_deg: f64,
    q2_deg: f64,
    q3_deg: f64,
    u1_deg: f64,
    u2_deg: f64,
    u3_deg: f64,
    status: &'static str,
    t_end: Option<f64>,
    samples: usize,
    max_energy_drift: Option<f64>,
    message: String,
}

/// One summary row per sweep run, in run order.
pub fn write_sweep_summary<P: AsRef<Path>>(
    path: P,
    params: &WalkerParameters,
    outcomes: &[SweepOutcome],
) -> Result<(), OutputError> {
    let mut writer = Writer::from_path(path)?;
    for outcome in outcomes {
        let [q1_deg, q2_deg, q3_deg] = outcome.initial.angles_deg;
        let [u1_deg, u2_deg, u3_deg] = outcome.initial.rates_deg;
        let row = match &outcome.run {
            Ok(run) => SweepRow {
                run: outcome.index,
                q1_deg,
                q2_deg,
                q3_deg,
                u1_deg,
                u2_deg,
                u3_deg,
                status: run.status.label(),
                t_end: run.trajectory.last().map(|(t, _)| t),
                samples: run.trajectory.len(),
                max_energy_drift: (!run.trajectory.is_empty())
                    .then(|| run.energies(params).max_relative_drift()),
                message: match &run.status {
                    IntegrationStatus::FailedNumerically(failure) => failure.to_string(),
                    _ => String::new(),
                },
            },
            Err(e) => SweepRow {
                run: outcome.index,
                q1_deg,
                q2_deg,
                q3_deg,
                u1_deg,
                u2_deg,
                u3_deg,
                status: "rejected",
                t_end: None,
                samples: 0,
                max_energy_drift: None,
                message: e.to_string(),
            },
        };
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parameters::WalkerConfig, simulation::SwingSimulation, state::InitialConditions};

    #[test]
    fn trajectory_csv_columns() {
        let params = WalkerParameters::from_config(&WalkerConfig::default()).unwrap();
        let run = SwingSimulation::default()
            .with_tspan(0.0, 0.02)
            .with_save_interval(0.01)
            .run(&params, &InitialConditions::default().to_state())
            .unwrap();
        let energies = run.energies(&params);

        let path = std::env::temp_dir().join("ballistic_walker_trajectory_test.csv");
        write_trajectory_csv(&path, &run, &energies).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "t,q1,q2,q3,u1,u2,u3,kinetic,potential,total");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("0.0,"));
    }

    #[test]
    fn length_mismatch() {
        let params = WalkerParameters::from_config(&WalkerConfig::default()).unwrap();
        let run = SwingSimulation::default()
            .with_tspan(0.0, 0.01)
            .run(&params, &InitialConditions::default().to_state())
            .unwrap();
        let path = std::env::temp_dir().join("ballistic_walker_mismatch_test.csv");
        let err = write_trajectory_csv(&path, &run, &EnergyHistory::default()).unwrap_err();
        assert!(matches!(err, OutputError::LengthMismatch { energies: 0, .. }));
    }
}
