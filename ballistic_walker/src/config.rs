use std::{fs, path::Path};

use ballistic_diffeq::solvers::Solver;
use ron::{
    from_str,
    ser::{PrettyConfig, to_string_pretty},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dynamics::DEFAULT_MAX_CONDITION,
    parameters::{ParameterError, WalkerConfig, WalkerParameters},
    simulation::SwingSimulation,
    state::InitialConditions,
    sweep::Sweep,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not write config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("invalid {name} {value}")]
    Invalid { name: &'static str, value: f64 },
}

/// Everything one invocation of the simulator needs, stored as RON.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub walker: WalkerConfig,
    pub initial: InitialConditions,
    /// Extra initial conditions for `sweep`.
    pub sweep: Vec<InitialConditions>,
    pub t_final: f64,
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_condition: f64,
    pub solver: Solver,
    /// Uniform output spacing in seconds, every accepted step when absent.
    pub save_interval: Option<f64>,
    /// Largest relative energy drift reported as conserved.
    pub energy_tolerance: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            initial: InitialConditions::default(),
            sweep: Vec::new(),
            t_final: 0.5,
            rel_tol: 1e-10,
            abs_tol: 1e-12,
            max_condition: DEFAULT_MAX_CONDITION,
            solver: Solver::default(),
            save_interval: None,
            energy_tolerance: 1e-6,
        }
    }
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(to_string_pretty(self, PrettyConfig::new())?)
    }

    /// Checks the numerical settings. Walker parameters are checked when they
    /// are derived, see [`RunConfig::parameters`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid { name, value })
            }
        };
        positive("t_final", self.t_final)?;
        positive("max_condition", self.max_condition)?;
        positive("energy_tolerance", self.energy_tolerance)?;
        if let Some(dt) = self.save_interval {
            positive("save_interval", dt)?;
            // every grid sample counts against the solver's step budget
            if self.t_final / dt > SwingSimulation::default().step_control.max_steps as f64 {
                return Err(ConfigError::Invalid {
                    name: "save_interval",
                    value: dt,
                });
            }
        }
        for (name, value) in [("rel_tol", self.rel_tol), ("abs_tol", self.abs_tol)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid { name, value });
            }
        }
        Ok(())
    }

    pub fn parameters(&self) -> Result<WalkerParameters, ParameterError> {
        WalkerParameters::from_config(&self.walker)
    }

    pub fn simulation(&self) -> SwingSimulation {
        let simulation = SwingSimulation::default()
            .with_tspan(0.0, self.t_final)
            .with_tolerances(self.rel_tol, self.abs_tol)
            .with_solver(self.solver)
            .with_max_condition(self.max_condition);
        match self.save_interval {
            Some(dt) => simulation.with_save_interval(dt),
            None => simulation,
        }
    }

    /// The nominal initial condition followed by the `sweep` entries.
    pub fn sweep(&self) -> Sweep {
        let mut initial = Vec::with_capacity(self.sweep.len() + 1);
        initial.push(self.initial);
        initial.extend(self.sweep.iter().copied());
        Sweep::new(self.simulation(), initial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationError;
    use ballistic_diffeq::{SolverError, saving::SaveMethod};

    #[test]
    fn empty_config_is_default() {
        let config = RunConfig::from_ron("()").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn partial_config() {
        let config = RunConfig::from_ron(
            "(
                walker: (body_mass: 80.0),
                initial: (angles_deg: (10.0, -10.0, -40.0), rates_deg: (0.0, 200.0, -100.0)),
                solver: Fehlberg45,
                save_interval: Some(0.005),
            )",
        )
        .unwrap();
        assert_eq!(config.walker.body_mass, 80.0);
        assert_eq!(config.walker.body_height, 1.70);
        assert_eq!(config.initial.angles_deg, [10.0, -10.0, -40.0]);
        assert_eq!(config.t_final, 0.5);

        let sim = config.simulation();
        assert_eq!(sim.solver, Solver::Fehlberg45);
        assert_eq!(sim.save_method, SaveMethod::Interval(0.005));
        assert_eq!(sim.step_control.rel_tol, 1e-10);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = RunConfig::from_ron("(t_final: -1.0)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "t_final", .. }));
        let err = RunConfig::from_ron("(rel_tol: -1e-6)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "rel_tol", .. }));
        let err = RunConfig::from_ron("(save_interval: Some(0.0))").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "save_interval", .. }));
    }

    #[test]
    fn tiny_save_interval_is_rejected_not_run() {
        for ron in ["(save_interval: Some(1e-300))", "(save_interval: Some(1e-10))"] {
            let err = RunConfig::from_ron(ron).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "save_interval", .. }));
        }

        // the solver refuses the same request when the config check is bypassed
        let config = RunConfig {
            save_interval: Some(1e-300),
            ..RunConfig::default()
        };
        let params = config.parameters().unwrap();
        let err = config
            .simulation()
            .run(&params, &config.initial.to_state())
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Solver(SolverError::SaveIntervalTooSmall { .. })
        ));
    }

    #[test]
    fn rejects_malformed_ron() {
        let err = RunConfig::from_ron("(t_final: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn save_and_load() {
        let mut config = RunConfig::default();
        config.sweep.push(InitialConditions::new([12.0, -12.0, -55.0], [-40.0, 230.0, -140.0]));
        config.energy_tolerance = 1e-7;

        let path = std::env::temp_dir().join("ballistic_walker_config_test.ron");
        config.save(&path).unwrap();
        let loaded = RunConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
        assert_eq!(loaded.sweep().len(), 2);
    }

    #[test]
    fn missing_file() {
        let err = RunConfig::load("/nonexistent/ballistic.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
