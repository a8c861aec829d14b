use serde::{Deserialize, Serialize};

use crate::{
    OdeModel, OdeSolution,
    events::EventManager,
    rk::RungeKutta,
    saving::SaveMethod,
    stepping::AdaptiveStepControl,
    tableau::ButcherTableau,
};

/// Enum representing the available adaptive solvers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Solver {
    /// Dormand-Prince 5(4) method.
    #[default]
    DormandPrince45,
    /// Runge-Kutta-Fehlberg 4(5) method, propagating the fifth order solution.
    Fehlberg45,
}

impl Solver {
    pub fn solve_adaptive<Model>(
        &self,
        model: &mut Model,
        x0: &Model::State,
        tspan: (f64, f64),
        controller: &AdaptiveStepControl,
        events: &mut EventManager<Model::State>,
        save_method: SaveMethod,
    ) -> OdeSolution<Model::State, Model::Error>
    where
        Model: OdeModel,
    {
        match self {
            Solver::DormandPrince45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, x0);
                solver.solve_adaptive(model, x0, tspan, controller, events, save_method)
            }
            Solver::Fehlberg45 => {
                let mut solver = RungeKutta::new(ButcherTableau::<6>::FEHLBERG45, x0);
                solver.solve_adaptive(model, x0, tspan, controller, events, save_method)
            }
        }
    }
}
