use std::array;

use tolerance::Tolerance;
use tracing::{debug, warn};

use crate::{
    OdeModel, OdeSolution, SolveFailure, SolveStats, SolveStatus,
    dense::StepInterval,
    events::{EventAction, EventManager, EventRecord},
    saving::{MemoryResult, SaveMethod},
    state::OdeState,
    stepping::AdaptiveStepControl,
    tableau::ButcherTableau,
};

const MAX_PREALLOCATED_SAMPLES: usize = 4096;

/// Explicit embedded Runge-Kutta integrator with preallocated stage buffers.
pub struct RungeKutta<State: OdeState, const STAGES: usize> {
    tableau: ButcherTableau<STAGES>,
    tolerances: State::Tolerance,
    k: [State; STAGES],
    /// state at the start of the step
    x: State,
    /// candidate state at the end of the step
    y: State,
    /// local error estimate of the candidate
    y_err: State,
    /// derivative at the candidate, reused as k[0] of the next step
    dy: State,
    stage: State,
    scratch: State,
}

impl<State: OdeState, const STAGES: usize> RungeKutta<State, STAGES> {
    /// Buffers are cloned from `x0` so that any state shape is supported.
    pub fn new(tableau: ButcherTableau<STAGES>, x0: &State) -> Self {
        Self {
            tableau,
            tolerances: State::Tolerance::default(),
            k: array::from_fn(|_| x0.clone()),
            x: x0.clone(),
            y: x0.clone(),
            y_err: x0.clone(),
            dy: x0.clone(),
            stage: x0.clone(),
            scratch: x0.clone(),
        }
    }

    /// Takes one trial step of size `h` from `(t, x)`, with `k[0]` already holding f(t, x).
    ///
    /// On failure returns the stage time, and `stage` holds the offending state.
    fn step<Model>(&mut self, model: &mut Model, t: f64, h: f64) -> Result<(), (f64, Model::Error)>
    where
        Model: OdeModel<State = State>,
    {
        for s in 1..STAGES {
            // in place calculation of intermediate points
            self.stage.clone_from(&self.x);
            for i in 0..s {
                let a = self.tableau.a[s][i];
                if a != 0.0 {
                    self.scratch.clone_from(&self.k[i]);
                    self.scratch *= a * h;
                    self.stage += &self.scratch;
                }
            }
            let ts = t + self.tableau.c[s] * h;
            model
                .f(ts, &self.stage, &mut self.k[s])
                .map_err(|e| (ts, e))?;
        }

        self.y.clone_from(&self.x);
        self.y_err *= 0.0;
        for s in 0..STAGES {
            let b = self.tableau.b[s];
            let e = b - self.tableau.b_err[s];
            if b != 0.0 {
                self.scratch.clone_from(&self.k[s]);
                self.scratch *= b * h;
                self.y += &self.scratch;
            }
            if e != 0.0 {
                self.scratch.clone_from(&self.k[s]);
                self.scratch *= e * h;
                self.y_err += &self.scratch;
            }
        }
        Ok(())
    }

    /// Integrates from `x0` over `tspan` with adaptive steps.
    ///
    /// Model failures, step size underflow and the step budget end the run early,
    /// everything integrated up to that point is kept in the solution.
    pub fn solve_adaptive<Model>(
        &mut self,
        model: &mut Model,
        x0: &State,
        tspan: (f64, f64),
        control: &AdaptiveStepControl,
        events: &mut EventManager<State>,
        save_method: SaveMethod,
    ) -> OdeSolution<State, Model::Error>
    where
        Model: OdeModel<State = State>,
    {
        let (t0, tf) = tspan;
        let mut t = t0;
        let mut stats = SolveStats::default();
        let mut records = Vec::new();

        // the vector grows past this as needed
        let capacity = match save_method {
            SaveMethod::Interval(dt) => (((tf - t0) / dt).ceil() as usize)
                .saturating_add(2)
                .min(MAX_PREALLOCATED_SAMPLES),
            SaveMethod::EveryStep => 256,
        };
        let mut result = MemoryResult::new(capacity);

        macro_rules! finish {
            ($status:expr) => {
                return OdeSolution {
                    result,
                    status: $status,
                    stats,
                    events: records,
                }
            };
        }

        self.x.clone_from(x0);
        result.insert(t, &self.x);

        stats.evaluations += 1;
        if let Err(source) = model.f(t, &self.x, &mut self.k[0]) {
            finish!(SolveStatus::Failed(SolveFailure::Model {
                t,
                state: x0.clone(),
                source,
            }));
        }

        events.initialize(&self.x, t);

        let mut dt = control.starting_dt(&self.tolerances, &self.x, &self.k[0], tf - t0);
        let end_tol = 1e-12 * tf.abs().max(1.0);

        // uniform output grid t0 + n * save_dt, index of the next unsaved point
        let save_dt = match save_method {
            SaveMethod::Interval(save_dt) => Some(save_dt),
            SaveMethod::EveryStep => None,
        };
        let mut save_index = 1usize;
        let grid = |n: usize| save_dt.map_or(f64::INFINITY, |save_dt| t0 + n as f64 * save_dt);

        while tf - t > end_tol {
            if stats.accepted + stats.rejected >= control.max_steps {
                warn!(t, steps = control.max_steps, "step budget exhausted");
                finish!(SolveStatus::Failed(SolveFailure::MaxStepsExceeded {
                    t,
                    steps: control.max_steps,
                }));
            }

            let last = dt >= tf - t;
            let h = if last { tf - t } else { dt };

            stats.evaluations += STAGES - 1;
            if let Err((ts, source)) = self.step(model, t, h) {
                warn!(t = ts, "model evaluation failed");
                finish!(SolveStatus::Failed(SolveFailure::Model {
                    t: ts,
                    state: self.stage.clone(),
                    source,
                }));
            }

            let error = if self.y.is_finite() {
                self.tolerances.compute_error(
                    &self.x,
                    &self.y,
                    &self.y_err,
                    control.rel_tol,
                    control.abs_tol,
                )
            } else {
                f64::INFINITY
            };

            if error.is_finite() && error <= 1.0 {
                stats.accepted += 1;
                let t_new = if last { tf } else { t + h };

                stats.evaluations += 1;
                if let Err(source) = model.f(t_new, &self.y, &mut self.dy) {
                    warn!(t = t_new, "model evaluation failed");
                    finish!(SolveStatus::Failed(SolveFailure::Model {
                        t: t_new,
                        state: self.y.clone(),
                        source,
                    }));
                }

                let interval = StepInterval {
                    t0: t,
                    x0: &self.x,
                    dx0: &self.k[0],
                    t1: t_new,
                    x1: &self.y,
                    dx1: &self.dy,
                };

                let mut terminal = None;
                for hit in events.check(&interval) {
                    match hit.action {
                        EventAction::Continue => {
                            debug!(event = hit.name.as_str(), t = hit.t, "event");
                            records.push(EventRecord {
                                name: hit.name,
                                t: hit.t,
                            });
                        }
                        EventAction::Terminate => terminal = Some(hit),
                    }
                }

                // grid samples strictly before the end of the step (or the event)
                let t_stop = terminal.as_ref().map_or(t_new, |hit| hit.t);
                while grid(save_index) < t_stop - end_tol {
                    let ts = grid(save_index);
                    result.insert(ts, &interval.interpolate(ts));
                    save_index += 1;
                }

                if let Some(hit) = terminal {
                    debug!(event = hit.name.as_str(), t = hit.t, "terminating event");
                    result.insert(hit.t, &hit.state);
                    finish!(SolveStatus::Terminated {
                        event: hit.name,
                        t: hit.t,
                    });
                }

                if save_dt.is_none() || last {
                    result.insert(t_new, &self.y);
                } else if (grid(save_index) - t_new).abs() <= end_tol {
                    result.insert(t_new, &self.y);
                    save_index += 1;
                }

                std::mem::swap(&mut self.x, &mut self.y);
                std::mem::swap(&mut self.k[0], &mut self.dy);
                t = t_new;
                dt = control.next_dt(h, error, self.tableau.error_order);
            } else {
                stats.rejected += 1;
                dt = if error.is_finite() {
                    control.next_dt(h, error, self.tableau.error_order)
                } else {
                    h * control.min_growth
                };
                if dt < control.min_dt {
                    if !self.y.is_finite() {
                        finish!(SolveStatus::Failed(SolveFailure::NonFiniteState { t }));
                    }
                    warn!(t, dt, "step size underflow");
                    finish!(SolveStatus::Failed(SolveFailure::StepSizeUnderflow { t, dt }));
                }
            }
        }

        finish!(SolveStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::ContinuousEvent, state::state_array::StateArray};
    use approx::assert_abs_diff_eq;
    use std::convert::Infallible;

    #[derive(Debug)]
    struct Decay {
        rate: f64,
    }

    impl OdeModel for Decay {
        type State = StateArray<1>;
        type Error = Infallible;

        fn f(&mut self, _t: f64, y: &StateArray<1>, dy: &mut StateArray<1>) -> Result<(), Infallible> {
            dy[0] = -self.rate * y[0];
            Ok(())
        }
    }

    fn control() -> AdaptiveStepControl {
        AdaptiveStepControl::default()
            .with_rel_tol(1e-10)
            .with_abs_tol(1e-12)
    }

    #[test]
    fn dormand_prince_exponential_decay() {
        let mut model = Decay { rate: 2.0 };
        let x0 = StateArray::new([1.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 1.0),
            &control(),
            &mut EventManager::new(),
            SaveMethod::EveryStep,
        );
        assert!(matches!(sol.status, SolveStatus::Completed));
        let (t, y) = sol.result.last().unwrap();
        assert_eq!(t, 1.0);
        assert_abs_diff_eq!(y[0], (-2.0f64).exp(), epsilon = 1e-9);
        assert!(sol.result.t.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn fehlberg_exponential_decay() {
        let mut model = Decay { rate: 1.0 };
        let x0 = StateArray::new([3.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<6>::FEHLBERG45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 2.0),
            &control(),
            &mut EventManager::new(),
            SaveMethod::EveryStep,
        );
        let (_, y) = sol.result.last().unwrap();
        assert_abs_diff_eq!(y[0], 3.0 * (-2.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn interval_saving_uses_uniform_grid() {
        let mut model = Decay { rate: 1.0 };
        let x0 = StateArray::new([1.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 1.0),
            &control(),
            &mut EventManager::new(),
            SaveMethod::Interval(0.1),
        );
        assert_eq!(sol.result.len(), 11);
        for (i, (t, y)) in sol.result.t.iter().zip(&sol.result.y).enumerate() {
            assert_abs_diff_eq!(*t, 0.1 * i as f64, epsilon = 1e-9);
            assert_abs_diff_eq!(y[0], (-t).exp(), epsilon = 1e-6);
        }
    }

    #[test]
    fn terminating_event_stops_at_crossing() {
        let mut model = Decay { rate: 1.0 };
        let x0 = StateArray::new([1.0]);
        let mut events = EventManager::new();
        events.add_continuous(
            ContinuousEvent::new("half", |x: &StateArray<1>, _t| x[0] - 0.5)
                .with_direction(crate::events::EventDirection::Falling),
        );
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 5.0),
            &control(),
            &mut events,
            SaveMethod::EveryStep,
        );
        match sol.status {
            SolveStatus::Terminated { ref event, t } => {
                assert_eq!(event, "half");
                assert_abs_diff_eq!(t, 2.0f64.ln(), epsilon = 1e-8);
            }
            ref other => panic!("unexpected status {other:?}"),
        }
        let (t, y) = sol.result.last().unwrap();
        assert_abs_diff_eq!(t, 2.0f64.ln(), epsilon = 1e-8);
        assert_abs_diff_eq!(y[0], 0.5, epsilon = 1e-8);
    }

    #[test]
    fn continuing_event_is_recorded() {
        let mut model = Decay { rate: 1.0 };
        let x0 = StateArray::new([1.0]);
        let mut events = EventManager::new();
        events.add_continuous(
            ContinuousEvent::new("half", |x: &StateArray<1>, _t| x[0] - 0.5)
                .with_action(EventAction::Continue),
        );
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 1.0),
            &control(),
            &mut events,
            SaveMethod::EveryStep,
        );
        assert!(matches!(sol.status, SolveStatus::Completed));
        assert_eq!(sol.events.len(), 1);
        assert_abs_diff_eq!(sol.events[0].t, 2.0f64.ln(), epsilon = 1e-8);
    }

    #[derive(Debug)]
    struct Broken;

    #[derive(Debug, thiserror::Error)]
    #[error("no derivative")]
    struct NoDerivative;

    impl OdeModel for Broken {
        type State = StateArray<1>;
        type Error = NoDerivative;

        fn f(&mut self, _t: f64, _y: &StateArray<1>, _dy: &mut StateArray<1>) -> Result<(), NoDerivative> {
            Err(NoDerivative)
        }
    }

    #[test]
    fn failure_at_start_keeps_initial_sample() {
        let mut model = Broken;
        let x0 = StateArray::new([2.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.5, 1.0),
            &control(),
            &mut EventManager::new(),
            SaveMethod::Interval(0.1),
        );
        assert!(matches!(
            sol.status,
            SolveStatus::Failed(SolveFailure::Model { t: 0.5, .. })
        ));
        assert_eq!(sol.result.len(), 1);
        assert_eq!(sol.result.last(), Some((0.5, &x0)));
    }

    #[test]
    fn step_budget() {
        let mut model = Decay { rate: 1.0 };
        let x0 = StateArray::new([1.0]);
        let mut rk = RungeKutta::new(ButcherTableau::<7>::DORMANDPRINCE45, &x0);
        let sol = rk.solve_adaptive(
            &mut model,
            &x0,
            (0.0, 100.0),
            &control().with_max_steps(3),
            &mut EventManager::new(),
            SaveMethod::EveryStep,
        );
        assert!(matches!(
            sol.status,
            SolveStatus::Failed(SolveFailure::MaxStepsExceeded { steps: 3, .. })
        ));
        assert!(!sol.result.is_empty());
    }
}
