use crate::{dense::StepInterval, state::OdeState};

/// Which sign changes of an event condition count as a crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventDirection {
    /// negative to non-negative
    Rising,
    /// positive to non-positive
    Falling,
    Either,
}

impl EventDirection {
    pub fn crossed(&self, g_prev: f64, g_new: f64) -> bool {
        match self {
            EventDirection::Rising => g_prev < 0.0 && g_new >= 0.0,
            EventDirection::Falling => g_prev > 0.0 && g_new <= 0.0,
            EventDirection::Either => {
                (g_prev < 0.0 && g_new >= 0.0) || (g_prev > 0.0 && g_new <= 0.0)
            }
        }
    }
}

/// What the solver does once an event is located.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
    /// Stop the integration at the crossing.
    Terminate,
    /// Record the crossing and keep integrating.
    Continue,
}

/// Represents an event that triggers when a user-defined condition crosses zero.
pub struct ContinuousEvent<State: OdeState> {
    pub name: String,
    /// A function representing the condition. Should return a signed value.
    condition: Box<dyn Fn(&State, f64) -> f64 + Send + Sync>,
    pub direction: EventDirection,
    pub action: EventAction,
    /// Width of the time bracket at which root refinement stops.
    pub root_tol: f64,
    pub max_iter: usize,
}

impl<State: OdeState> ContinuousEvent<State> {
    /// Creates a new terminating event that fires on any crossing.
    ///
    /// # Arguments
    /// * `name` - Label reported when the event fires.
    /// * `condition` - A function returning a value whose zero-crossing triggers the event.
    pub fn new<C>(name: &str, condition: C) -> Self
    where
        C: Fn(&State, f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            condition: Box::new(condition),
            direction: EventDirection::Either,
            action: EventAction::Terminate,
            root_tol: 1e-12,
            max_iter: 100,
        }
    }

    pub fn with_direction(mut self, direction: EventDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_action(mut self, action: EventAction) -> Self {
        self.action = action;
        self
    }

    /// Sets the tolerance used to locate condition crossings.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.root_tol = tol;
        self
    }

    pub fn evaluate(&self, state: &State, t: f64) -> f64 {
        (self.condition)(state, t)
    }

    /// Refines a bracketed crossing inside `interval`.
    ///
    /// Uses regula falsi with the Illinois modification on the interpolated
    /// condition. Returns the time on the far side of the crossing, so the
    /// condition has already changed sign there.
    fn locate(&self, interval: &StepInterval<State>, g0: f64, g1: f64) -> (f64, f64) {
        let g = |t: f64| self.evaluate(&interval.interpolate(t), t);

        let (mut ta, mut ga) = (interval.t0, g0);
        let (mut tb, mut gb) = (interval.t1, g1);
        if gb == 0.0 {
            return (tb, gb);
        }

        let mut side = 0;
        for _ in 0..self.max_iter {
            if (tb - ta).abs() <= self.root_tol {
                break;
            }
            let mut tc = (ta * gb - tb * ga) / (gb - ga);
            if !(tc > ta && tc < tb) {
                tc = 0.5 * (ta + tb);
            }
            let gc = g(tc);
            if gc == 0.0 {
                return (tc, gc);
            }
            if gc.signum() == gb.signum() {
                tb = tc;
                gb = gc;
                if side == -1 {
                    ga *= 0.5;
                }
                side = -1;
            } else {
                ta = tc;
                ga = gc;
                if side == 1 {
                    gb *= 0.5;
                }
                side = 1;
            }
        }
        // gb may have been halved, report the true value
        (tb, g(tb))
    }
}

/// A located event crossing.
#[derive(Clone, Debug)]
pub struct EventHit<State> {
    pub index: usize,
    pub name: String,
    pub t: f64,
    pub value: f64,
    pub state: State,
    pub action: EventAction,
}

/// Record of a non-terminating event that fired during the run.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub name: String,
    pub t: f64,
}

/// Tracks the continuous events of a problem across accepted steps.
pub struct EventManager<State: OdeState> {
    pub continuous_events: Vec<ContinuousEvent<State>>,
    last_values: Vec<f64>,
}

impl<State: OdeState> Default for EventManager<State> {
    fn default() -> Self {
        Self::new()
    }
}

impl<State: OdeState> EventManager<State> {
    /// Constructs a new `EventManager` with no registered events.
    pub fn new() -> Self {
        Self {
            continuous_events: Vec::new(),
            last_values: Vec::new(),
        }
    }

    /// Add a new continuous event that is evaluated every step.
    pub fn add_continuous(&mut self, event: ContinuousEvent<State>) {
        self.continuous_events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.continuous_events.is_empty()
    }

    /// Evaluates every condition at the initial state.
    pub fn initialize(&mut self, x0: &State, t0: f64) {
        self.last_values = self
            .continuous_events
            .iter()
            .map(|event| event.evaluate(x0, t0))
            .collect();
    }

    /// Checks an accepted step for crossings, in time order.
    ///
    /// Returns every crossing up to and including the first terminating one.
    /// The stored condition values advance to the end of the step.
    pub fn check(&mut self, interval: &StepInterval<State>) -> Vec<EventHit<State>> {
        let mut hits = Vec::new();
        for (i, event) in self.continuous_events.iter().enumerate() {
            let g0 = self.last_values[i];
            let g1 = event.evaluate(interval.x1, interval.t1);
            if event.direction.crossed(g0, g1) {
                let (t, value) = event.locate(interval, g0, g1);
                hits.push(EventHit {
                    index: i,
                    name: event.name.clone(),
                    t,
                    value,
                    state: interval.interpolate(t),
                    action: event.action,
                });
            }
            self.last_values[i] = g1;
        }

        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        if let Some(first_terminal) = hits
            .iter()
            .position(|hit| hit.action == EventAction::Terminate)
        {
            hits.truncate(first_terminal + 1);
        }
        hits
    }
}
