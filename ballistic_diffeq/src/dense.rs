use crate::state::OdeState;

/// An accepted step together with the derivatives at both ends.
///
/// States inside the step are reconstructed with a cubic Hermite interpolant,
/// which matches value and slope at both ends and is fourth-order accurate.
pub struct StepInterval<'a, State: OdeState> {
    pub t0: f64,
    pub x0: &'a State,
    pub dx0: &'a State,
    pub t1: f64,
    pub x1: &'a State,
    pub dx1: &'a State,
}

impl<State: OdeState> StepInterval<'_, State> {
    pub fn interpolate(&self, t: f64) -> State {
        let h = self.t1 - self.t0;
        if h == 0.0 {
            return self.x1.clone();
        }
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;

        // Hermite basis
        let h00 = 1.0 - 3.0 * s2 + 2.0 * s3;
        let h10 = s - 2.0 * s2 + s3;
        let h01 = 3.0 * s2 - 2.0 * s3;
        let h11 = s3 - s2;

        let mut out = self.x0.clone();
        out *= h00;
        let mut term = self.dx0.clone();
        term *= h10 * h;
        out += &term;
        term.clone_from(self.x1);
        term *= h01;
        out += &term;
        term.clone_from(self.dx1);
        term *= h11 * h;
        out += &term;
        out
    }
}
