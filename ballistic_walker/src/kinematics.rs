use nalgebra::Vector2;

use crate::{parameters::WalkerParameters, state::WalkerState};

/// Unit vector along a link measured from the upward vertical.
fn up(angle: f64) -> Vector2<f64> {
    Vector2::new(-angle.sin(), angle.cos())
}

/// Unit vector along a link measured from the downward vertical.
fn down(angle: f64) -> Vector2<f64> {
    Vector2::new(angle.sin(), -angle.cos())
}

/// Joint positions of the walker in the sagittal plane, stance foot at the
/// origin, x forward and y up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickFigure {
    pub stance_foot: Vector2<f64>,
    pub hip: Vector2<f64>,
    pub knee: Vector2<f64>,
    pub ankle: Vector2<f64>,
    /// Swing foot tip, drawn at a right angle to the shank.
    pub toe: Vector2<f64>,
}

impl StickFigure {
    pub fn new(params: &WalkerParameters, state: &WalkerState) -> Self {
        let (q1, q2, q3) = (state[0], state[1], state[2]);
        let stance_foot = Vector2::zeros();
        let hip = stance_foot + params.stance.length * up(q1);
        let knee = hip + params.thigh.length * down(q2);
        let ankle = knee + params.shank.length * down(q3);
        // shank direction turned a quarter turn counter-clockwise points forward
        let toe = ankle + params.foot_length * Vector2::new(q3.cos(), q3.sin());
        Self {
            stance_foot,
            hip,
            knee,
            ankle,
            toe,
        }
    }

    /// Polyline from the stance foot through the hip to the swing toe.
    pub fn polyline(&self) -> [Vector2<f64>; 5] {
        [self.stance_foot, self.hip, self.knee, self.ankle, self.toe]
    }
}

/// Centre of mass of each link, in generalized-coordinate order.
pub fn link_centers_of_mass(params: &WalkerParameters, state: &WalkerState) -> [Vector2<f64>; 3] {
    let (q1, q2, q3) = (state[0], state[1], state[2]);
    let hip = params.stance.length * up(q1);
    let knee = hip + params.thigh.length * down(q2);
    [
        (params.stance.length - params.stance.lc) * up(q1),
        hip + params.thigh.lc * down(q2),
        knee + params.shank.lc * down(q3),
    ]
}

/// Centre of mass of the whole walker.
pub fn center_of_mass(params: &WalkerParameters, state: &WalkerState) -> Vector2<f64> {
    let masses = [params.stance.mass, params.thigh.mass, params.shank.mass];
    let weighted = link_centers_of_mass(params, state)
        .iter()
        .zip(masses)
        .fold(Vector2::zeros(), |acc, (r, m)| acc + r * m);
    weighted / params.total_mass()
}
