//! Ballistic swing phase of a planar three-link walker: a stance leg pivoting
//! on the ground and a free swing leg made of a thigh and a shank.
//!
//! Build [`parameters::WalkerParameters`] once, then integrate any number of
//! swings with [`simulation::SwingSimulation`]. A swing ends when the knee
//! straightens, at the final time, or on a numerical failure.

pub mod config;
pub mod dynamics;
pub mod energy;
pub mod events;
pub mod kinematics;
pub mod output;
pub mod parameters;
pub mod plots;
pub mod simulation;
pub mod state;
pub mod sweep;

pub use parameters::{WalkerConfig, WalkerParameters};
pub use simulation::{IntegrationStatus, SwingRun, SwingSimulation};
pub use state::{InitialConditions, WalkerState};
