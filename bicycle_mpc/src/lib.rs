//! Non-linear model predictive control of a kinematic bicycle.
//!
//! Every cycle the controller plans steering and acceleration over a fixed horizon so the
//! vehicle tracks a reference polynomial at a target speed, and returns the first planned
//! actuation together with the predicted path.

pub mod bounds;
pub mod config;
pub mod controller;
pub mod error;
pub mod layout;
pub mod model;
pub mod problem;
pub mod scalar;
pub mod solver;

pub use bounds::BoundsSet;
pub use config::MpcConfig;
pub use controller::{ControlOutput, MpcController, PredictedTrajectory};
pub use error::{ConfigError, ControlError, SolverError};
pub use layout::{HorizonLayout, MAX_HORIZON, MIN_HORIZON};
pub use model::{
    Actuation, Actuation64, KinematicBicycle, ReferencePolynomial, StateComponent, VehicleState,
    VehicleState64,
};
pub use problem::{HorizonFormulation, HorizonNlp};
pub use solver::{NlpProblem, NlpSolver, SolveResult, SolveStatus, SqpSettings, SqpSolver};
