//! Error types for configuration, the solver contract and the control cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::solver::SolveStatus;

/// An error raised while loading or validating an [`MpcConfig`](crate::MpcConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read the config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse the config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Horizon must have between {min} and {max} steps, found {found}")]
    HorizonLength {
        found: usize,
        min: usize,
        max: usize,
    },

    #[error("Invalid value for `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// The problem or bounds handed to a solver do not satisfy the solver contract.
#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    #[error("Expected {expected} entries in {what}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Bound {index} of {what} is inverted: lower {lower} > upper {upper}")]
    InvertedBounds {
        what: &'static str,
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("Hessian structure entry ({row}, {col}) is outside a {size}x{size} matrix")]
    HessianStructure { row: usize, col: usize, size: usize },
}

/// Why a control cycle produced no actuation.
///
/// Every variant is recoverable: the caller picks a fallback for this cycle and calls
/// the controller again with fresh state on the next one.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Vehicle state contains a non-finite component")]
    NonFiniteState,

    #[error("Reference polynomial contains a non-finite coefficient")]
    NonFiniteReference,

    #[error("No feasible control found (solver status {status:?}, constraint violation {violation:.3e})")]
    NoFeasibleControl { status: SolveStatus, violation: f64 },

    #[error("Solver exceeded its time budget of {budget:?} (ran for {elapsed:?})")]
    Timeout { elapsed: Duration, budget: Duration },

    #[error("Solver rejected the problem: {0}")]
    Solver(#[from] SolverError),
}
