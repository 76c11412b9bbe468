//! Solver contract for bounded non-linear programs.
//!
//! A problem exposes one generic evaluation `F(x) -> (cost, constraints)` that the
//! solver instantiates with plain and dual numbers to get values and derivatives:
//!
//! ```text
//! minimise    cost(x)
//! subject to  var_lower  <= x           <= var_upper
//!             cons_lower <= constraints(x) <= cons_upper
//! ```

pub(crate) mod derivatives;
mod qp;
mod sqp;

use std::time::{Duration, Instant};

use crate::bounds::BoundsSet;
use crate::error::SolverError;
use crate::scalar::AdScalar;

pub use sqp::{SqpSettings, SqpSolver};

pub trait NlpProblem {
    fn n_vars(&self) -> usize;

    fn n_constraints(&self) -> usize;

    /// Write the constraint values into `constraints` and return the cost.
    fn evaluate<T: AdScalar>(&self, vars: &[T], constraints: &mut [T]) -> T;

    /// Lower-triangular `(row, col)` entries of the Lagrangian Hessian that may be
    /// non-zero. `None` means dense.
    fn hessian_structure(&self) -> Option<Vec<(usize, usize)>> {
        None
    }
}

pub trait NlpSolver {
    /// Solve `problem` from `initial_guess` within `time_budget`.
    ///
    /// An `Err` means the inputs break the contract. A solve that runs but does not
    /// converge returns `Ok` with a non-success [`SolveStatus`].
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        bounds: &BoundsSet,
        initial_guess: &[f64],
        time_budget: Duration,
    ) -> Result<SolveResult, SolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Success,
    Timeout,
    MaxIterations,
    LocalInfeasibility,
    NumericalError,
}

impl SolveStatus {
    pub fn is_success(self) -> bool {
        self == SolveStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,

    /// Cost at `x`.
    pub objective: f64,

    /// Last iterate. Only a solution when `status` is [`SolveStatus::Success`].
    pub x: Vec<f64>,

    pub iterations: usize,

    /// Largest bound violation of the constraints at `x`.
    pub constraint_violation: f64,

    pub elapsed: Duration,
}

/// Wall-clock allowance of one solve, started when it is created.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    start: Instant,
    limit: Duration,
}

impl Budget {
    pub fn new(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }
}
