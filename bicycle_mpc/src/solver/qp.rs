//! Equality and box constrained convex QP, solved with Clarabel.
//!
//! ```text
//! minimise    1/2 d' H d + g' d
//! subject to  A d = b
//!             lower <= d <= upper
//! ```
//!
//! `H` must be positive semidefinite. In Clarabel form the equality rows and the
//! variables with equal bounds go into a zero cone, every finite bound becomes one row
//! of a non-negative cone.

use std::time::Duration;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};

/// Entries below this magnitude are left out of the sparse matrices.
const SPARSITY_THRESHOLD: f64 = 1e-15;

/// Primal residual tolerance of Clarabel. It is relative to the largest bound, and far
/// bounds must not loosen the equality rows past the SQP feasibility tolerance.
const FEASIBILITY_TOLERANCE: f64 = 1e-10;

pub(crate) struct BoxEqualityQp<'a> {
    pub hessian: &'a DMatrix<f64>,
    pub gradient: &'a DVector<f64>,
    pub equality: &'a DMatrix<f64>,
    pub rhs: &'a DVector<f64>,
    pub lower: &'a DVector<f64>,
    pub upper: &'a DVector<f64>,
}

#[derive(Debug)]
pub(crate) struct QpStep {
    pub direction: DVector<f64>,
    /// Equality multipliers, stationarity `H d + g + A' lambda + mu = 0`.
    pub multipliers: DVector<f64>,
    pub iterations: u32,
}

#[derive(Debug)]
pub(crate) enum QpOutcome {
    Solved(QpStep),
    Infeasible,
    Timeout,
    Failed,
}

impl BoxEqualityQp<'_> {
    pub fn solve(&self, max_iterations: u32, time_limit: Duration) -> QpOutcome {
        self.solve_with(None, max_iterations, time_limit)
    }

    /// Solve with the equality rows relaxed into `penalty * |A d - b|_1`.
    ///
    /// Feasible whenever the bounds are, so it yields a step that reduces the linearised
    /// violation as far as the bounds allow.
    pub fn solve_elastic(
        &self,
        penalty: f64,
        max_iterations: u32,
        time_limit: Duration,
    ) -> QpOutcome {
        self.solve_with(Some(penalty), max_iterations, time_limit)
    }

    /// Elastic variables `p, q >= 0` follow `d` with `A d - p + q = b`.
    fn solve_with(
        &self,
        elastic: Option<f64>,
        max_iterations: u32,
        time_limit: Duration,
    ) -> QpOutcome {
        let n = self.gradient.len();
        let m = self.rhs.len();
        let n_elastic = if elastic.is_some() { 2 * m } else { 0 };
        let n_z = n + n_elastic;

        // Row numbers: equalities, then fixed variables, then one row per finite bound.
        let fixed: Vec<usize> = (0..n).filter(|&i| self.lower[i] == self.upper[i]).collect();
        let n_eq = m + fixed.len();

        let mut row = n_eq;
        let mut fixed_row = vec![None; n];
        let mut upper_row = vec![None; n];
        let mut lower_row = vec![None; n];
        for (k, &i) in fixed.iter().enumerate() {
            fixed_row[i] = Some(m + k);
        }
        for i in 0..n {
            if fixed_row[i].is_some() {
                continue;
            }
            if self.upper[i].is_finite() {
                upper_row[i] = Some(row);
                row += 1;
            }
            if self.lower[i].is_finite() {
                lower_row[i] = Some(row);
                row += 1;
            }
        }
        let elastic_rows = row;
        let n_rows = row + n_elastic;

        let mut b = vec![0.0; n_rows];
        b[..m].copy_from_slice(self.rhs.as_slice());
        for i in 0..n {
            if let Some(r) = fixed_row[i] {
                b[r] = self.lower[i];
            }
            if let Some(r) = upper_row[i] {
                b[r] = self.upper[i];
            }
            if let Some(r) = lower_row[i] {
                b[r] = -self.lower[i];
            }
        }

        let mut a = CscBuilder::new(n_rows);
        for i in 0..n {
            for (j, &v) in self.equality.column(i).iter().enumerate() {
                a.push(j, v);
            }
            if let Some(r) = fixed_row[i] {
                a.push(r, 1.0);
            }
            if let Some(r) = upper_row[i] {
                a.push(r, 1.0);
            }
            if let Some(r) = lower_row[i] {
                a.push(r, -1.0);
            }
            a.end_column();
        }
        for k in 0..n_elastic {
            let sign = if k < m { -1.0 } else { 1.0 };
            a.push(k % m, sign);
            a.push(elastic_rows + k, -1.0);
            a.end_column();
        }

        let mut p = CscBuilder::new(n_z);
        for j in 0..n_z {
            if j < n {
                for i in 0..=j {
                    p.push(i, self.hessian[(i, j)]);
                }
            }
            p.end_column();
        }

        let mut q = vec![elastic.unwrap_or(0.0); n_z];
        q[..n].copy_from_slice(self.gradient.as_slice());

        let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_rows > n_eq {
            cones.push(NonnegativeConeT(n_rows - n_eq));
        }

        let Ok(settings) = DefaultSettingsBuilder::default()
            .max_iter(max_iterations)
            .time_limit(time_limit.as_secs_f64())
            .tol_feas(FEASIBILITY_TOLERANCE)
            .verbose(false)
            .build()
        else {
            return QpOutcome::Failed;
        };

        let (p, a) = (p.build(), a.build());
        let Ok(mut solver) = DefaultSolver::new(&p, &q, &a, &b, &cones, settings) else {
            return QpOutcome::Failed;
        };
        solver.solve();
        let solution = &solver.solution;

        match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => QpOutcome::Solved(QpStep {
                direction: DVector::from_column_slice(&solution.x[..n]),
                multipliers: DVector::from_column_slice(&solution.z[..m]),
                iterations: solution.iterations,
            }),
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                QpOutcome::Infeasible
            }
            SolverStatus::MaxTime => QpOutcome::Timeout,
            _ => QpOutcome::Failed,
        }
    }
}

/// Column-by-column assembly of a Clarabel matrix. Rows must be pushed in increasing
/// order within a column.
struct CscBuilder {
    n_rows: usize,
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    nzval: Vec<f64>,
}

impl CscBuilder {
    fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            colptr: vec![0],
            rowval: Vec::new(),
            nzval: Vec::new(),
        }
    }

    fn push(&mut self, row: usize, value: f64) {
        if value.abs() > SPARSITY_THRESHOLD {
            self.rowval.push(row);
            self.nzval.push(value);
        }
    }

    fn end_column(&mut self) {
        self.colptr.push(self.rowval.len());
    }

    fn build(self) -> CscMatrix<f64> {
        let n_cols = self.colptr.len() - 1;
        CscMatrix::new(self.n_rows, n_cols, self.colptr, self.rowval, self.nzval)
    }
}
