//! Values and derivatives of an [`NlpProblem`] by forward-mode dual numbers.

use nalgebra::{DMatrix, DVector};
use num_dual::{Dual64, HyperDual64};

use super::{Budget, NlpProblem};
use crate::error::SolverError;

pub(crate) struct FirstOrder {
    pub cost: f64,
    pub constraints: DVector<f64>,
    pub gradient: DVector<f64>,
    /// `n_constraints x n_vars`.
    pub jacobian: DMatrix<f64>,
}

pub(crate) fn evaluate<P: NlpProblem>(problem: &P, vars: &[f64]) -> (f64, DVector<f64>) {
    let mut constraints = vec![0.0; problem.n_constraints()];
    let cost = problem.evaluate(vars, &mut constraints);
    (cost, DVector::from_vec(constraints))
}

/// Cost gradient and constraint Jacobian, one seeded pass per variable.
///
/// `None` once `budget` runs out.
pub(crate) fn first_order<P: NlpProblem>(
    problem: &P,
    vars: &[f64],
    budget: &Budget,
) -> Option<FirstOrder> {
    let n = vars.len();
    let m = problem.n_constraints();

    let (cost, constraints) = evaluate(problem, vars);

    let base: Vec<Dual64> = vars.iter().copied().map(Dual64::from).collect();
    let mut seeded = base.clone();
    let mut dual_constraints = vec![Dual64::from(0.0); m];

    let mut gradient = DVector::zeros(n);
    let mut jacobian = DMatrix::zeros(m, n);

    for i in 0..n {
        if budget.expired() {
            return None;
        }
        seeded[i].eps = 1.0;
        let dcost = problem.evaluate(&seeded, &mut dual_constraints);
        gradient[i] = dcost.eps;
        for (j, c) in dual_constraints.iter().enumerate() {
            jacobian[(j, i)] = c.eps;
        }
        seeded[i] = base[i];
    }

    Some(FirstOrder {
        cost,
        constraints,
        gradient,
        jacobian,
    })
}

/// The declared Hessian structure, or every lower-triangular entry when none is declared.
pub(crate) fn hessian_structure<P: NlpProblem>(
    problem: &P,
) -> Result<Vec<(usize, usize)>, SolverError> {
    let size = problem.n_vars();

    let Some(entries) = problem.hessian_structure() else {
        return Ok((0..size).flat_map(|i| (0..=i).map(move |j| (i, j))).collect());
    };

    entries
        .into_iter()
        .map(|(row, col)| {
            if row >= size || col >= size {
                Err(SolverError::HessianStructure { row, col, size })
            } else {
                Ok((row.max(col), row.min(col)))
            }
        })
        .collect()
}

/// Hessian of `cost + multipliers . constraints` over the given entries.
///
/// Each entry `(i, j)` costs one evaluation with hyper-dual numbers seeded in `i` and
/// `j`. The result is symmetric; entries outside `structure` are zero. `None` once
/// `budget` runs out.
pub(crate) fn lagrangian_hessian<P: NlpProblem>(
    problem: &P,
    vars: &[f64],
    multipliers: &[f64],
    structure: &[(usize, usize)],
    budget: &Budget,
) -> Option<DMatrix<f64>> {
    let n = vars.len();

    let base: Vec<HyperDual64> = vars.iter().copied().map(HyperDual64::from).collect();
    let mut seeded = base.clone();
    let mut constraints = vec![HyperDual64::from(0.0); problem.n_constraints()];

    let mut hessian = DMatrix::zeros(n, n);

    for &(i, j) in structure {
        if budget.expired() {
            return None;
        }
        seeded[i].eps1 = 1.0;
        seeded[j].eps2 = 1.0;

        let cost = problem.evaluate(&seeded, &mut constraints);
        let entry = constraints
            .iter()
            .zip(multipliers)
            .fold(cost.eps1eps2, |acc, (c, l)| acc + l * c.eps1eps2);

        hessian[(i, j)] = entry;
        hessian[(j, i)] = entry;

        seeded[i] = base[i];
        seeded[j] = base[j];
    }

    Some(hessian)
}
