//! Line-search SQP solver.

use std::time::Duration;

use log::trace;
use nalgebra::{DMatrix, DVector};

use super::derivatives::{self, FirstOrder};
use super::qp::{BoxEqualityQp, QpOutcome, QpStep};
use super::{Budget, NlpProblem, NlpSolver, SolveResult, SolveStatus};
use crate::bounds::BoundsSet;
use crate::error::SolverError;

/// Sufficient decrease factor of the merit line search.
const ARMIJO: f64 = 1.0e-4;

/// Smallest diagonal margin of the convexified Hessian.
const MIN_HESSIAN_SHIFT: f64 = 1.0e-8;

/// Smallest penalty on the linearised violation when the QP has no feasible step.
const ELASTIC_PENALTY: f64 = 1.0e3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqpSettings {
    pub max_iterations: usize,

    /// Largest constraint residual accepted at a solution.
    pub feasibility_tolerance: f64,

    /// Converged once the residual is feasible and the step is below
    /// `step_tolerance * (1 + |x|_inf)`.
    pub step_tolerance: f64,

    /// Interior-point iterations per QP subproblem.
    pub max_qp_iterations: usize,
    pub max_line_search_steps: usize,
}

impl Default for SqpSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            feasibility_tolerance: 1.0e-6,
            step_tolerance: 1.0e-6,
            max_qp_iterations: 50,
            max_line_search_steps: 30,
        }
    }
}

/// Sequential quadratic programming with an exact Lagrangian Hessian, convexified by
/// diagonal dominance, QP subproblems solved by Clarabel and an l1 merit line search.
///
/// The time budget is checked between derivative passes, inside the QP and between
/// line search trials, so a solve stops shortly after the budget runs out.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    settings: SqpSettings,
}

impl SqpSolver {
    pub fn new(settings: SqpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SqpSettings {
        &self.settings
    }

    /// QP step from the linearisation at `z`, with the smallest merit penalty the step
    /// needs to be a descent direction.
    ///
    /// A linearisation no step within the bounds can satisfy is relaxed into an elastic
    /// QP. If even that cannot reduce the linearised violation the iterate is a
    /// stationary point of the violation, reported as local infeasibility.
    fn qp_step(
        &self,
        linear: &Linearization,
        hessian: &DMatrix<f64>,
        lower: &DVector<f64>,
        upper: &DVector<f64>,
        penalty: f64,
        budget: &Budget,
    ) -> Result<(QpStep, f64), SolveStatus> {
        let rhs = -&linear.residual;
        let qp = BoxEqualityQp {
            hessian,
            gradient: &linear.gradient,
            equality: &linear.jacobian,
            rhs: &rhs,
            lower,
            upper,
        };
        let max_iterations = u32::try_from(self.settings.max_qp_iterations).unwrap_or(u32::MAX);

        match qp.solve(max_iterations, budget.remaining()) {
            QpOutcome::Solved(step) => return Ok((step, 0.0)),
            QpOutcome::Infeasible => {}
            QpOutcome::Timeout => return Err(SolveStatus::Timeout),
            QpOutcome::Failed => return Err(SolveStatus::NumericalError),
        }

        let elastic_penalty = penalty.max(ELASTIC_PENALTY);
        let step = match qp.solve_elastic(elastic_penalty, max_iterations, budget.remaining()) {
            QpOutcome::Solved(step) => step,
            QpOutcome::Timeout => return Err(SolveStatus::Timeout),
            QpOutcome::Infeasible | QpOutcome::Failed => return Err(SolveStatus::NumericalError),
        };

        let violation = linear.residual.lp_norm(1);
        let reduction = violation - linear.linearised_violation(&step.direction);
        trace!("Elastic QP step, linearised violation {violation:.3e} reduced by {reduction:.3e}");
        if reduction <= self.settings.feasibility_tolerance * (1.0 + violation) {
            return Err(SolveStatus::LocalInfeasibility);
        }

        Ok((step, elastic_penalty))
    }
}

impl NlpSolver for SqpSolver {
    fn solve<P: NlpProblem>(
        &mut self,
        problem: &P,
        bounds: &BoundsSet,
        initial_guess: &[f64],
        time_budget: Duration,
    ) -> Result<SolveResult, SolverError> {
        let budget = Budget::new(time_budget);

        let n = problem.n_vars();
        bounds.check(n, problem.n_constraints())?;
        if initial_guess.len() != n {
            return Err(SolverError::DimensionMismatch {
                what: "initial guess",
                expected: n,
                found: initial_guess.len(),
            });
        }
        let structure = derivatives::hessian_structure(problem)?;

        let form = SlackForm::new(problem, bounds);
        let mut z = form.starting_point(initial_guess);
        let mut multipliers = DVector::zeros(problem.n_constraints());
        let mut penalty = 0.0f64;
        let mut iterations = 0;

        let status = loop {
            if budget.expired() {
                break SolveStatus::Timeout;
            }
            if iterations == self.settings.max_iterations {
                break SolveStatus::MaxIterations;
            }
            iterations += 1;

            let linear = match form.linearize(&z, &budget) {
                Ok(linear) => linear,
                Err(status) => break status,
            };
            let mut hessian = match form.hessian(&z, &multipliers, &structure, &budget) {
                Ok(hessian) => hessian,
                Err(status) => break status,
            };
            convexify(&mut hessian);

            let lower = &form.lower - &z;
            let upper = &form.upper - &z;
            let (step, step_penalty) =
                match self.qp_step(&linear, &hessian, &lower, &upper, penalty, &budget) {
                    Ok(step) => step,
                    Err(status) => break status,
                };

            let violation = linear.residual.amax();
            let step_norm = step.direction.amax();
            if violation <= self.settings.feasibility_tolerance
                && step_norm <= self.settings.step_tolerance * (1.0 + z.amax())
            {
                z += &step.direction;
                break SolveStatus::Success;
            }

            penalty = penalty
                .max(step_penalty)
                .max(1.5 * step.multipliers.amax() + 1.0e-3);
            let residual_l1 = linear.residual.lp_norm(1);
            let merit = linear.cost + penalty * residual_l1;
            let slope = linear.gradient.dot(&step.direction)
                + penalty * (linear.linearised_violation(&step.direction) - residual_l1);
            // Rounding in the merit value near a solution.
            let slack = 1.0e-12 * merit.abs().max(1.0);

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..self.settings.max_line_search_steps {
                if budget.expired() {
                    break;
                }
                let trial = &z + alpha * &step.direction;
                if let Some((cost, residual)) = form.evaluate(&trial) {
                    let trial_merit = cost + penalty * residual.lp_norm(1);
                    if trial_merit <= merit + ARMIJO * alpha * slope + slack {
                        accepted = Some(trial);
                        break;
                    }
                }
                alpha *= 0.5;
            }
            let Some(trial) = accepted else {
                break if budget.expired() {
                    SolveStatus::Timeout
                } else {
                    SolveStatus::NumericalError
                };
            };

            z = trial;
            let update = alpha * (&step.multipliers - &multipliers);
            multipliers += update;

            trace!(
                "SQP iteration {iterations}: cost {:.6e}, violation {violation:.3e}, \
                 step {step_norm:.3e}, alpha {alpha}, QP iterations {}",
                linear.cost,
                step.iterations,
            );
        };

        let x = form.vars(&z).to_vec();
        let (objective, constraints) = derivatives::evaluate(problem, &x);

        Ok(SolveResult {
            status,
            objective,
            constraint_violation: bound_violation(&constraints, bounds),
            x,
            iterations,
            elapsed: budget.elapsed(),
        })
    }
}

/// Raise diagonal entries until every row is diagonally dominant.
///
/// A symmetric matrix with a dominant non-negative diagonal is positive semidefinite.
/// Rows of the tracking cost already dominate; what gets lifted is mostly constraint
/// curvature weighted by the multipliers.
fn convexify(hessian: &mut DMatrix<f64>) {
    for i in 0..hessian.ncols() {
        let off_diagonal: f64 = hessian
            .column(i)
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, h)| h.abs())
            .sum();
        let floor = off_diagonal + MIN_HESSIAN_SHIFT;
        if hessian[(i, i)] < floor {
            hessian[(i, i)] = floor;
        }
    }
}

fn bound_violation(constraints: &DVector<f64>, bounds: &BoundsSet) -> f64 {
    constraints
        .iter()
        .zip(bounds.cons_lower.iter().zip(&bounds.cons_upper))
        .map(|(c, (l, u))| (l - c).max(c - u).max(0.0))
        .fold(0.0, f64::max)
}

struct Linearization {
    cost: f64,
    residual: DVector<f64>,
    gradient: DVector<f64>,
    jacobian: DMatrix<f64>,
}

impl Linearization {
    /// `|r + J d|_1`, the violation the linear model predicts after step `d`.
    fn linearised_violation(&self, direction: &DVector<f64>) -> f64 {
        (&self.residual + &self.jacobian * direction).lp_norm(1)
    }
}

/// The problem with range constraints rewritten as equalities on bounded slacks.
///
/// Variables are `z = [x, s]` with one slack per constraint whose bounds differ. The
/// residual `c(x) - E s - target` must be zero, where `target` holds the bound of the
/// equality rows and zero for the range rows.
struct SlackForm<'a, P> {
    problem: &'a P,
    n_vars: usize,
    range_rows: Vec<usize>,
    target: DVector<f64>,
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl<'a, P: NlpProblem> SlackForm<'a, P> {
    fn new(problem: &'a P, bounds: &BoundsSet) -> Self {
        let n_vars = bounds.n_vars();
        let range_rows: Vec<usize> = (0..bounds.n_constraints())
            .filter(|&k| bounds.cons_lower[k] < bounds.cons_upper[k])
            .collect();

        let mut target = DVector::from_column_slice(&bounds.cons_lower);
        for &k in &range_rows {
            target[k] = 0.0;
        }

        let lower = bounds
            .var_lower
            .iter()
            .chain(range_rows.iter().map(|&k| &bounds.cons_lower[k]))
            .copied();
        let upper = bounds
            .var_upper
            .iter()
            .chain(range_rows.iter().map(|&k| &bounds.cons_upper[k]))
            .copied();

        Self {
            problem,
            n_vars,
            target,
            lower: DVector::from_iterator(n_vars + range_rows.len(), lower),
            upper: DVector::from_iterator(n_vars + range_rows.len(), upper),
            range_rows,
        }
    }

    fn size(&self) -> usize {
        self.n_vars + self.range_rows.len()
    }

    fn vars<'z>(&self, z: &'z DVector<f64>) -> &'z [f64] {
        &z.as_slice()[..self.n_vars]
    }

    /// The guess clamped into its bounds, with slacks at the clamped constraint values.
    fn starting_point(&self, initial_guess: &[f64]) -> DVector<f64> {
        let mut z = DVector::zeros(self.size());
        for (i, guess) in initial_guess.iter().enumerate() {
            z[i] = guess.clamp(self.lower[i], self.upper[i]);
        }

        let (_, constraints) = derivatives::evaluate(self.problem, self.vars(&z));
        for (j, &k) in self.range_rows.iter().enumerate() {
            let i = self.n_vars + j;
            // NaN constraint values start the slack at its lower bound.
            z[i] = constraints[k].max(self.lower[i]).min(self.upper[i]);
        }
        z
    }

    fn residual(&self, z: &DVector<f64>, constraints: DVector<f64>) -> DVector<f64> {
        let mut residual = constraints - &self.target;
        for (j, &k) in self.range_rows.iter().enumerate() {
            residual[k] -= z[self.n_vars + j];
        }
        residual
    }

    /// Cost and residual, `None` if either is not finite.
    fn evaluate(&self, z: &DVector<f64>) -> Option<(f64, DVector<f64>)> {
        let (cost, constraints) = derivatives::evaluate(self.problem, self.vars(z));
        let residual = self.residual(z, constraints);
        (cost.is_finite() && residual.iter().all(|r| r.is_finite())).then_some((cost, residual))
    }

    fn linearize(&self, z: &DVector<f64>, budget: &Budget) -> Result<Linearization, SolveStatus> {
        let FirstOrder {
            cost,
            constraints,
            gradient,
            jacobian,
        } = derivatives::first_order(self.problem, self.vars(z), budget)
            .ok_or(SolveStatus::Timeout)?;

        let finite = cost.is_finite()
            && gradient.iter().chain(jacobian.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(SolveStatus::NumericalError);
        }

        let residual = self.residual(z, constraints);
        if !residual.iter().all(|r| r.is_finite()) {
            return Err(SolveStatus::NumericalError);
        }

        let m = jacobian.nrows();
        let mut full_gradient = DVector::zeros(self.size());
        full_gradient.rows_mut(0, self.n_vars).copy_from(&gradient);

        let mut full_jacobian = DMatrix::zeros(m, self.size());
        full_jacobian.columns_mut(0, self.n_vars).copy_from(&jacobian);
        for (j, &k) in self.range_rows.iter().enumerate() {
            full_jacobian[(k, self.n_vars + j)] = -1.0;
        }

        Ok(Linearization {
            cost,
            residual,
            gradient: full_gradient,
            jacobian: full_jacobian,
        })
    }

    /// Slacks enter the residual linearly, so only the `x` block is non-zero.
    fn hessian(
        &self,
        z: &DVector<f64>,
        multipliers: &DVector<f64>,
        structure: &[(usize, usize)],
        budget: &Budget,
    ) -> Result<DMatrix<f64>, SolveStatus> {
        let h = derivatives::lagrangian_hessian(
            self.problem,
            self.vars(z),
            multipliers.as_slice(),
            structure,
            budget,
        )
        .ok_or(SolveStatus::Timeout)?;
        if !h.iter().all(|v| v.is_finite()) {
            return Err(SolveStatus::NumericalError);
        }

        let mut full = DMatrix::zeros(self.size(), self.size());
        full.view_mut((0, 0), (self.n_vars, self.n_vars)).copy_from(&h);
        Ok(full)
    }
}
