//! Receding-horizon control loop.

use std::time::Duration;

use log::{debug, warn};

use crate::bounds::BoundsSet;
use crate::config::{BoundLimits, MpcConfig};
use crate::error::{ConfigError, ControlError};
use crate::model::{Actuation64, ReferencePolynomial, StateComponent, VehicleState64};
use crate::problem::{HorizonFormulation, HorizonNlp};
use crate::solver::{NlpSolver, SolveStatus, SqpSolver};

/// Planned positions over the horizon, in the frame of the state the cycle started from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictedTrajectory {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutput {
    /// First planned actuation, the one to apply now.
    pub actuation: Actuation64,
    pub predicted: PredictedTrajectory,
    pub cost: f64,
    pub iterations: usize,
    pub solve_time: Duration,
}

pub struct MpcController<S = SqpSolver> {
    formulation: HorizonFormulation,
    limits: BoundLimits,
    time_budget: Duration,
    solver: S,
}

impl MpcController<SqpSolver> {
    /// Controller with the default SQP solver tuned by `config.solver`.
    pub fn new(config: &MpcConfig) -> Result<Self, ConfigError> {
        Self::with_solver(config, SqpSolver::new(config.solver.sqp_settings()))
    }
}

impl<S: NlpSolver> MpcController<S> {
    pub fn with_solver(config: &MpcConfig, solver: S) -> Result<Self, ConfigError> {
        Ok(Self {
            formulation: HorizonFormulation::from_config(config)?,
            limits: config.bounds,
            time_budget: config.solver.time_budget(),
            solver,
        })
    }

    pub fn formulation(&self) -> &HorizonFormulation {
        &self.formulation
    }

    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Plan over the horizon from `state` and return the first actuation.
    ///
    /// Any failure leaves the choice of fallback actuation to the caller; no actuation
    /// from an earlier cycle is ever returned.
    pub fn step(
        &mut self,
        state: &VehicleState64,
        reference: &ReferencePolynomial,
    ) -> Result<ControlOutput, ControlError> {
        if !state.is_finite() {
            return Err(ControlError::NonFiniteState);
        }
        if !reference.is_finite() {
            return Err(ControlError::NonFiniteReference);
        }

        let layout = *self.formulation.layout();
        let bounds = BoundsSet::generate(&layout, &self.limits, state);
        let initial_guess = self.formulation.initial_guess(state);
        let problem = HorizonNlp::new(&self.formulation, reference);

        let result = self.solver.solve(&problem, &bounds, &initial_guess, self.time_budget)?;

        match result.status {
            SolveStatus::Success => {}
            SolveStatus::Timeout => {
                warn!(
                    "MPC solve timed out after {:?} ({} iterations)",
                    result.elapsed, result.iterations
                );
                return Err(ControlError::Timeout {
                    elapsed: result.elapsed,
                    budget: self.time_budget,
                });
            }
            status => {
                warn!(
                    "MPC solve failed with {status:?} after {} iterations, \
                     constraint violation {:.3e}",
                    result.iterations, result.constraint_violation
                );
                return Err(ControlError::NoFeasibleControl {
                    status,
                    violation: result.constraint_violation,
                });
            }
        }

        debug!(
            "Cost {:.4} ({} iterations, {:?})",
            result.objective, result.iterations, result.elapsed
        );

        Ok(ControlOutput {
            actuation: layout.read_actuation(&result.x, 0),
            predicted: PredictedTrajectory {
                xs: layout.component_series(&result.x, StateComponent::X),
                ys: layout.component_series(&result.x, StateComponent::Y),
            },
            cost: result.objective,
            iterations: result.iterations,
            solve_time: result.elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::solver::{NlpProblem, SolveResult};

    /// Returns a canned result and records what it was asked to solve.
    struct Scripted {
        status: SolveStatus,
        calls: usize,
        last_guess: Vec<f64>,
    }

    impl Scripted {
        fn new(status: SolveStatus) -> Self {
            Self {
                status,
                calls: 0,
                last_guess: Vec::new(),
            }
        }
    }

    impl NlpSolver for Scripted {
        fn solve<P: NlpProblem>(
            &mut self,
            problem: &P,
            bounds: &BoundsSet,
            initial_guess: &[f64],
            _time_budget: Duration,
        ) -> Result<SolveResult, SolverError> {
            bounds.check(problem.n_vars(), problem.n_constraints())?;
            self.calls += 1;
            self.last_guess = initial_guess.to_vec();

            let mut x = initial_guess.to_vec();
            // Mark the first actuation so extraction can be checked.
            let steps = problem.n_constraints() / 6;
            x[6 * steps] = 0.125;
            x[6 * steps + steps - 1] = -0.5;

            Ok(SolveResult {
                status: self.status,
                objective: 42.0,
                x,
                iterations: 3,
                constraint_violation: 0.25,
                elapsed: Duration::from_millis(7),
            })
        }
    }

    fn state() -> VehicleState64 {
        VehicleState64 {
            x: 0.0,
            y: 0.0,
            psi: 0.0,
            v: 10.0,
            cte: 0.2,
            epsi: 0.0,
        }
    }

    fn controller(status: SolveStatus) -> MpcController<Scripted> {
        MpcController::with_solver(&MpcConfig::default(), Scripted::new(status)).unwrap()
    }

    #[test]
    fn success_extracts_first_actuation_and_trajectory() {
        let mut mpc = controller(SolveStatus::Success);
        let out = mpc.step(&state(), &ReferencePolynomial::new(vec![0.2])).unwrap();

        let expected = Actuation64 {
            delta: 0.125,
            a: -0.5,
        };
        assert_eq!(out.actuation, expected);
        assert_eq!(out.predicted.xs.len(), 15);
        assert_eq!(out.predicted.ys.len(), 15);
        assert_eq!(out.cost, 42.0);
        assert_eq!(out.iterations, 3);
        assert_eq!(mpc.solver.last_guess[3 * 15], 10.0);
    }

    #[test]
    fn failed_solve_is_an_error_not_a_stale_actuation() {
        for status in [
            SolveStatus::MaxIterations,
            SolveStatus::LocalInfeasibility,
            SolveStatus::NumericalError,
        ] {
            let mut mpc = controller(status);
            let err = mpc.step(&state(), &ReferencePolynomial::default()).unwrap_err();
            let ControlError::NoFeasibleControl {
                status: reported,
                violation,
            } = err
            else {
                panic!("{err:?}");
            };
            assert_eq!(reported, status);
            assert_eq!(violation, 0.25);
        }
    }

    #[test]
    fn timeout_is_reported_separately() {
        let mut mpc = controller(SolveStatus::Timeout);
        let err = mpc.step(&state(), &ReferencePolynomial::default()).unwrap_err();
        assert!(matches!(
            err,
            ControlError::Timeout { budget, .. } if budget == Duration::from_millis(500)
        ));
    }

    #[test]
    fn non_finite_inputs_never_reach_the_solver() {
        let mut mpc = controller(SolveStatus::Success);

        let mut bad = state();
        bad.epsi = f64::NAN;
        assert!(matches!(
            mpc.step(&bad, &ReferencePolynomial::default()),
            Err(ControlError::NonFiniteState)
        ));

        let reference = ReferencePolynomial::new(vec![0.0, f64::INFINITY]);
        assert!(matches!(
            mpc.step(&state(), &reference),
            Err(ControlError::NonFiniteReference)
        ));

        assert_eq!(mpc.solver.calls, 0);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = MpcConfig::default();
        config.horizon.steps = 1;
        assert!(matches!(
            MpcController::new(&config),
            Err(ConfigError::HorizonLength { found: 1, .. })
        ));
    }
}
