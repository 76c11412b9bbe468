//! Cost and dynamics constraints of the receding-horizon problem.

use std::collections::BTreeSet;

use named_vec_ops::NamedVecOps;

use crate::config::{CostWeights, MpcConfig, ReferenceTargets};
use crate::error::ConfigError;
use crate::layout::HorizonLayout;
use crate::model::{KinematicBicycle, ReferencePolynomial, StateComponent, VehicleState64};
use crate::scalar::{square, AdScalar};
use crate::solver::NlpProblem;

/// Everything about the horizon problem that stays fixed between control cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonFormulation {
    layout: HorizonLayout,
    dt: f64,
    model: KinematicBicycle,
    weights: CostWeights,
    targets: ReferenceTargets,
}

impl HorizonFormulation {
    pub fn new(
        layout: HorizonLayout,
        dt: f64,
        model: KinematicBicycle,
        weights: CostWeights,
        targets: ReferenceTargets,
    ) -> Self {
        Self {
            layout,
            dt,
            model,
            weights,
            targets,
        }
    }

    pub fn from_config(config: &MpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            HorizonLayout::new(config.horizon.steps)?,
            config.horizon.dt,
            KinematicBicycle::new(config.vehicle.lf),
            config.weights,
            config.reference,
        ))
    }

    pub fn layout(&self) -> &HorizonLayout {
        &self.layout
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn model(&self) -> &KinematicBicycle {
        &self.model
    }

    /// Tracking error over all `N` states, actuator effort over the `N - 1`
    /// actuations and actuator rate over the `N - 2` consecutive pairs.
    pub fn cost<T: AdScalar>(&self, vars: &[T]) -> T {
        let layout = &self.layout;
        let w = &self.weights;
        let r = &self.targets;

        let mut cost = T::from(0.0);

        for t in 0..layout.steps() {
            let s = layout.read_state(vars, t);
            cost += square(s.cte - r.cte) * w.cte;
            cost += square(s.epsi - r.epsi) * w.epsi;
            cost += square(s.v - r.v) * w.v;
        }

        for t in 0..layout.actuation_steps() {
            let u = layout.read_actuation(vars, t);
            cost += square(u.delta) * w.delta;
            cost += square(u.a) * w.acc;
        }

        for t in 1..layout.actuation_steps() {
            let change = layout.read_actuation(vars, t) - layout.read_actuation(vars, t - 1);
            cost += square(change.delta) * w.delta_rate;
            cost += square(change.a) * w.acc_rate;
        }

        cost
    }

    /// Residuals of the initial state and of the dynamics.
    ///
    /// Step 0 residuals are the initial state itself, pinned by the constraint
    /// bounds. Every later step holds `state(t) - model(state(t-1), actuation(t-1))`.
    pub fn constraints<T: AdScalar>(
        &self,
        reference: &ReferencePolynomial,
        vars: &[T],
        constraints: &mut [T],
    ) {
        let layout = &self.layout;

        let mut previous = layout.read_state(vars, 0);
        layout.write_residuals(constraints, 0, &previous.to_svector());

        for t in 1..layout.steps() {
            let actuation = layout.read_actuation(vars, t - 1);
            let predicted = self.model.next(&previous, &actuation, reference, self.dt);
            let current = layout.read_state(vars, t);

            layout.write_residuals(constraints, t, &(current - predicted).to_svector());
            previous = current;
        }
    }

    /// `F(vars) -> (cost, constraints)`.
    pub fn residuals<T: AdScalar>(
        &self,
        reference: &ReferencePolynomial,
        vars: &[T],
    ) -> (T, Vec<T>) {
        let mut constraints = vec![T::from(0.0); self.layout.n_constraints()];
        self.constraints(reference, vars, &mut constraints);
        (self.cost(vars), constraints)
    }

    /// All zeros except the initial-state slots.
    pub fn initial_guess(&self, state: &VehicleState64) -> Vec<f64> {
        let mut vars = vec![0.0; self.layout.n_vars()];
        self.layout.write_state(&mut vars, 0, state);
        vars
    }

    /// Lower-triangular entries of the Lagrangian Hessian that can be non-zero.
    ///
    /// The cost is separable apart from the rate terms, which couple consecutive
    /// actuations. The dynamics residuals of step `t + 1` are linear in the state of
    /// step `t + 1` and non-linear in the eight variables of step `t`.
    pub fn hessian_structure(&self) -> Vec<(usize, usize)> {
        let layout = &self.layout;
        let mut entries = BTreeSet::new();
        let mut insert = |i: usize, j: usize| {
            entries.insert((i.max(j), i.min(j)));
        };

        for component in [StateComponent::Cte, StateComponent::Epsi, StateComponent::V] {
            for i in layout.state_block(component) {
                insert(i, i);
            }
        }
        for t in 0..layout.actuation_steps() {
            insert(layout.delta_index(t), layout.delta_index(t));
            insert(layout.acc_index(t), layout.acc_index(t));
            if t > 0 {
                insert(layout.delta_index(t), layout.delta_index(t - 1));
                insert(layout.acc_index(t), layout.acc_index(t - 1));
            }
        }

        for t in 0..layout.actuation_steps() {
            let block = layout.step_variables(t);
            for (a, &i) in block.iter().enumerate() {
                for &j in &block[..=a] {
                    insert(i, j);
                }
            }
        }

        entries.into_iter().collect()
    }
}

/// The horizon problem bound to one cycle's reference, as seen by a solver.
#[derive(Debug, Clone, Copy)]
pub struct HorizonNlp<'a> {
    formulation: &'a HorizonFormulation,
    reference: &'a ReferencePolynomial,
}

impl<'a> HorizonNlp<'a> {
    pub fn new(formulation: &'a HorizonFormulation, reference: &'a ReferencePolynomial) -> Self {
        Self {
            formulation,
            reference,
        }
    }
}

impl NlpProblem for HorizonNlp<'_> {
    fn n_vars(&self) -> usize {
        self.formulation.layout.n_vars()
    }

    fn n_constraints(&self) -> usize {
        self.formulation.layout.n_constraints()
    }

    fn evaluate<T: AdScalar>(&self, vars: &[T], constraints: &mut [T]) -> T {
        self.formulation.constraints(self.reference, vars, constraints);
        self.formulation.cost(vars)
    }

    fn hessian_structure(&self) -> Option<Vec<(usize, usize)>> {
        Some(self.formulation.hessian_structure())
    }
}
