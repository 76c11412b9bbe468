//! Decision-variable and constraint layout of the horizon problem.
//!
//! The variable vector is eight contiguous blocks:
//!
//! ```text
//! [ x_0..x_{N-1} | y | psi | v | cte | epsi | delta_0..delta_{N-2} | a_0..a_{N-2} ]
//! ```
//!
//! and the constraint vector holds six residuals per step, `6 * t + k` for state
//! component `k` at step `t`. All index arithmetic goes through [`HorizonLayout`].

use std::ops::Range;

use nalgebra::SVector;
use named_vec_ops::NamedVecOps;

use crate::error::ConfigError;
use crate::model::{Actuation, StateComponent, VehicleState, ACTUATION_SIZE, STATE_SIZE};
use crate::scalar::AdScalar;

/// Shortest horizon: one actuation pair needs two states.
pub const MIN_HORIZON: usize = 2;

/// Longest horizon accepted.
///
/// The solver works on dense matrices of side `8 * N`; past a few hundred steps a solve
/// no longer fits any realistic cycle time.
pub const MAX_HORIZON: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonLayout {
    steps: usize,
    delta_start: usize,
    acc_start: usize,
    n_vars: usize,
}

impl HorizonLayout {
    pub fn new(steps: usize) -> Result<Self, ConfigError> {
        if !(MIN_HORIZON..=MAX_HORIZON).contains(&steps) {
            return Err(ConfigError::HorizonLength {
                found: steps,
                min: MIN_HORIZON,
                max: MAX_HORIZON,
            });
        }

        let delta_start = STATE_SIZE * steps;
        let acc_start = delta_start + steps - 1;
        let n_vars = acc_start + steps - 1;

        Ok(Self {
            steps,
            delta_start,
            acc_start,
            n_vars,
        })
    }

    /// Number of states `N` in the horizon.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of actuation pairs, `N - 1`.
    pub fn actuation_steps(&self) -> usize {
        self.steps - 1
    }

    /// `N * 6 + (N - 1) * 2`.
    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// `N * 6`.
    pub fn n_constraints(&self) -> usize {
        STATE_SIZE * self.steps
    }

    pub fn state_block(&self, component: StateComponent) -> Range<usize> {
        let start = component.index() * self.steps;
        start..start + self.steps
    }

    pub fn state_index(&self, component: usize, t: usize) -> usize {
        debug_assert!(component < STATE_SIZE && t < self.steps);
        component * self.steps + t
    }

    /// All state variables, i.e. everything before the steering block.
    pub fn states(&self) -> Range<usize> {
        0..self.delta_start
    }

    pub fn delta_block(&self) -> Range<usize> {
        self.delta_start..self.acc_start
    }

    pub fn acc_block(&self) -> Range<usize> {
        self.acc_start..self.n_vars
    }

    pub fn delta_index(&self, t: usize) -> usize {
        debug_assert!(t < self.actuation_steps());
        self.delta_start + t
    }

    pub fn acc_index(&self, t: usize) -> usize {
        debug_assert!(t < self.actuation_steps());
        self.acc_start + t
    }

    pub fn constraint_index(&self, component: usize, t: usize) -> usize {
        debug_assert!(component < STATE_SIZE && t < self.steps);
        STATE_SIZE * t + component
    }

    /// The eight variables the dynamics residuals of step `t + 1` read from step `t`.
    pub fn step_variables(&self, t: usize) -> [usize; STATE_SIZE + ACTUATION_SIZE] {
        let mut indices = [0; STATE_SIZE + ACTUATION_SIZE];
        for (k, index) in indices.iter_mut().take(STATE_SIZE).enumerate() {
            *index = self.state_index(k, t);
        }
        indices[STATE_SIZE] = self.delta_index(t);
        indices[STATE_SIZE + 1] = self.acc_index(t);
        indices
    }

    pub fn read_state<T: AdScalar>(&self, vars: &[T], t: usize) -> VehicleState<T> {
        VehicleState::from_fn(|k| vars[self.state_index(k, t)])
    }

    pub fn read_actuation<T: AdScalar>(&self, vars: &[T], t: usize) -> Actuation<T> {
        Actuation {
            delta: vars[self.delta_index(t)],
            a: vars[self.acc_index(t)],
        }
    }

    pub fn write_state<T: AdScalar>(&self, vars: &mut [T], t: usize, state: &VehicleState<T>) {
        for (k, value) in state.to_svector().iter().enumerate() {
            vars[self.state_index(k, t)] = *value;
        }
    }

    pub fn write_actuation<T: AdScalar>(&self, vars: &mut [T], t: usize, actuation: &Actuation<T>) {
        vars[self.delta_index(t)] = actuation.delta;
        vars[self.acc_index(t)] = actuation.a;
    }

    /// Write the six residuals of step `t` into the constraint vector.
    pub fn write_residuals<T: AdScalar>(
        &self,
        constraints: &mut [T],
        t: usize,
        residual: &SVector<T, STATE_SIZE>,
    ) {
        for (k, value) in residual.iter().enumerate() {
            constraints[self.constraint_index(k, t)] = *value;
        }
    }

    /// Copy one state component over the whole horizon out of a solution.
    pub fn component_series(&self, vars: &[f64], component: StateComponent) -> Vec<f64> {
        vars[self.state_block(component)].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_for_every_supported_horizon() {
        for n in MIN_HORIZON..=60 {
            let layout = HorizonLayout::new(n).unwrap();
            assert_eq!(layout.n_vars(), n * 6 + (n - 1) * 2);
            assert_eq!(layout.n_constraints(), n * 6);
        }
        let longest = HorizonLayout::new(MAX_HORIZON).unwrap();
        assert_eq!(longest.n_vars(), MAX_HORIZON * 8 - 2);
    }

    #[test]
    fn rejects_out_of_range_horizons() {
        assert!(matches!(
            HorizonLayout::new(1),
            Err(ConfigError::HorizonLength { found: 1, .. })
        ));
        assert!(HorizonLayout::new(0).is_err());
        assert!(HorizonLayout::new(MAX_HORIZON + 1).is_err());
    }

    #[test]
    fn blocks_are_contiguous_and_ordered() {
        let layout = HorizonLayout::new(15).unwrap();
        let mut end = 0;
        for component in StateComponent::ALL {
            let block = layout.state_block(component);
            assert_eq!(block.start, end);
            assert_eq!(block.len(), 15);
            end = block.end;
        }
        assert_eq!(layout.states(), 0..end);
        assert_eq!(layout.delta_block(), end..end + 14);
        assert_eq!(layout.acc_block(), end + 14..layout.n_vars());
        assert_eq!(layout.delta_index(0), 90);
        assert_eq!(layout.acc_index(0), 104);
        assert_eq!(layout.state_index(StateComponent::V.index(), 3), 48);
    }

    #[test]
    fn constraints_interleave_per_step() {
        let layout = HorizonLayout::new(4).unwrap();
        assert_eq!(layout.constraint_index(0, 0), 0);
        assert_eq!(layout.constraint_index(5, 0), 5);
        assert_eq!(layout.constraint_index(0, 1), 6);
        assert_eq!(layout.constraint_index(3, 3), 21);
    }

    #[test]
    fn state_and_actuation_round_trip_through_vars() {
        let layout = HorizonLayout::new(5).unwrap();
        let mut vars = vec![0.0; layout.n_vars()];
        let s = VehicleState {
            x: 1.0,
            y: 2.0,
            psi: 3.0,
            v: 4.0,
            cte: 5.0,
            epsi: 6.0,
        };
        let u = Actuation {
            delta: 0.1,
            a: -0.2,
        };

        layout.write_state(&mut vars, 2, &s);
        layout.write_actuation(&mut vars, 3, &u);

        assert_eq!(layout.read_state(&vars, 2), s);
        assert_eq!(layout.read_actuation(&vars, 3), u);
        let psi = layout.component_series(&vars, StateComponent::Psi);
        assert_eq!(psi, vec![0.0, 0.0, 3.0, 0.0, 0.0]);
        assert_eq!(layout.step_variables(2), [2, 7, 12, 17, 22, 27, 32, 36]);
    }
}
