//! Box bounds on the decision variables and equality bounds on the constraints.

use named_vec_ops::NamedVecOps;

use crate::config::BoundLimits;
use crate::error::SolverError;
use crate::layout::HorizonLayout;
use crate::model::VehicleState64;

/// Lower/upper bounds for every variable and every constraint residual.
///
/// A constraint with equal lower and upper bound is an equality.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsSet {
    pub var_lower: Vec<f64>,
    pub var_upper: Vec<f64>,
    pub cons_lower: Vec<f64>,
    pub cons_upper: Vec<f64>,
}

impl BoundsSet {
    /// Bounds for one control cycle starting from `state`.
    ///
    /// States are boxed by `limits.state`, actuations by their actuator limits. The
    /// first six constraints pin the initial state to `state`; the dynamics residuals
    /// of every later step must be exactly zero.
    pub fn generate(layout: &HorizonLayout, limits: &BoundLimits, state: &VehicleState64) -> Self {
        let n_vars = layout.n_vars();
        let n_cons = layout.n_constraints();

        let mut var_lower = vec![0.0; n_vars];
        let mut var_upper = vec![0.0; n_vars];

        let blocks = [
            (layout.states(), limits.state),
            (layout.delta_block(), limits.steering),
            (layout.acc_block(), limits.acceleration),
        ];
        for (block, limit) in blocks {
            var_lower[block.clone()].fill(-limit);
            var_upper[block].fill(limit);
        }

        let mut cons_lower = vec![0.0; n_cons];
        let mut cons_upper = vec![0.0; n_cons];

        let initial = state.to_svector();
        layout.write_residuals(&mut cons_lower, 0, &initial);
        layout.write_residuals(&mut cons_upper, 0, &initial);

        Self {
            var_lower,
            var_upper,
            cons_lower,
            cons_upper,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.var_lower.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.cons_lower.len()
    }

    /// Check the bounds match a problem of the given size and are not inverted.
    pub fn check(&self, n_vars: usize, n_constraints: usize) -> Result<(), SolverError> {
        let sets = [
            ("variable bounds", n_vars, &self.var_lower, &self.var_upper),
            ("constraint bounds", n_constraints, &self.cons_lower, &self.cons_upper),
        ];

        for (what, expected, lower, upper) in sets {
            for found in [lower.len(), upper.len()] {
                if found != expected {
                    return Err(SolverError::DimensionMismatch {
                        what,
                        expected,
                        found,
                    });
                }
            }
            // NaN bounds fail this comparison and are reported as inverted too.
            if let Some(index) = lower.iter().zip(upper).position(|(l, u)| !(l <= u)) {
                return Err(SolverError::InvertedBounds {
                    what,
                    index,
                    lower: lower[index],
                    upper: upper[index],
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VehicleState;

    fn limits() -> BoundLimits {
        BoundLimits {
            state: 1.0e3,
            steering: 0.436332,
            acceleration: 1.0,
        }
    }

    #[test]
    fn initial_state_is_pinned_and_dynamics_are_zero() {
        let layout = HorizonLayout::new(7).unwrap();
        let state = VehicleState {
            x: 1.5,
            y: -2.0,
            psi: 0.3,
            v: 12.0,
            cte: 0.4,
            epsi: -0.05,
        };
        let bounds = BoundsSet::generate(&layout, &limits(), &state);

        let expected = [1.5, -2.0, 0.3, 12.0, 0.4, -0.05];
        assert_eq!(&bounds.cons_lower[..6], &expected);
        assert_eq!(&bounds.cons_upper[..6], &expected);
        assert!(bounds.cons_lower[6..].iter().all(|&b| b == 0.0));
        assert!(bounds.cons_upper[6..].iter().all(|&b| b == 0.0));
        assert_eq!(bounds.n_constraints(), 42);
    }

    #[test]
    fn variable_bounds_are_symmetric_per_block() {
        let layout = HorizonLayout::new(15).unwrap();
        let bounds = BoundsSet::generate(&layout, &limits(), &VehicleState64::zeros());
        assert_eq!(bounds.n_vars(), layout.n_vars());

        for i in layout.states() {
            assert_eq!((bounds.var_lower[i], bounds.var_upper[i]), (-1.0e3, 1.0e3));
        }
        for i in layout.delta_block() {
            assert_eq!((bounds.var_lower[i], bounds.var_upper[i]), (-0.436332, 0.436332));
        }
        for i in layout.acc_block() {
            assert_eq!((bounds.var_lower[i], bounds.var_upper[i]), (-1.0, 1.0));
        }
    }

    #[test]
    fn check_reports_mismatch_and_inversion() {
        let layout = HorizonLayout::new(3).unwrap();
        let mut bounds = BoundsSet::generate(&layout, &limits(), &VehicleState64::zeros());
        assert_eq!(bounds.check(layout.n_vars(), layout.n_constraints()), Ok(()));

        assert!(matches!(
            bounds.check(layout.n_vars() + 1, layout.n_constraints()),
            Err(SolverError::DimensionMismatch { what: "variable bounds", .. })
        ));

        bounds.cons_lower[4] = 1.0;
        bounds.cons_upper[4] = 0.0;
        assert!(matches!(
            bounds.check(layout.n_vars(), layout.n_constraints()),
            Err(SolverError::InvertedBounds { what: "constraint bounds", index: 4, .. })
        ));
    }
}
