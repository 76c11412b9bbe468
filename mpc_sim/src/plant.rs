//! Simulated vehicle the controller drives.

use bicycle_mpc::config::BoundLimits;
use bicycle_mpc::{Actuation64, KinematicBicycle, ReferencePolynomial, VehicleState64};
use serde::Deserialize;

/// Integration substeps per control period.
const SUBSTEPS: usize = 10;

/// World-frame pose and speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
    pub v: f64,
}

/// Kinematic bicycle integrated in the world frame.
///
/// Actuations are saturated at the actuator limits before they are applied.
pub struct Plant {
    state: VehicleState64,
    model: KinematicBicycle,
    limits: BoundLimits,
}

impl Plant {
    pub fn new(pose: Pose, model: KinematicBicycle, limits: BoundLimits) -> Self {
        Self {
            state: VehicleState64 {
                x: pose.x,
                y: pose.y,
                psi: pose.psi,
                v: pose.v,
                cte: 0.0,
                epsi: 0.0,
            },
            model,
            limits,
        }
    }

    /// Measured state with the tracking errors taken against `reference` at the current
    /// position.
    pub fn observe(&self, reference: &ReferencePolynomial) -> VehicleState64 {
        VehicleState64 {
            cte: reference.eval(self.state.x) - self.state.y,
            epsi: self.state.psi - reference.desired_heading(self.state.x),
            ..self.state
        }
    }

    pub fn advance(
        &mut self,
        actuation: &Actuation64,
        period: f64,
        reference: &ReferencePolynomial,
    ) {
        let applied = self.saturate(actuation);
        let dt = period / SUBSTEPS as f64;
        for _ in 0..SUBSTEPS {
            self.state = self.model.next(&self.state, &applied, reference, dt);
        }
    }

    pub fn saturate(&self, actuation: &Actuation64) -> Actuation64 {
        Actuation64 {
            delta: actuation.delta.clamp(-self.limits.steering, self.limits.steering),
            a: actuation.a.clamp(-self.limits.acceleration, self.limits.acceleration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(v: f64) -> Plant {
        Plant::new(
            Pose {
                x: 0.0,
                y: 0.0,
                psi: 0.0,
                v,
            },
            KinematicBicycle::new(2.67),
            BoundLimits::default(),
        )
    }

    #[test]
    fn observation_measures_errors_against_reference() {
        let p = plant(5.0);
        let reference = ReferencePolynomial::new(vec![0.5, 1.0]);
        let s = p.observe(&reference);

        assert_eq!(s.cte, 0.5);
        assert!((s.epsi + std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(s.v, 5.0);
    }

    #[test]
    fn straight_drive_covers_speed_times_period() {
        let mut p = plant(10.0);
        let flat = ReferencePolynomial::default();
        p.advance(&Actuation64 { delta: 0.0, a: 0.0 }, 0.1, &flat);

        let s = p.observe(&flat);
        assert!((s.x - 1.0).abs() < 1e-12);
        assert_eq!(s.y, 0.0);
    }

    #[test]
    fn commands_are_saturated() {
        let p = plant(0.0);
        let command = Actuation64 {
            delta: 2.0,
            a: -3.0,
        };
        let applied = p.saturate(&command);
        let expected = Actuation64 {
            delta: 0.436332,
            a: -1.0,
        };
        assert_eq!(applied, expected);
    }
}
