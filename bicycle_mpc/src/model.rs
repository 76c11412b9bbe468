//! Kinematic bicycle model and the reference path it is measured against.

use named_vec_ops::NamedVecOps;
use named_vec_ops_derive::NamedVecOps;
use serde::Deserialize;

use crate::scalar::AdScalar;

/// Number of scalars in a [`VehicleState`].
pub const STATE_SIZE: usize = 6;

/// Number of scalars in an [`Actuation`].
pub const ACTUATION_SIZE: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, NamedVecOps)]
pub struct VehicleState<T> {
    pub x: T,
    pub y: T,
    pub psi: T,
    pub v: T,
    pub cte: T,
    pub epsi: T,
}

pub type VehicleState64 = VehicleState<f64>;

#[derive(Debug, Copy, Clone, PartialEq, NamedVecOps)]
pub struct Actuation<T> {
    /// Steering angle, radians.
    pub delta: T,
    /// Normalised throttle (positive) / brake (negative).
    pub a: T,
}

pub type Actuation64 = Actuation<f64>;

impl Actuation64 {
    /// The `[steering, acceleration]` pair sent to the vehicle.
    pub fn as_array(&self) -> [f64; ACTUATION_SIZE] {
        [self.delta, self.a]
    }
}

/// Index of each state component, in [`VehicleState`] field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateComponent {
    X = 0,
    Y = 1,
    Psi = 2,
    V = 3,
    Cte = 4,
    Epsi = 5,
}

impl StateComponent {
    pub const ALL: [StateComponent; STATE_SIZE] = [
        StateComponent::X,
        StateComponent::Y,
        StateComponent::Psi,
        StateComponent::V,
        StateComponent::Cte,
        StateComponent::Epsi,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Desired path `y = f(x)` in the vehicle's local frame.
///
/// Coefficients are stored lowest order first. An empty polynomial is identically
/// zero.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct ReferencePolynomial {
    coeffs: Vec<f64>,
}

impl ReferencePolynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }

    /// `f(x)`, Horner's rule.
    pub fn eval<T: AdScalar>(&self, x: T) -> T {
        let mut acc = T::from(0.0);
        for c in self.coeffs.iter().rev() {
            acc = acc * x + *c;
        }
        acc
    }

    /// `f'(x)`.
    pub fn derivative<T: AdScalar>(&self, x: T) -> T {
        let mut acc = T::from(0.0);
        for (i, c) in self.coeffs.iter().enumerate().skip(1).rev() {
            acc = acc * x + *c * i as f64;
        }
        acc
    }

    /// Heading of the path tangent at `x`, `atan(f'(x))`.
    pub fn desired_heading<T: AdScalar>(&self, x: T) -> T {
        self.derivative(x).atan()
    }
}

/// Kinematic bicycle approximation used as the prediction model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicBicycle {
    /// Distance from the front axle to the centre of gravity, metres.
    ///
    /// Calibrated rather than measured: tune it until the model's turning radius at a
    /// fixed steering angle matches the vehicle's.
    pub lf: f64,
}

impl KinematicBicycle {
    pub const fn new(lf: f64) -> Self {
        Self { lf }
    }

    /// Propagate `state` under `actuation` for `dt` seconds.
    ///
    /// The tracking errors are re-anchored to `reference` at the current position
    /// before being propagated.
    pub fn next<T: AdScalar>(
        &self,
        state: &VehicleState<T>,
        actuation: &Actuation<T>,
        reference: &ReferencePolynomial,
        dt: f64,
    ) -> VehicleState<T> {
        let yaw_step = state.v * actuation.delta * (dt / self.lf);

        VehicleState {
            x: state.x + state.v * state.psi.cos() * dt,
            y: state.y + state.v * state.psi.sin() * dt,
            psi: state.psi + yaw_step,
            v: state.v + actuation.a * dt,
            cte: (reference.eval(state.x) - state.y) + state.v * state.epsi.sin() * dt,
            epsi: (state.psi - reference.desired_heading(state.x)) + yaw_step,
        }
    }

    /// Roll the model forward over a sequence of actuations, returning every state
    /// including the initial one.
    pub fn rollout(
        &self,
        initial: &VehicleState64,
        actuations: &[Actuation64],
        reference: &ReferencePolynomial,
        dt: f64,
    ) -> Vec<VehicleState64> {
        let mut states = Vec::with_capacity(actuations.len() + 1);
        states.push(*initial);
        let mut state = *initial;
        for actuation in actuations {
            state = self.next(&state, actuation, reference, dt);
            states.push(state);
        }
        states
    }
}

impl VehicleState64 {
    pub fn zeros() -> Self {
        Self::from_svector(&nalgebra::SVector::zeros())
    }

    pub fn is_finite(&self) -> bool {
        self.to_svector().iter().all(|c| c.is_finite())
    }
}
