use std::ops::{AddAssign, SubAssign};

use num_dual::DualNum;

/// Scalar the horizon problem is evaluated with.
///
/// `f64` gives plain values; `Dual64` and `HyperDual64` are what the solver feeds in
/// when it needs first and second derivatives.
pub trait AdScalar: DualNum<f64> + nalgebra::Scalar + Copy + AddAssign + SubAssign {}

impl<T> AdScalar for T where T: DualNum<f64> + nalgebra::Scalar + Copy + AddAssign + SubAssign {}

#[inline]
pub(crate) fn square<T: AdScalar>(e: T) -> T {
    e * e
}
