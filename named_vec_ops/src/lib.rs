
/// A struct of named scalar fields that can be viewed as a fixed-size column vector.
///
/// The scalar `T` is left generic so one struct definition serves plain `f64`
/// evaluation as well as dual-number evaluation for derivatives. Field order in the
/// struct is the element order of the vector.
pub trait NamedVecOps<T, const N: usize>:
    Copy
  + Clone
  + std::ops::Add<Self, Output = Self>
  + std::ops::Sub<Self, Output = Self>
  + std::ops::Mul<T, Output = Self>
  + std::ops::AddAssign<Self>
  + std::ops::SubAssign<Self>
{
    const SIZE: usize = N;

    fn to_svector(&self) -> nalgebra::SVector<T, N>;
    fn from_svector(v: &nalgebra::SVector<T, N>) -> Self;

    /// Field names in vector order.
    fn field_names() -> [&'static str; N];

    /// Build from a function of the element index.
    fn from_fn<F: FnMut(usize) -> T>(mut f: F) -> Self
    where
        T: nalgebra::Scalar,
    {
        Self::from_svector(&nalgebra::SVector::from_fn(|i, _| f(i)))
    }
}
