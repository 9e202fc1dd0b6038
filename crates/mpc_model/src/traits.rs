use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric types a compiled model can be evaluated on.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts an `f64` literal, falling back to NaN when the type cannot hold it.
    fn lit(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Right-hand side `dx/dt = f(t, x)` of a model with its inputs already fixed.
pub trait VectorField<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `dxdt`. Both slices have length `dimension()`.
    fn eval(&self, t: T, x: &[T], dxdt: &mut [T]);
}

/// Fixed-step integration of a [`VectorField`].
pub trait Stepper<T: Scalar> {
    /// Advances `x` and `t` by one step of length `h`.
    fn advance(&mut self, field: &impl VectorField<T>, t: &mut T, x: &mut [T], h: T);
}
