use crate::traits::{Scalar, Stepper, VectorField};

/// Classic four-stage Runge-Kutta.
pub struct RK4<T: Scalar> {
    // k[0..4] stage slopes
    k: [Vec<T>; 4],
    trial: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![T::zero(); dim]),
            trial: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Stepper<T> for RK4<T> {
    fn advance(&mut self, field: &impl VectorField<T>, t: &mut T, x: &mut [T], h: T) {
        let half = T::lit(0.5);
        // Offsets of stages 2..4 along the previous slope, as fractions of h.
        let offsets = [half, half, T::one()];
        let t0 = *t;

        field.eval(t0, x, &mut self.k[0]);
        for (stage, c) in offsets.into_iter().enumerate() {
            let (done, rest) = self.k.split_at_mut(stage + 1);
            let slope = &done[stage];
            for ((p, xi), ki) in self.trial.iter_mut().zip(x.iter()).zip(slope) {
                *p = *xi + h * c * *ki;
            }
            field.eval(t0 + h * c, &self.trial, &mut rest[0]);
        }

        let two = T::lit(2.0);
        let w = h / T::lit(6.0);
        let [k1, k2, k3, k4] = &self.k;
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = *xi + w * (k1[i] + two * (k2[i] + k3[i]) + k4[i]);
        }
        *t = t0 + h;
    }
}

/// Forward Euler.
pub struct ExplicitEuler<T: Scalar> {
    slope: Vec<T>,
}

impl<T: Scalar> ExplicitEuler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            slope: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Stepper<T> for ExplicitEuler<T> {
    fn advance(&mut self, field: &impl VectorField<T>, t: &mut T, x: &mut [T], h: T) {
        field.eval(*t, x, &mut self.slope);
        for (xi, si) in x.iter_mut().zip(&self.slope) {
            *xi = *xi + h * *si;
        }
        *t = *t + h;
    }
}
