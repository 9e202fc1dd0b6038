//! Numeric evaluation of a bound model: continuous vector field, discrete
//! update, its Jacobians, and forward simulation under a held input.

use crate::discretize::Integrator;
use crate::equation_engine::CompiledFunction;
use crate::error::{ModelError, ModelResult};
use crate::model::BoundModel;
use crate::solvers::{ExplicitEuler, RK4};
use crate::symbolic::Symbol;
use crate::traits::{Stepper, VectorField};
use nalgebra::DMatrix;
use std::cell::RefCell;
use tracing::debug;

/// Discrete update linearized around an operating point:
/// `x_next ≈ x_next(x0, u0) + a (x - x0) + b (u - u0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    pub x_next: Vec<f64>,
    /// nx × nx
    pub a: DMatrix<f64>,
    /// nx × nu
    pub b: DMatrix<f64>,
}

pub struct NumericModel {
    nu: usize,
    nx: usize,
    integrator: Integrator,
    stepsize: f64,
    continuous: CompiledFunction,
    discrete: CompiledFunction,
    // Row-major nx × (nu + nx), columns in z order.
    jacobian: CompiledFunction,
}

impl NumericModel {
    pub fn new(bound: &BoundModel<'_>, integrator: Integrator, stepsize: f64) -> ModelResult<Self> {
        let model = bound.model();
        let (nu, nx) = (model.nu(), model.nx());
        let args: Vec<Symbol> = bound
            .z()
            .symbols()
            .ok_or_else(|| ModelError::FreeSymbol {
                symbol: "non-symbolic entry of z".to_string(),
            })?;

        let discrete = bound.discretize_with(integrator, stepsize)?;
        let jacobian: Vec<_> = discrete
            .iter()
            .flat_map(|out| args.iter().map(move |arg| out.diff(arg)))
            .collect();

        debug!(
            model = model.spec().name(),
            ?integrator,
            stepsize,
            jacobian_entries = jacobian.len(),
            "compiled numeric model"
        );
        Ok(Self {
            nu,
            nx,
            integrator,
            stepsize,
            continuous: CompiledFunction::new(&args, &bound.explicit_dynamics())?,
            discrete: CompiledFunction::new(&args, &discrete)?,
            jacobian: CompiledFunction::new(&args, &jacobian)?,
        })
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn stepsize(&self) -> f64 {
        self.stepsize
    }

    fn pack(&self, x: &[f64], u: &[f64]) -> ModelResult<Vec<f64>> {
        if x.len() != self.nx {
            return Err(ModelError::shape("state", self.nx, x.len()));
        }
        if u.len() != self.nu {
            return Err(ModelError::shape("input", self.nu, u.len()));
        }
        let mut z = Vec::with_capacity(self.nu + self.nx);
        z.extend_from_slice(u);
        z.extend_from_slice(x);
        Ok(z)
    }

    /// `dx/dt = f(x, u)`
    pub fn continuous(&self, x: &[f64], u: &[f64]) -> ModelResult<Vec<f64>> {
        self.continuous.call(&self.pack(x, u)?)
    }

    /// One discrete step from the symbolic integrator.
    pub fn step(&self, x: &[f64], u: &[f64]) -> ModelResult<Vec<f64>> {
        self.discrete.call(&self.pack(x, u)?)
    }

    pub fn linearize(&self, x: &[f64], u: &[f64]) -> ModelResult<Linearization> {
        let z = self.pack(x, u)?;
        let nvar = self.nu + self.nx;
        let entries = self.jacobian.call(&z)?;
        let full = DMatrix::from_row_slice(self.nx, nvar, &entries);
        Ok(Linearization {
            x_next: self.discrete.call(&z)?,
            a: full.columns(self.nu, self.nx).into_owned(),
            b: full.columns(0, self.nu).into_owned(),
        })
    }

    /// The continuous dynamics with `u` held constant, as a plain vector field.
    pub fn held_input(&self, u: &[f64]) -> ModelResult<HeldInput<'_>> {
        let z = self.pack(&vec![0.0; self.nx], u)?;
        Ok(HeldInput {
            model: self,
            z: RefCell::new(z),
        })
    }

    /// Integrates `steps` steps numerically from `x0` under the held input `u`.
    /// Returns `steps + 1` states including `x0`.
    pub fn simulate(&self, x0: &[f64], u: &[f64], steps: usize) -> ModelResult<Vec<Vec<f64>>> {
        if x0.len() != self.nx {
            return Err(ModelError::shape("initial state", self.nx, x0.len()));
        }
        let system = self.held_input(u)?;
        let mut state = x0.to_vec();
        let mut t = 0.0;
        let mut trajectory = Vec::with_capacity(steps + 1);
        trajectory.push(state.clone());

        match self.integrator {
            Integrator::Rk4 => {
                let mut solver = RK4::new(self.nx);
                for _ in 0..steps {
                    solver.advance(&system, &mut t, &mut state, self.stepsize);
                    trajectory.push(state.clone());
                }
            }
            Integrator::ExplicitEuler => {
                let mut solver = ExplicitEuler::new(self.nx);
                for _ in 0..steps {
                    solver.advance(&system, &mut t, &mut state, self.stepsize);
                    trajectory.push(state.clone());
                }
            }
        }
        Ok(trajectory)
    }
}

pub struct HeldInput<'a> {
    model: &'a NumericModel,
    // [u; x] scratch buffer, u fixed at construction
    z: RefCell<Vec<f64>>,
}

impl VectorField<f64> for HeldInput<'_> {
    fn dimension(&self) -> usize {
        self.model.nx
    }

    fn eval(&self, _t: f64, x: &[f64], dxdt: &mut [f64]) {
        if x.len() != self.model.nx {
            dxdt.fill(f64::NAN);
            return;
        }
        let mut z = self.z.borrow_mut();
        z[self.model.nu..].copy_from_slice(x);
        if self.model.continuous.eval(&z[..], dxdt).is_err() {
            dxdt.fill(f64::NAN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicsModel;
    use crate::symbolic::SymbolSource;
    use crate::unicycle::{ContouringSecondOrderUnicycleModel, SecondOrderUnicycleModel};
    use approx::assert_relative_eq;

    #[test]
    fn symbolic_step_matches_numeric_solver() {
        let model = ContouringSecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let x0 = [1.0, -2.0, 0.3, 1.2, 4.0];
        let u = [0.5, -0.4];

        for integrator in [Integrator::Rk4, Integrator::ExplicitEuler] {
            let numeric = NumericModel::new(&bound, integrator, 0.2).unwrap();
            let symbolic = numeric.step(&x0, &u).unwrap();
            let simulated = numeric.simulate(&x0, &u, 1).unwrap();
            assert_eq!(simulated.len(), 2);
            for (a, b) in symbolic.iter().zip(&simulated[1]) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn continuous_evaluates_unicycle_law() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let numeric = NumericModel::new(&bound, Integrator::Rk4, 0.1).unwrap();

        let dx = numeric.continuous(&[0.0, 0.0, 0.5, 2.0], &[1.0, -0.3]).unwrap();
        assert_relative_eq!(dx[0], 2.0 * 0.5_f64.cos());
        assert_relative_eq!(dx[1], 2.0 * 0.5_f64.sin());
        assert_relative_eq!(dx[2], -0.3);
        assert_relative_eq!(dx[3], 1.0);

        assert!(matches!(
            numeric.continuous(&[0.0; 3], &[0.0; 2]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn linearization_matches_finite_differences() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let numeric = NumericModel::new(&bound, Integrator::Rk4, 0.1).unwrap();

        let x0 = [0.4, 0.1, 0.7, 1.5];
        let u0 = [0.2, 0.6];
        let lin = numeric.linearize(&x0, &u0).unwrap();
        assert_eq!(lin.a.shape(), (4, 4));
        assert_eq!(lin.b.shape(), (4, 2));

        let h = 1e-6;
        for j in 0..4 {
            let mut plus = x0;
            let mut minus = x0;
            plus[j] += h;
            minus[j] -= h;
            let fp = numeric.step(&plus, &u0).unwrap();
            let fm = numeric.step(&minus, &u0).unwrap();
            for i in 0..4 {
                assert_relative_eq!(lin.a[(i, j)], (fp[i] - fm[i]) / (2.0 * h), epsilon = 1e-6);
            }
        }
        for j in 0..2 {
            let mut plus = u0;
            let mut minus = u0;
            plus[j] += h;
            minus[j] -= h;
            let fp = numeric.step(&x0, &plus).unwrap();
            let fm = numeric.step(&x0, &minus).unwrap();
            for i in 0..4 {
                assert_relative_eq!(lin.b[(i, j)], (fp[i] - fm[i]) / (2.0 * h), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn held_input_yields_nan_for_wrong_state_length() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let numeric = NumericModel::new(&bound, Integrator::Rk4, 0.1).unwrap();
        let system = numeric.held_input(&[1.0, 0.0]).unwrap();
        assert_eq!(system.dimension(), 4);

        let mut out = [0.0; 4];
        system.eval(0.0, &[0.0; 3], &mut out);
        assert!(out.iter().all(|v| v.is_nan()));

        system.eval(0.0, &[0.0, 0.0, 0.0, 2.0], &mut out);
        assert_eq!(out, [2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn simulation_drives_straight_at_constant_speed() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let numeric = NumericModel::new(&bound, Integrator::Rk4, 0.5).unwrap();

        let trajectory = numeric.simulate(&[0.0, 0.0, 0.0, 1.0], &[0.0, 0.0], 4).unwrap();
        assert_eq!(trajectory.len(), 5);
        let last = &trajectory[4];
        assert_relative_eq!(last[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(last[1], 0.0, epsilon = 1e-12);
    }
}
