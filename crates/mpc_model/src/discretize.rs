use crate::error::{ModelError, ModelResult};
use crate::model::DynamicsModel;
use crate::symbolic::{Expr, SymVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed-step integration scheme used to discretize continuous dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// Classic Runge-Kutta 4th order.
    #[default]
    Rk4,
    ExplicitEuler,
}

/// Discrete-time state update of `model` over one RK4 step.
///
/// `z` is the combined vector `[u; x]`; the input segment is held constant
/// across the step.
pub fn discretize(z: &[Expr], model: &dyn DynamicsModel, stepsize: f64) -> ModelResult<SymVector> {
    discretize_with(z, model, Integrator::Rk4, stepsize)
}

pub fn discretize_with(
    z: &[Expr],
    model: &dyn DynamicsModel,
    integrator: Integrator,
    stepsize: f64,
) -> ModelResult<SymVector> {
    let (nu, nx) = (model.nu(), model.nx());
    if z.len() != nu + nx {
        return Err(ModelError::shape("combined vector", nu + nx, z.len()));
    }
    debug!(
        model = model.spec().name(),
        ?integrator,
        stepsize,
        "discretizing continuous dynamics"
    );
    integrate(
        |x, u| model.continuous_model(x, u),
        &z[nu..],
        &z[..nu],
        integrator,
        stepsize,
    )
}

/// Integrates `f(x, u)` symbolically over one step of `stepsize` seconds.
pub fn integrate(
    f: impl Fn(&[Expr], &[Expr]) -> Vec<Expr>,
    x: &[Expr],
    u: &[Expr],
    integrator: Integrator,
    stepsize: f64,
) -> ModelResult<SymVector> {
    if !(stepsize > 0.0 && stepsize.is_finite()) {
        return Err(ModelError::InvalidStepsize(stepsize));
    }
    let eval = |state: &[Expr]| -> ModelResult<Vec<Expr>> {
        let k = f(state, u);
        if k.len() != state.len() {
            return Err(ModelError::shape("vector field", state.len(), k.len()));
        }
        Ok(k)
    };
    let dt = stepsize;

    match integrator {
        Integrator::ExplicitEuler => {
            let k1 = eval(x)?;
            Ok(axpy(x, dt, &k1).into())
        }
        Integrator::Rk4 => {
            // k1 = f(x, u)
            let k1 = eval(x)?;
            // k2 = f(x + dt*k1/2, u)
            let k2 = eval(&axpy(x, 0.5 * dt, &k1))?;
            // k3 = f(x + dt*k2/2, u)
            let k3 = eval(&axpy(x, 0.5 * dt, &k2))?;
            // k4 = f(x + dt*k3, u)
            let k4 = eval(&axpy(x, dt, &k3))?;

            // x_next = x + dt/6 * (k1 + 2k2 + 2k3 + k4)
            let sixth = dt / 6.0;
            Ok((0..x.len())
                .map(|i| &x[i] + sixth * (&k1[i] + 2.0 * &k2[i] + 2.0 * &k3[i] + &k4[i]))
                .collect())
        }
    }
}

fn axpy(x: &[Expr], a: f64, k: &[Expr]) -> Vec<Expr> {
    x.iter().zip(k).map(|(xi, ki)| xi + a * ki).collect()
}
