//! The dynamics-model contract shared by every vehicle model.
//!
//! A model is defined in two phases. The pure part, [`ModelSpec`], owns the
//! variable names, bounds and the precomputed name lookup. Binding the model to
//! a [`SymbolSource`] produces a [`BoundModel`] carrying the combined symbolic
//! vector `z = [u; x]`; the model itself is never mutated.
//!
//! Layout of `z` and of the bound vectors: inputs occupy `[0, nu)`, states
//! occupy `[nu, nu + nx)`.

use crate::discretize::{self, Integrator};
use crate::error::{ModelError, ModelResult};
use crate::symbolic::{Expr, SymVector, SymbolSource};
use crate::variable_map::VariableMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Whether a variable is a state or a control input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarKind {
    #[serde(rename = "x")]
    State,
    #[serde(rename = "u")]
    Input,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::State => "x",
            VarKind::Input => "u",
        }
    }
}

/// Position of a variable inside the combined vector `z = [u; x]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarIndex {
    pub kind: VarKind,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
    /// `upper - lower`
    pub range: f64,
}

/// Names, bounds and index layout of a model.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    states: Vec<String>,
    inputs: Vec<String>,
    lower_bound: Vec<f64>,
    upper_bound: Vec<f64>,
    lookup: HashMap<String, VarIndex>,
}

impl ModelSpec {
    /// Builds a spec, checking bound lengths, name uniqueness across states
    /// and inputs, and `lower <= upper` for every variable.
    ///
    /// Bounds are laid out as `[inputs..., states...]`.
    pub fn new(
        name: impl Into<String>,
        states: impl IntoIterator<Item = impl Into<String>>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        lower_bound: Vec<f64>,
        upper_bound: Vec<f64>,
    ) -> ModelResult<Self> {
        let name = name.into();
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        let nu = inputs.len();
        let nvar = nu + states.len();

        if lower_bound.len() != nvar {
            return Err(ModelError::shape("lower_bound", nvar, lower_bound.len()));
        }
        if upper_bound.len() != nvar {
            return Err(ModelError::shape("upper_bound", nvar, upper_bound.len()));
        }

        let mut lookup = HashMap::with_capacity(nvar);
        let layout = inputs
            .iter()
            .enumerate()
            .map(|(i, n)| (n, VarKind::Input, i))
            .chain(
                states
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (n, VarKind::State, nu + i)),
            );
        for (var, kind, index) in layout {
            if lookup.insert(var.clone(), VarIndex { kind, index }).is_some() {
                return Err(ModelError::DuplicateName { name: var.clone() });
            }
            let (lower, upper) = (lower_bound[index], upper_bound[index]);
            // NaN on either side fails the comparison.
            if !(lower <= upper) {
                return Err(ModelError::InvertedBounds {
                    name: var.clone(),
                    lower,
                    upper,
                });
            }
        }

        debug!(model = %name, nu, nx = states.len(), "model spec built");
        Ok(Self {
            name,
            states,
            inputs,
            lower_bound,
            upper_bound,
            lookup,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nu(&self) -> usize {
        self.inputs.len()
    }

    pub fn nx(&self) -> usize {
        self.states.len()
    }

    pub fn get_nvar(&self) -> usize {
        self.nu() + self.nx()
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn lower_bound(&self) -> &[f64] {
        &self.lower_bound
    }

    pub fn upper_bound(&self) -> &[f64] {
        &self.upper_bound
    }

    pub fn lookup(&self, name: &str) -> ModelResult<VarIndex> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::unknown(name))
    }

    pub fn get_bounds(&self, name: &str) -> ModelResult<Bounds> {
        let VarIndex { index, .. } = self.lookup(name)?;
        let (lower, upper) = (self.lower_bound[index], self.upper_bound[index]);
        Ok(Bounds {
            lower,
            upper,
            range: upper - lower,
        })
    }
}

/// Capability interface implemented by every vehicle model.
pub trait DynamicsModel {
    fn spec(&self) -> &ModelSpec;

    /// Continuous-time vector field: one derivative per state, ordered like
    /// `states`. `x` has `nx` entries and `u` has `nu` entries.
    fn continuous_model(&self, x: &[Expr], u: &[Expr]) -> Vec<Expr>;

    fn nu(&self) -> usize {
        self.spec().nu()
    }

    fn nx(&self) -> usize {
        self.spec().nx()
    }

    fn get_nvar(&self) -> usize {
        self.spec().get_nvar()
    }

    fn states(&self) -> &[String] {
        self.spec().states()
    }

    fn inputs(&self) -> &[String] {
        self.spec().inputs()
    }

    fn get_bounds(&self, name: &str) -> ModelResult<Bounds> {
        self.spec().get_bounds(name)
    }

    fn variable_map(&self) -> VariableMap {
        VariableMap::from_spec(self.spec())
    }

    /// Writes the name to `[kind, index]` map to `destination`, replacing any
    /// existing file.
    fn export_variable_map(&self, destination: &Path) -> ModelResult<()> {
        self.variable_map().write(destination)
    }

    fn bind(&self, source: &SymbolSource) -> ModelResult<BoundModel<'_>>
    where
        Self: Sized,
    {
        BoundModel::new(self, source)
    }
}

/// A model together with the symbolic vector `z = [u; x]` it was bound to.
pub struct BoundModel<'a> {
    model: &'a dyn DynamicsModel,
    z: SymVector,
}

impl<'a> BoundModel<'a> {
    /// Binds `model` to fresh symbols `u_0..` and `x_0..` from `source`.
    pub fn new(model: &'a dyn DynamicsModel, source: &SymbolSource) -> ModelResult<Self> {
        let u = source.vector("u", model.nu());
        let x = source.vector("x", model.nx());
        Self::with_vector(model, u.vertcat(&x))
    }

    /// Binds `model` to an existing combined vector.
    pub fn with_vector(model: &'a dyn DynamicsModel, z: SymVector) -> ModelResult<Self> {
        let (nu, nx) = (model.nu(), model.nx());
        if z.len() != nu + nx {
            return Err(ModelError::shape("combined vector", nu + nx, z.len()));
        }
        let derivatives = model.continuous_model(&z[nu..], &z[..nu]);
        if derivatives.len() != nx {
            return Err(ModelError::shape(
                format!("continuous model of {}", model.spec().name()),
                nx,
                derivatives.len(),
            ));
        }
        debug!(model = model.spec().name(), nvar = z.len(), "model bound");
        Ok(Self { model, z })
    }

    pub fn model(&self) -> &'a dyn DynamicsModel {
        self.model
    }

    pub fn z(&self) -> &SymVector {
        &self.z
    }

    pub fn u(&self) -> SymVector {
        self.z.slice(0..self.model.nu())
    }

    pub fn x(&self) -> SymVector {
        self.z.slice(self.model.nu()..self.z.len())
    }

    /// Symbolic entry of the state or input called `name`.
    pub fn get(&self, name: &str) -> ModelResult<&Expr> {
        let VarIndex { index, .. } = self.model.spec().lookup(name)?;
        Ok(&self.z[index])
    }

    /// `f(x, u)` evaluated on the bound symbols.
    pub fn explicit_dynamics(&self) -> SymVector {
        let nu = self.model.nu();
        self.model
            .continuous_model(&self.z[nu..], &self.z[..nu])
            .into()
    }

    /// `x_dot - f(x, u)`, the residual form used by implicit integrators.
    pub fn implicit_dynamics(&self, x_dot: &SymVector) -> ModelResult<SymVector> {
        let nx = self.model.nx();
        if x_dot.len() != nx {
            return Err(ModelError::shape("x_dot", nx, x_dot.len()));
        }
        Ok(x_dot
            .iter()
            .zip(self.explicit_dynamics())
            .map(|(xd, f)| xd - f)
            .collect())
    }

    /// Discrete-time state update over one RK4 step of `stepsize` seconds.
    pub fn discretize(&self, stepsize: f64) -> ModelResult<SymVector> {
        discretize::discretize(&self.z, self.model, stepsize)
    }

    pub fn discretize_with(&self, integrator: Integrator, stepsize: f64) -> ModelResult<SymVector> {
        discretize::discretize_with(&self.z, self.model, integrator, stepsize)
    }
}
