//! A dynamics model whose layout, bounds and vector field come from settings
//! rather than from code.

use crate::error::{ModelError, ModelResult};
use crate::equation_engine::parse;
use crate::model::{DynamicsModel, ModelSpec};
use crate::symbolic::{Expr, Symbol, SymbolSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSettings {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// Recognized settings of a [`RealTimeModel`].
///
/// - `states` fixes `nx`, the state names and their bounds, in order.
/// - `inputs` fixes `nu`, the input names and their bounds, in order.
/// - `dynamics` holds one equation per state giving its time derivative,
///   written over state and input names (e.g. `v * cos(psi)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealTimeSettings {
    #[serde(default = "default_name")]
    pub name: String,
    pub states: Vec<VariableSettings>,
    pub inputs: Vec<VariableSettings>,
    pub dynamics: Vec<String>,
}

fn default_name() -> String {
    "realtime".to_string()
}

pub struct RealTimeModel {
    spec: ModelSpec,
    /// Placeholder symbols `[u; x]` the parsed law is written in.
    placeholders: Vec<Symbol>,
    law: Vec<Expr>,
}

impl RealTimeModel {
    pub fn new(settings: &RealTimeSettings) -> ModelResult<Self> {
        let bounds = settings.inputs.iter().chain(&settings.states);
        let spec = ModelSpec::new(
            settings.name.clone(),
            settings.states.iter().map(|s| s.name.clone()),
            settings.inputs.iter().map(|s| s.name.clone()),
            bounds.clone().map(|s| s.lower).collect(),
            bounds.map(|s| s.upper).collect(),
        )?;

        let nx = spec.nx();
        if settings.dynamics.len() != nx {
            return Err(ModelError::shape("dynamics", nx, settings.dynamics.len()));
        }

        let source = SymbolSource::new();
        let z = source
            .vector("u", spec.nu())
            .vertcat(&source.vector("x", nx));
        let resolve = |name: &str| spec.lookup(name).ok().map(|idx| z[idx.index].clone());
        let law = settings
            .dynamics
            .iter()
            .map(|equation| {
                parse(equation, &resolve).map_err(|message| ModelError::Parse {
                    equation: equation.clone(),
                    message,
                })
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let placeholders = z
            .symbols()
            .ok_or_else(|| ModelError::shape("placeholder symbols", z.len(), 0))?;
        debug!(model = spec.name(), equations = law.len(), "parsed realtime dynamics");
        Ok(Self {
            spec,
            placeholders,
            law,
        })
    }
}

impl DynamicsModel for RealTimeModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn continuous_model(&self, x: &[Expr], u: &[Expr]) -> Vec<Expr> {
        let bindings: HashMap<Symbol, Expr> = self
            .placeholders
            .iter()
            .cloned()
            .zip(u.iter().chain(x).cloned())
            .collect();
        self.law.iter().map(|f| f.substitute(&bindings)).collect()
    }
}
