//! One model-definition pass: construct the model, bind it to fresh symbols,
//! discretize its dynamics and export the variable map.
//!
//! Any failure aborts the pass before the variable map is written.

use crate::config::{build_model, load_config, GenerationConfig};
use crate::model::BoundModel;
use crate::symbolic::SymbolSource;
use crate::variable_map::VariableMap;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub model_name: String,
    pub nu: usize,
    pub nx: usize,
    /// Discrete-time state update, one rendered expression per state.
    pub discrete_update: Vec<String>,
    pub variable_map: VariableMap,
    pub variable_map_path: PathBuf,
}

/// Runs a pass for `config`, resolving relative output paths against `base_dir`.
pub fn generate(config: &GenerationConfig, base_dir: &Path) -> Result<GenerationReport> {
    config.validate().context("Invalid generation config.")?;

    let model = build_model(&config.model).context("Failed to construct the dynamics model.")?;
    let spec = model.spec();
    info!(model = spec.name(), nu = spec.nu(), nx = spec.nx(), "constructed dynamics model");

    let source = SymbolSource::new();
    let bound = BoundModel::new(model.as_ref(), &source)
        .with_context(|| format!("Failed to bind model `{}` to symbols.", spec.name()))?;

    let discrete = bound
        .discretize_with(config.integrator, config.integrator_step)
        .with_context(|| format!("Failed to discretize model `{}`.", spec.name()))?;
    info!(
        integrator = ?config.integrator,
        stepsize = config.integrator_step,
        "discretized dynamics"
    );

    let variable_map_path = config.variable_map_path_in(base_dir);
    model
        .export_variable_map(&variable_map_path)
        .with_context(|| {
            format!(
                "Failed to write variable map to {}.",
                variable_map_path.display()
            )
        })?;

    Ok(GenerationReport {
        model_name: spec.name().to_string(),
        nu: spec.nu(),
        nx: spec.nx(),
        discrete_update: discrete.iter().map(ToString::to_string).collect(),
        variable_map: model.variable_map(),
        variable_map_path,
    })
}

/// Loads the config at `config_path` and runs a pass next to it.
pub fn generate_from_file(config_path: &Path) -> Result<GenerationReport> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config {}.", config_path.display()))?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    generate(&config, base_dir)
}
