//! Generation settings, loaded from and saved to YAML.
//!
//! ```yaml
//! model:
//!   kind: contouring_second_order_unicycle
//! integrator_step: 0.2
//! integrator: rk4
//! variable_map_path: model_map.yaml
//! ```

use crate::discretize::Integrator;
use crate::error::{ModelError, ModelResult};
use crate::model::DynamicsModel;
use crate::realtime::{RealTimeModel, RealTimeSettings};
use crate::unicycle::{ContouringSecondOrderUnicycleModel, SecondOrderUnicycleModel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Selects which dynamics model a generation run uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    SecondOrderUnicycle,
    ContouringSecondOrderUnicycle,
    Realtime { settings: RealTimeSettings },
}

impl ModelKind {
    pub fn build(&self) -> ModelResult<Box<dyn DynamicsModel>> {
        build_model(self)
    }
}

pub fn build_model(kind: &ModelKind) -> ModelResult<Box<dyn DynamicsModel>> {
    Ok(match kind {
        ModelKind::SecondOrderUnicycle => Box::new(SecondOrderUnicycleModel::new()?),
        ModelKind::ContouringSecondOrderUnicycle => {
            Box::new(ContouringSecondOrderUnicycleModel::new()?)
        }
        ModelKind::Realtime { settings } => Box::new(RealTimeModel::new(settings)?),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    pub model: ModelKind,
    /// Integrator stepsize in seconds.
    pub integrator_step: f64,
    #[serde(default)]
    pub integrator: Integrator,
    /// Relative paths are resolved against the directory of the config file.
    #[serde(default = "default_variable_map_path")]
    pub variable_map_path: PathBuf,
}

fn default_variable_map_path() -> PathBuf {
    PathBuf::from("model_map.yaml")
}

impl GenerationConfig {
    pub fn new(model: ModelKind, integrator_step: f64) -> Self {
        Self {
            model,
            integrator_step,
            integrator: Integrator::default(),
            variable_map_path: default_variable_map_path(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if !(self.integrator_step > 0.0 && self.integrator_step.is_finite()) {
            return Err(ModelError::InvalidStepsize(self.integrator_step));
        }
        Ok(())
    }

    pub fn variable_map_path_in(&self, base_dir: &Path) -> PathBuf {
        if self.variable_map_path.is_absolute() {
            self.variable_map_path.clone()
        } else {
            base_dir.join(&self.variable_map_path)
        }
    }
}

pub fn load_config(path: &Path) -> ModelResult<GenerationConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: GenerationConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &GenerationConfig) -> ModelResult<()> {
    config.validate()?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_builtin_model_kind() {
        let yaml = "model:\n  kind: contouring_second_order_unicycle\nintegrator_step: 0.2\n";
        let config: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.model, ModelKind::ContouringSecondOrderUnicycle);
        assert_eq!(config.integrator, Integrator::Rk4);
        assert_eq!(config.variable_map_path, PathBuf::from("model_map.yaml"));

        let model = config.model.build().unwrap();
        assert_eq!(model.nx(), 5);
        assert_eq!(model.states()[4], "spline");
    }

    #[test]
    fn parses_realtime_settings() {
        let yaml = r#"
model:
  kind: realtime
  settings:
    states:
      - { name: p, lower: -10.0, upper: 10.0 }
      - { name: v, lower: -1.0, upper: 1.0 }
    inputs:
      - { name: f, lower: -2.0, upper: 2.0 }
    dynamics: ["v", "f"]
integrator_step: 0.05
integrator: explicit_euler
variable_map_path: maps/point_mass.yaml
"#;
        let config: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.integrator, Integrator::ExplicitEuler);
        let model = build_model(&config.model).unwrap();
        assert_eq!((model.nu(), model.nx()), (1, 2));
        assert_eq!(
            config.variable_map_path_in(Path::new("/tmp/run")),
            PathBuf::from("/tmp/run/maps/point_mass.yaml")
        );
    }

    #[test]
    fn rejects_unknown_fields_and_bad_steps() {
        let yaml = "model:\n  kind: second_order_unicycle\nintegrator_step: 0.1\nhorizon: 20\n";
        assert!(serde_yaml::from_str::<GenerationConfig>(yaml).is_err());

        let config = GenerationConfig::new(ModelKind::SecondOrderUnicycle, 0.0);
        assert!(matches!(
            config.validate(),
            Err(ModelError::InvalidStepsize(_))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("mpc_model_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");

        let config = GenerationConfig::new(ModelKind::SecondOrderUnicycle, 0.2);
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        std::fs::remove_file(&path).ok();
    }
}
