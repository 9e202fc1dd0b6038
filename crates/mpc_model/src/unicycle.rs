//! Second-order unicycle models: position, heading and forward speed driven by
//! acceleration `a` and yaw rate `w`.

use crate::error::ModelResult;
use crate::model::{DynamicsModel, ModelSpec};
use crate::symbolic::Expr;
use std::f64::consts::PI;

pub struct SecondOrderUnicycleModel {
    spec: ModelSpec,
}

impl SecondOrderUnicycleModel {
    pub fn new() -> ModelResult<Self> {
        let spec = ModelSpec::new(
            "second_order_unicycle",
            ["x", "y", "psi", "v"],
            ["a", "w"],
            vec![-2.0, -2.0, -200.0, -200.0, -PI, -2.0],
            vec![2.0, 2.0, 200.0, 200.0, PI, 3.0],
        )?;
        Ok(Self { spec })
    }
}

impl DynamicsModel for SecondOrderUnicycleModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn continuous_model(&self, x: &[Expr], u: &[Expr]) -> Vec<Expr> {
        unicycle_law(x, u)
    }
}

/// Unicycle that also tracks its progress `spline` along a reference path.
pub struct ContouringSecondOrderUnicycleModel {
    spec: ModelSpec,
}

impl ContouringSecondOrderUnicycleModel {
    pub fn new() -> ModelResult<Self> {
        let spec = ModelSpec::new(
            "contouring_second_order_unicycle",
            ["x", "y", "psi", "v", "spline"],
            ["a", "w"],
            vec![-2.0, -2.0, -200.0, -200.0, -PI, -2.0, 0.0],
            vec![2.0, 2.0, 200.0, 200.0, PI, 3.0, 2000.0],
        )?;
        Ok(Self { spec })
    }
}

impl DynamicsModel for ContouringSecondOrderUnicycleModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn continuous_model(&self, x: &[Expr], u: &[Expr]) -> Vec<Expr> {
        let mut dx = unicycle_law(x, u);
        // Progress along the path advances at the forward speed.
        dx.push(x[3].clone());
        dx
    }
}

// x = [x, y, psi, v, ...], u = [a, w]
fn unicycle_law(x: &[Expr], u: &[Expr]) -> Vec<Expr> {
    let (a, w) = (&u[0], &u[1]);
    let (psi, v) = (&x[2], &x[3]);

    vec![v * psi.cos(), v * psi.sin(), w.clone(), a.clone()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::CompiledFunction;
    use crate::error::ModelError;
    use crate::model::VarKind;
    use crate::symbolic::SymbolSource;
    use approx::assert_relative_eq;

    fn variants() -> Vec<Box<dyn DynamicsModel>> {
        vec![
            Box::new(SecondOrderUnicycleModel::new().unwrap()),
            Box::new(ContouringSecondOrderUnicycleModel::new().unwrap()),
        ]
    }

    #[test]
    fn layouts_are_consistent() {
        for model in variants() {
            let spec = model.spec();
            assert_eq!(model.states().len(), model.nx());
            assert_eq!(model.inputs().len(), model.nu());
            assert_eq!(spec.lower_bound().len(), model.get_nvar());
            assert_eq!(spec.upper_bound().len(), model.get_nvar());
            for (lo, hi) in spec.lower_bound().iter().zip(spec.upper_bound()) {
                assert!(lo <= hi);
            }
        }
    }

    #[test]
    fn continuous_model_returns_one_derivative_per_state() {
        for model in variants() {
            let source = SymbolSource::new();
            let x = source.vector("x", model.nx());
            let u = source.vector("u", model.nu());
            assert_eq!(model.continuous_model(&x, &u).len(), model.nx());
        }
    }

    #[test]
    fn speed_bounds() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bounds = model.get_bounds("v").unwrap();
        assert_eq!((bounds.lower, bounds.upper, bounds.range), (-2.0, 3.0, 5.0));
        let bounds = model.get_bounds("psi").unwrap();
        assert_relative_eq!(bounds.range, 2.0 * PI);
    }

    #[test]
    fn get_covers_every_variable_and_rejects_others() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();

        for name in model.states().iter().chain(model.inputs()) {
            assert!(bound.get(name).is_ok(), "missing {name}");
            assert!(model.get_bounds(name).is_ok());
        }
        assert!(matches!(
            bound.get("nonexistent"),
            Err(ModelError::UnknownVariable { .. })
        ));
        assert!(matches!(
            model.get_bounds("nonexistent"),
            Err(ModelError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn get_resolves_states_after_inputs() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        assert_eq!(bound.get("a").unwrap(), &bound.z()[0]);
        assert_eq!(bound.get("x").unwrap(), &bound.z()[2]);
        assert_eq!(bound.get("v").unwrap(), &bound.x()[3]);
        assert_eq!(bound.get("w").unwrap(), &bound.u()[1]);
    }

    #[test]
    fn variable_map_offsets_states() {
        let model = SecondOrderUnicycleModel::new().unwrap();
        let map = model.variable_map();
        let entries: Vec<(&str, VarKind, usize)> = map
            .iter()
            .map(|(name, idx)| (name, idx.kind, idx.index))
            .collect();
        assert_eq!(
            entries,
            vec![
                ("x", VarKind::State, 2),
                ("y", VarKind::State, 3),
                ("psi", VarKind::State, 4),
                ("v", VarKind::State, 5),
                ("a", VarKind::Input, 0),
                ("w", VarKind::Input, 1),
            ]
        );
    }

    #[test]
    fn contouring_progress_rate_equals_speed() {
        let model = ContouringSecondOrderUnicycleModel::new().unwrap();
        let bound = model.bind(&SymbolSource::new()).unwrap();
        let f = bound.explicit_dynamics();
        assert_eq!(&f[4], bound.get("v").unwrap());

        let function = CompiledFunction::new(&bound.z().symbols().unwrap(), &f).unwrap();
        let samples = [
            [0.3, -1.2, 1.0, 2.0, 0.4, 1.7, 10.0],
            [-2.0, 2.0, -150.0, 20.0, -3.0, -0.5, 0.0],
            [1.1, 0.0, 0.0, 0.0, 3.1, 2.9, 1999.0],
        ];
        for z in samples {
            let dz = function.call(&z).unwrap();
            assert_relative_eq!(dz[4], z[5]);
            assert_relative_eq!(dz[0], z[5] * z[4].cos());
            assert_relative_eq!(dz[1], z[5] * z[4].sin());
            assert_relative_eq!(dz[2], z[1]);
            assert_relative_eq!(dz[3], z[0]);
        }
    }
}
