pub mod config;
pub mod discretize;
pub mod equation_engine;
pub mod error;
pub mod generator;
pub mod model;
pub mod numeric;
pub mod realtime;
pub mod solvers;
pub mod symbolic;
/// The `mpc_model` crate describes vehicle dynamics for MPC solver generation.
/// A model declares its states, inputs, bounds and continuous-time vector field;
/// binding it to symbols and discretizing it yields the expressions a solver
/// generator consumes, and its variable map records where each variable lives.
///
/// Key components:
/// - **Model**: `DynamicsModel` (capability trait), `ModelSpec` (names, bounds, lookup), `BoundModel`.
/// - **Variants**: `SecondOrderUnicycleModel`, `ContouringSecondOrderUnicycleModel`, `RealTimeModel`.
/// - **Symbolic**: expression trees, symbol sources, differentiation and an equation parser.
/// - **Discretize**: symbolic RK4 / explicit Euler integration of the continuous law.
/// - **Variable map**: the persisted name -> `[kind, index]` document.
/// - **Numeric**: bytecode evaluation, linearization and simulation of a bound model.
pub mod traits;
pub mod unicycle;
pub mod variable_map;

pub use error::{ModelError, ModelResult};
pub use model::{Bounds, BoundModel, DynamicsModel, ModelSpec, VarIndex, VarKind};
pub use realtime::{RealTimeModel, RealTimeSettings};
pub use unicycle::{ContouringSecondOrderUnicycleModel, SecondOrderUnicycleModel};
