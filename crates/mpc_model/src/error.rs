//! Error taxonomy for model definition, discretization and map export.

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// A lookup by name hit neither a state nor an input.
    #[error("Requested a state or input `{name}` that was neither a state nor an input for the selected model")]
    UnknownVariable { name: String },

    #[error("Shape mismatch in {what}: expected {expected}, got {found}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("Variable name `{name}` is used more than once")]
    DuplicateName { name: String },

    #[error("Lower bound {lower} exceeds upper bound {upper} for `{name}`")]
    InvertedBounds { name: String, lower: f64, upper: f64 },

    #[error("Integrator stepsize must be positive and finite, got {0}")]
    InvalidStepsize(f64),

    #[error("Expression depends on `{symbol}`, which is not one of the function arguments")]
    FreeSymbol { symbol: String },

    #[error("Failed to parse equation `{equation}`: {message}")]
    Parse { equation: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ModelError {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    pub(crate) fn unknown(name: &str) -> Self {
        Self::UnknownVariable {
            name: name.to_string(),
        }
    }
}
