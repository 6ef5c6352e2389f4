use cellweave_core::LayoutError;
use thiserror::Error;

/// Result alias for rule resolution and technology loading.
pub type RuleResult<T> = Result<T, RuleError>;

/// Unresolvable design rules and malformed technology descriptions.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("design rule '{key}' is not defined for layer '{layer}'")]
    MissingRule { key: String, layer: String },

    #[error("design rule '{key}' between '{first}' and '{second}' is not defined")]
    MissingLayerPairRule {
        key: String,
        first: String,
        second: String,
    },

    #[error("technology grid must be positive, got {0}")]
    InvalidGrid(f64),

    #[error("via stack '{stack}' uses layer '{layer}' which is not in the layer table")]
    UnknownStackLayer { stack: String, layer: String },

    #[error("failed to read technology file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid technology YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid technology JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
