use std::path::PathBuf;

use thiserror::Error;

/// Space definition and value decoding errors.
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("Mismatched low/high dimensions: low={low}, high={high}")]
    DimensionMismatch { low: usize, high: usize },

    #[error("Bounds do not match shape {shape:?}: expected {expected} elements, got {got}")]
    BoundsShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Length mismatch: expected {expected} elements, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Space/data type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid space definition: {0}")]
    InvalidDefinition(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpaceError {
    /// Type mismatch between what a space expects and a JSON value kind.
    pub fn type_mismatch(expected: impl Into<String>, got: &serde_json::Value) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: json_kind(got).to_string(),
        }
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Failures reported by environment providers, environments and hooks.
///
/// The `Display` text is what travels over the wire as the error string of
/// a recoverable failure, so messages are written for the remote client.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("no registered environment with id: {0}")]
    UnknownEnvironment(String),

    #[error("environment {name} could not be created: {message}")]
    Construction { name: String, message: String },

    #[error("reset failed: {0}")]
    ResetFailed(String),

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("unknown wrapper: {0}")]
    UnknownWrapper(String),

    #[error("bad {context} options: {message}")]
    InvalidOptions {
        context: &'static str,
        message: String,
    },

    #[error("extensions are not enabled")]
    ExtensionsDisabled,

    #[error("uploads are not configured on this server")]
    UploadsDisabled,

    #[error("monitor directory {}: {message}", path.display())]
    MonitorDirectory { path: PathBuf, message: String },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("space error: {0}")]
    Space(#[from] SpaceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
