//! Error types.

use thiserror::Error;

/// Errors at the fallible edges of the sketch core.
///
/// Event handlers never surface these; they log and fall back instead.
#[derive(Debug, Error)]
pub enum SketchError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Layer not found: {0}")]
    LayerNotFound(String),
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),
}

/// Result type for sketch operations.
pub type SketchResult<T> = Result<T, SketchError>;
