//! The scoring seam shared by every model kind and the heuristic.

use std::path::PathBuf;

use lotwise_core::{CoreError, FeatureVector, RawScore};
use thiserror::Error;

/// A loaded, immutable price scorer over one feature schema.
///
/// Implementations are shared across threads behind `Arc<dyn Scorer>`.
pub trait Scorer: Send + Sync {
    /// Model name reported in the estimate's source tag.
    fn name(&self) -> &str;

    /// Feature schema version this scorer was built against.
    fn schema(&self) -> &str;

    /// Validation mean absolute error in dollars, when the model reports one.
    fn mae(&self) -> Option<f64> {
        None
    }

    fn score(&self, features: &FeatureVector) -> Result<RawScore, ScoreError>;
}

/// A scorer failed on one input. The router treats this as "tier unavailable".
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Features(#[from] CoreError),

    #[error("non-finite prediction: {0}")]
    NonFinite(f64),

    #[error("scoring backend failed: {0}")]
    Backend(String),
}

/// A model file could not be turned into a scorer. The tier is skipped.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("model {model:?} targets schema {found:?}, expected {expected:?}")]
    SchemaMismatch {
        model: String,
        expected: String,
        found: String,
    },

    #[error("model {model:?} is invalid: {reason}")]
    Invalid { model: String, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[cfg(feature = "onnx")]
    #[error("onnx runtime: {0}")]
    Onnx(#[from] ort::Error),
}
