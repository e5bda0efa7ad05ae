//! Price scoring: loaded models, the closed-form heuristic, and the router
//! that picks between them per item.

pub mod catalog;
pub mod heuristic;
pub mod model;
#[cfg(feature = "onnx")]
mod onnx;
pub mod router;
pub mod scorer;

pub use catalog::ModelCatalog;
pub use heuristic::HeuristicScorer;
pub use model::load_model;
#[cfg(feature = "onnx")]
pub use onnx::OnnxScorer;
pub use router::{PredictionRouter, RoutingCounters, RoutingSink, RoutingStats};
pub use scorer::{ModelError, ScoreError, Scorer};
