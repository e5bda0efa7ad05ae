//! ONNX Runtime scorer for exported regression graphs.
//!
//! The graph takes one `[1, n]` float32 input, where `n` is the width of the
//! model's feature schema, and returns the prediction as its first output.

use std::path::Path;
use std::sync::{Arc, Mutex};

use lotwise_core::{FeatureSchema, FeatureVector, RawScore, Reason};
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::model::MIN_PREDICTION;
use crate::scorer::{ModelError, ScoreError, Scorer};

pub struct OnnxScorer {
    name: String,
    schema: Arc<FeatureSchema>,
    // `Session::run` needs `&mut`; scorers are shared.
    session: Mutex<Session>,
    log_target: bool,
    mae: Option<f64>,
}

impl OnnxScorer {
    pub fn load(
        name: String,
        schema: Arc<FeatureSchema>,
        graph: &Path,
        log_target: bool,
        mae: Option<f64>,
    ) -> Result<Self, ModelError> {
        if !graph.exists() {
            return Err(ModelError::NotFound(graph.to_path_buf()));
        }
        let session = Session::builder()?.commit_from_file(graph)?;
        info!(model = %name, graph = %graph.display(), "loaded onnx graph");
        Ok(Self {
            name,
            schema,
            session: Mutex::new(session),
            log_target,
            mae,
        })
    }
}

impl Scorer for OnnxScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &str {
        self.schema.version()
    }

    fn mae(&self) -> Option<f64> {
        self.mae
    }

    fn score(&self, features: &FeatureVector) -> Result<RawScore, ScoreError> {
        features.check(&self.schema)?;
        let backend = |e: ort::Error| ScoreError::Backend(e.to_string());

        let shape = [1i64, features.len() as i64];
        let input = Tensor::from_array((shape, features.values().to_vec().into_boxed_slice()))
            .map_err(backend)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ScoreError::Backend("onnx session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![input]).map_err(backend)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(backend)?;
        let raw = data
            .first()
            .copied()
            .map(f64::from)
            .ok_or_else(|| ScoreError::Backend("empty output tensor".into()))?;

        let price = if self.log_target { raw.exp_m1() } else { raw };
        if !price.is_finite() {
            return Err(ScoreError::NonFinite(price));
        }
        Ok(RawScore {
            dollars: price.max(MIN_PREDICTION),
            reasons: vec![Reason::new(
                format!("onnx graph, completeness {:.0}%", features.completeness() * 100.0),
                price,
            )],
        })
    }
}
