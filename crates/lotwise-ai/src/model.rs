//! JSON model files: linear and tree-ensemble regressors over named slots.
//!
//! A model file names the feature schema it was trained on and refers to slots
//! by name. Slot names are resolved to positions once at load time, so a model
//! that mentions a slot its schema lacks is rejected before it can score.
//!
//! ```json
//! { "name": "unified-ridge", "schema": "unified-v1", "kind": "linear",
//!   "intercept": 1.9, "weights": { "ebay_sold_avg_price": 0.04 },
//!   "log_target": true, "mae": 3.36 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use lotwise_core::{FeatureSchema, FeatureVector, RawScore, Reason, SchemaRegistry};
use serde::Deserialize;
use tracing::info;

use crate::scorer::{ModelError, ScoreError, Scorer};

/// Lowest price any model may report.
pub const MIN_PREDICTION: f64 = 0.01;

/// Contributions listed in a linear model's rationale.
const TOP_CONTRIBUTIONS: usize = 5;

#[derive(Debug, Deserialize)]
struct ModelFile {
    name: String,
    schema: String,
    #[serde(default)]
    log_target: bool,
    #[serde(default)]
    mae: Option<f64>,
    #[serde(flatten)]
    body: ModelBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelBody {
    Linear {
        intercept: f64,
        weights: BTreeMap<String, f64>,
        #[serde(default)]
        scaler: Option<Scaler>,
    },
    TreeEnsemble {
        #[serde(default)]
        base_score: f64,
        #[serde(default = "unit")]
        learning_rate: f64,
        trees: Vec<TreeFile>,
    },
    #[cfg(feature = "onnx")]
    Onnx {
        /// Relative to the model file's directory.
        path: String,
    },
}

fn unit() -> f64 {
    1.0
}

/// Per-slot standardisation applied before the weights.
#[derive(Debug, Default, Deserialize)]
struct Scaler {
    #[serde(default)]
    mean: BTreeMap<String, f64>,
    #[serde(default)]
    scale: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct TreeFile {
    nodes: Vec<NodeFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeFile {
    Split {
        feature: String,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken when the slot is sentinel-filled.
        #[serde(default = "yes")]
        missing_left: bool,
    },
    Leaf {
        value: f64,
    },
}

fn yes() -> bool {
    true
}

/// Read a model file and bind it to its registered schema.
pub fn load_model(path: &Path, registry: &SchemaRegistry) -> Result<Arc<dyn Scorer>, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ModelFile = serde_json::from_str(&text).map_err(|source| ModelError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let schema = registry.get(&file.schema)?;
    let head = ModelHead {
        name: file.name,
        schema,
        log_target: file.log_target,
        mae: file.mae,
    };

    let scorer: Arc<dyn Scorer> = match file.body {
        ModelBody::Linear {
            intercept,
            weights,
            scaler,
        } => Arc::new(LinearModel::compile(head, intercept, weights, scaler.unwrap_or_default())?),
        ModelBody::TreeEnsemble {
            base_score,
            learning_rate,
            trees,
        } => Arc::new(TreeEnsemble::compile(head, base_score, learning_rate, trees)?),
        #[cfg(feature = "onnx")]
        ModelBody::Onnx { path: graph } => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            Arc::new(crate::onnx::OnnxScorer::load(
                head.name,
                head.schema,
                &dir.join(graph),
                head.log_target,
                head.mae,
            )?)
        }
    };
    info!(
        model = scorer.name(),
        schema = scorer.schema(),
        path = %path.display(),
        "loaded model"
    );
    Ok(scorer)
}

/// Fields shared by every compiled model.
#[derive(Debug)]
struct ModelHead {
    name: String,
    schema: Arc<FeatureSchema>,
    log_target: bool,
    mae: Option<f64>,
}

impl ModelHead {
    fn slot(&self, slot: &str) -> Result<usize, ModelError> {
        self.schema.index_of(slot).ok_or_else(|| ModelError::Invalid {
            model: self.name.clone(),
            reason: format!("slot {slot:?} not in schema {}", self.schema.version()),
        })
    }

    /// Undo the target transform and apply the price floor.
    fn finish(&self, raw: f64) -> Result<f64, ScoreError> {
        let price = if self.log_target { raw.exp_m1() } else { raw };
        if !price.is_finite() {
            return Err(ScoreError::NonFinite(price));
        }
        Ok(price.max(MIN_PREDICTION))
    }
}

// ── Linear ──

#[derive(Debug)]
struct Term {
    index: usize,
    slot: String,
    weight: f64,
    mean: f64,
    scale: f64,
}

/// `intercept + Σ weight × (x − mean) / scale`.
#[derive(Debug)]
pub struct LinearModel {
    head: ModelHead,
    intercept: f64,
    terms: Vec<Term>,
}

impl LinearModel {
    fn compile(
        head: ModelHead,
        intercept: f64,
        weights: BTreeMap<String, f64>,
        scaler: Scaler,
    ) -> Result<Self, ModelError> {
        let mut terms = Vec::with_capacity(weights.len());
        for (slot, weight) in weights {
            let scale = scaler.scale.get(&slot).copied().unwrap_or(1.0);
            if !weight.is_finite() || !scale.is_finite() || scale == 0.0 {
                return Err(ModelError::Invalid {
                    model: head.name.clone(),
                    reason: format!("bad weight or scale for {slot:?}"),
                });
            }
            terms.push(Term {
                index: head.slot(&slot)?,
                mean: scaler.mean.get(&slot).copied().unwrap_or(0.0),
                slot,
                weight,
                scale,
            });
        }
        Ok(Self {
            head,
            intercept,
            terms,
        })
    }
}

impl Scorer for LinearModel {
    fn name(&self) -> &str {
        &self.head.name
    }

    fn schema(&self) -> &str {
        self.head.schema.version()
    }

    fn mae(&self) -> Option<f64> {
        self.head.mae
    }

    fn score(&self, features: &FeatureVector) -> Result<RawScore, ScoreError> {
        features.check(&self.head.schema)?;
        let values = features.values();

        let mut contributions: Vec<(f64, &Term)> = self
            .terms
            .iter()
            .map(|t| {
                let x = f64::from(values[t.index]);
                (t.weight * (x - t.mean) / t.scale, t)
            })
            .collect();
        let raw = self.intercept + contributions.iter().map(|(c, _)| c).sum::<f64>();
        let dollars = self.head.finish(raw)?;

        contributions.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));
        let reasons = contributions
            .into_iter()
            .take(TOP_CONTRIBUTIONS)
            .filter(|(c, _)| *c != 0.0)
            .map(|(c, t)| {
                Reason::new(
                    format!("{} = {:.2}", t.slot, values[t.index]),
                    c,
                )
            })
            .collect();
        Ok(RawScore { dollars, reasons })
    }
}

// ── Tree ensemble ──

#[derive(Debug)]
enum Node {
    Split {
        index: usize,
        threshold: f64,
        left: usize,
        right: usize,
        missing_left: bool,
    },
    Leaf(f64),
}

/// Additive regression trees: `base_score + learning_rate × Σ leaf`.
#[derive(Debug)]
pub struct TreeEnsemble {
    head: ModelHead,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<Vec<Node>>,
}

impl TreeEnsemble {
    fn compile(
        head: ModelHead,
        base_score: f64,
        learning_rate: f64,
        trees: Vec<TreeFile>,
    ) -> Result<Self, ModelError> {
        let invalid = |reason: String| ModelError::Invalid {
            model: head.name.clone(),
            reason,
        };
        if trees.is_empty() {
            return Err(invalid("no trees".into()));
        }

        let mut compiled = Vec::with_capacity(trees.len());
        for (t, tree) in trees.into_iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(invalid(format!("tree {t} has no nodes")));
            }
            let len = tree.nodes.len();
            let mut nodes = Vec::with_capacity(len);
            for (i, node) in tree.nodes.into_iter().enumerate() {
                nodes.push(match node {
                    NodeFile::Split {
                        feature,
                        threshold,
                        left,
                        right,
                        missing_left,
                    } => {
                        // Children must point forward, which also rules out cycles.
                        if left <= i || right <= i || left >= len || right >= len {
                            return Err(invalid(format!("tree {t} node {i} has bad children")));
                        }
                        Node::Split {
                            index: head.slot(&feature)?,
                            threshold,
                            left,
                            right,
                            missing_left,
                        }
                    }
                    NodeFile::Leaf { value } => Node::Leaf(value),
                });
            }
            compiled.push(nodes);
        }

        Ok(Self {
            head,
            base_score,
            learning_rate,
            trees: compiled,
        })
    }

    fn walk(tree: &[Node], values: &[f32], sentinel: &[bool]) -> f64 {
        let mut at = 0;
        loop {
            match &tree[at] {
                Node::Leaf(v) => return *v,
                Node::Split {
                    index,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let go_left = if sentinel[*index] {
                        *missing_left
                    } else {
                        f64::from(values[*index]) < *threshold
                    };
                    at = if go_left { *left } else { *right };
                }
            }
        }
    }
}

impl Scorer for TreeEnsemble {
    fn name(&self) -> &str {
        &self.head.name
    }

    fn schema(&self) -> &str {
        self.head.schema.version()
    }

    fn mae(&self) -> Option<f64> {
        self.head.mae
    }

    fn score(&self, features: &FeatureVector) -> Result<RawScore, ScoreError> {
        features.check(&self.head.schema)?;
        let values = features.values();
        let sentinel = features.sentinel_mask();
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| Self::walk(tree, values, sentinel))
            .sum();
        let raw = self.base_score + self.learning_rate * sum;
        let dollars = self.head.finish(raw)?;
        let reasons = vec![Reason::new(
            format!("{} trees, completeness {:.0}%", self.trees.len(), features.completeness() * 100.0),
            self.learning_rate * sum,
        )];
        Ok(RawScore { dollars, reasons })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lotwise_core::{
        Enrichments, FeatureAssembler, Isbn13, ItemAttributes, ItemRecord, MarketStats,
        PlatformId, Snapshot,
    };
    use std::io::Write;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::standard(&[PlatformId::new("abebooks")]))
    }

    fn write_model(dir: &Path, name: &str, json: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        path
    }

    fn features(sold_avg: Option<f64>) -> FeatureVector {
        let when = Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap();
        let mut item = ItemRecord::new(
            Isbn13::parse("9780316018043").unwrap(),
            ItemAttributes::default(),
        );
        if let Some(p) = sold_avg {
            item = item.with_market(Snapshot::new(
                MarketStats {
                    sold_count: Some(4),
                    sold_avg_price: Some(p),
                    ..Default::default()
                },
                when,
            ));
        }
        FeatureAssembler::new(registry())
            .assemble(&item, &Enrichments::new(), "unified-v1", when)
            .unwrap()
    }

    #[test]
    fn linear_model_scores_and_explains() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "unified-ridge", "schema": "unified-v1", "kind": "linear",
                "intercept": 2.0,
                "weights": {"ebay_sold_avg_price": 0.5, "is_good": 1.0},
                "mae": 3.36}"#,
        );
        let model = load_model(&path, &registry()).unwrap();
        assert_eq!(model.name(), "unified-ridge");
        assert_eq!(model.mae(), Some(3.36));

        let out = model.score(&features(Some(20.0))).unwrap();
        assert!((out.dollars - 13.0).abs() < 1e-9);
        assert_eq!(out.reasons[0].text, "ebay_sold_avg_price = 20.00");
    }

    #[test]
    fn standardisation_and_log_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "log", "schema": "unified-v1", "kind": "linear",
                "intercept": 0.0, "log_target": true,
                "weights": {"ebay_sold_avg_price": 1.0},
                "scaler": {"mean": {"ebay_sold_avg_price": 10.0}, "scale": {"ebay_sold_avg_price": 10.0}}}"#,
        );
        let model = load_model(&path, &registry()).unwrap();
        let out = model.score(&features(Some(20.0))).unwrap();
        assert!((out.dollars - 1f64.exp_m1()).abs() < 1e-9);
    }

    #[test]
    fn prediction_is_floored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "neg", "schema": "unified-v1", "kind": "linear",
                "intercept": -50.0, "weights": {}}"#,
        );
        let out = load_model(&path, &registry())
            .unwrap()
            .score(&features(None))
            .unwrap();
        assert_eq!(out.dollars, MIN_PREDICTION);
    }

    #[test]
    fn tree_ensemble_follows_missing_branch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "gbm", "schema": "unified-v1", "kind": "tree_ensemble",
                "base_score": 1.0, "learning_rate": 0.5,
                "trees": [{"nodes": [
                    {"feature": "ebay_sold_avg_price", "threshold": 15.0, "left": 1, "right": 2, "missing_left": false},
                    {"value": 4.0},
                    {"value": 10.0}
                ]}]}"#,
        );
        let model = load_model(&path, &registry()).unwrap();
        assert_eq!(model.score(&features(Some(12.0))).unwrap().dollars, 3.0);
        assert_eq!(model.score(&features(Some(18.0))).unwrap().dollars, 6.0);
        // Missing goes right.
        assert_eq!(model.score(&features(None)).unwrap().dollars, 6.0);
    }

    #[test]
    fn backward_child_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "loop", "schema": "unified-v1", "kind": "tree_ensemble",
                "trees": [{"nodes": [
                    {"feature": "page_count", "threshold": 1.0, "left": 0, "right": 1},
                    {"value": 1.0}
                ]}]}"#,
        );
        assert!(matches!(
            load_model(&path, &registry()),
            Err(ModelError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "x", "schema": "unified-v1", "kind": "linear",
                "intercept": 1.0, "weights": {"mercari_avg_price": 1.0}}"#,
        );
        assert!(matches!(
            load_model(&path, &registry()),
            Err(ModelError::Invalid { .. })
        ));
    }

    #[test]
    fn unregistered_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "x", "schema": "unified-v7", "kind": "linear",
                "intercept": 1.0, "weights": {}}"#,
        );
        assert!(matches!(
            load_model(&path, &registry()),
            Err(ModelError::Core(_))
        ));
    }

    #[test]
    fn missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_model(&dir.path().join("nope.json"), &registry()),
            Err(ModelError::NotFound(_))
        ));
        let path = write_model(dir.path(), "bad.json", "{not json");
        assert!(matches!(
            load_model(&path, &registry()),
            Err(ModelError::Parse { .. })
        ));
    }

    #[test]
    fn wrong_schema_vector_is_a_score_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "abebooks.json",
            r#"{"name": "abe", "schema": "abebooks-v1", "kind": "linear",
                "intercept": 1.0, "weights": {}}"#,
        );
        let model = load_model(&path, &registry()).unwrap();
        assert!(matches!(
            model.score(&features(None)),
            Err(ScoreError::Features(_))
        ));
    }

    #[test]
    fn tree_ensemble_scores_vectors_read_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            "unified.json",
            r#"{"name": "gbm", "schema": "unified-v1", "kind": "tree_ensemble",
                "base_score": 1.0, "learning_rate": 0.5,
                "trees": [{"nodes": [
                    {"feature": "ebay_sold_avg_price", "threshold": 15.0, "left": 1, "right": 2, "missing_left": true},
                    {"value": 4.0},
                    {"value": 10.0}
                ]}]}"#,
        );
        let reg = registry();
        let model = load_model(&path, &reg).unwrap();

        let json = serde_json::to_string(&features(None)).unwrap();
        let parts: lotwise_core::FeatureVectorParts = serde_json::from_str(&json).unwrap();
        let fv = parts.bind(&reg).unwrap();
        assert_eq!(model.score(&fv).unwrap().dollars, 3.0);

        let truncated = serde_json::json!({
            "schema": "unified-v1",
            "values": fv.values(),
            "sentinel": [],
        });
        let parts: lotwise_core::FeatureVectorParts = serde_json::from_value(truncated).unwrap();
        assert!(matches!(
            parts.bind(&reg),
            Err(lotwise_core::CoreError::VectorLength { found: 0, .. })
        ));
    }
}
