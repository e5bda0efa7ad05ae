//! Engine configuration, loaded from TOML.
//!
//! Every section has compiled defaults, so an empty file (or no file at all)
//! yields a working engine. Unknown keys are ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::freshness::FreshnessConfig;
use crate::record::PlatformId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub freshness: FreshnessConfig,
    pub routing: RoutingConfig,
    pub heuristic: HeuristicConfig,
    pub lots: LotConfig,
}

/// When the unified generalist may answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralistGate {
    /// Only when the item carries some market, vendor or enrichment evidence.
    #[default]
    RequireEvidence,
    /// Whenever no specialist matched.
    Always,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Specialist platforms, highest priority first.
    pub specialists: Vec<PlatformId>,
    pub generalist_gate: GeneralistGate,
    /// Directory holding `unified.json` and `<platform>.json` model files.
    pub model_dir: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            specialists: vec![
                PlatformId::new("abebooks"),
                PlatformId::new("biblio"),
                PlatformId::new("alibris"),
                PlatformId::new("zvab"),
            ],
            generalist_gate: GeneralistGate::default(),
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Upper bound as a multiple of the vendor quote when no sold comps exist.
    pub quote_cap_multiplier: f64,
    pub base_price: f64,
    pub per_page: f64,
    pub page_bonus_cap: f64,
    pub active_median_floor: f64,
    pub sold_avg_floor: f64,
    pub min_price: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            quote_cap_multiplier: 1.5,
            base_price: 4.0,
            per_page: 0.02,
            page_bonus_cap: 6.0,
            active_median_floor: 0.8,
            sold_avg_floor: 0.9,
            min_price: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotConfig {
    /// Buckets with fewer comps than this are flagged low-confidence.
    pub min_samples_per_size: usize,
    /// Comps at the optimal lot size required before a lot value is preferred
    /// over individual pricing.
    pub min_comps_for_lot_preference: usize,
    pub currency: String,
    /// Plausible range for a bare `#N` lot size.
    pub hash_size_min: u32,
    pub hash_size_max: u32,
    /// Books under this value go into the `value` bundle.
    pub value_bundle_threshold: f64,
}

impl Default for LotConfig {
    fn default() -> Self {
        Self {
            min_samples_per_size: 2,
            min_comps_for_lot_preference: 1,
            currency: "USD".to_string(),
            hash_size_min: 2,
            hash_size_max: 60,
            value_bundle_threshold: 10.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |field: &str, msg: &str| Err(CoreError::Config(format!("{field} {msg}")));
        let h = &self.heuristic;
        if !h.quote_cap_multiplier.is_finite() || h.quote_cap_multiplier < 1.0 {
            return invalid("heuristic.quote_cap_multiplier", "must be >= 1.0");
        }
        if !h.min_price.is_finite() || h.min_price < 0.0 {
            return invalid("heuristic.min_price", "must be non-negative");
        }
        let l = &self.lots;
        if l.hash_size_min < 2 || l.hash_size_min > l.hash_size_max {
            return invalid("lots.hash_size_min", "must be >= 2 and <= lots.hash_size_max");
        }
        if l.currency.trim().is_empty() {
            return invalid("lots.currency", "must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.freshness.market_days, 7);
        assert_eq!(config.heuristic.quote_cap_multiplier, 1.5);
        assert_eq!(config.lots.min_comps_for_lot_preference, 1);
        assert_eq!(config.routing.generalist_gate, GeneralistGate::RequireEvidence);
    }

    #[test]
    fn partial_sections_override() {
        let config = EngineConfig::from_toml(
            r#"
            [freshness]
            market_days = 3

            [routing]
            specialists = ["Biblio", "abebooks"]
            generalist_gate = "always"

            [lots]
            min_comps_for_lot_preference = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.freshness.market_days, 3);
        assert_eq!(config.freshness.metadata_days, 90);
        assert_eq!(config.routing.generalist_gate, GeneralistGate::Always);
        assert_eq!(config.routing.specialists[1], PlatformId::new("abebooks"));
        assert_eq!(config.lots.min_comps_for_lot_preference, 3);
        assert_eq!(config.lots.currency, "USD");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_toml("[heuristic]\nquote_cap_multiplier = 0.5").unwrap_err();
        assert!(matches!(err, CoreError::Config(msg) if msg.contains("quote_cap_multiplier")));

        let err = EngineConfig::from_toml("[lots]\nhash_size_min = 1").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[heuristic]\nquote_cap_multiplier = 2.0").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.heuristic.quote_cap_multiplier, 2.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/lotwise.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
