//! Closed-form fallback scorer. Never fails on a well-formed vector.
//!
//! The vendor quote is treated asymmetrically: with sold comps it only floors
//! the price, without them it also caps it at `quote_cap_multiplier × quote`.

use lotwise_core::features::{platform_slot, CONDITION_SLOTS, UNIFIED_SCHEMA};
use lotwise_core::{ConditionGrade, FeatureVector, HeuristicConfig, RawScore, Reason};

use crate::scorer::{ScoreError, Scorer};

pub const HEURISTIC_NAME: &str = "heuristic";

#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    config: HeuristicConfig,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

/// Round down to whole cents so a cap never rounds up past itself.
fn floor_cents(dollars: f64) -> f64 {
    (dollars * 100.0).floor() / 100.0
}

impl HeuristicScorer {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    fn condition(features: &FeatureVector) -> ConditionGrade {
        CONDITION_SLOTS
            .iter()
            .find(|(_, slot)| features.available(slot) == Some(1.0))
            .map(|(grade, _)| *grade)
            .unwrap_or_default()
    }

    /// Best sold-comps average: eBay first, else the highest platform average.
    fn sold_average(features: &FeatureVector) -> Option<(String, f64)> {
        let positive = |slot: &str| {
            features
                .available(slot)
                .map(f64::from)
                .filter(|v| *v > 0.0)
        };
        if positive("ebay_sold_count").is_some()
            && let Some(avg) = positive("ebay_sold_avg_price")
        {
            return Some(("ebay".to_string(), avg));
        }

        let platforms = features.platforms();
        platforms
            .iter()
            .filter(|p| positive(&platform_slot(p, "sold_count")).is_some())
            .filter_map(|p| positive(&platform_slot(p, "sold_avg_price")).map(|a| (p.to_string(), a)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Scorer for HeuristicScorer {
    fn name(&self) -> &str {
        HEURISTIC_NAME
    }

    fn schema(&self) -> &str {
        UNIFIED_SCHEMA
    }

    fn score(&self, features: &FeatureVector) -> Result<RawScore, ScoreError> {
        let cfg = &self.config;
        let mut reasons = vec![Reason::new("base price", cfg.base_price)];

        let mut price = cfg.base_price;
        if let Some(pages) = features.available("page_count") {
            let bonus = (f64::from(pages) * cfg.per_page).min(cfg.page_bonus_cap);
            price += bonus;
            reasons.push(Reason::new(format!("{pages} pages"), bonus));
        }

        let grade = Self::condition(features);
        let conditioned = price * grade.multiplier();
        reasons.push(Reason::new(
            format!("condition {grade} x{:.2}", grade.multiplier()),
            conditioned - price,
        ));
        price = conditioned;

        if let Some(median) = features.available("ebay_active_median").map(f64::from) {
            let floor = median * cfg.active_median_floor;
            if floor > price {
                reasons.push(Reason::new(format!("active median ${median:.2}"), floor - price));
                price = floor;
            }
        }

        let quote = features
            .available("vendor_best_offer")
            .map(f64::from)
            .filter(|q| *q > 0.0);
        let comps = Self::sold_average(features);

        if let Some((source, avg)) = &comps {
            let floor = avg * cfg.sold_avg_floor;
            if floor > price {
                reasons.push(Reason::new(format!("{source} sold comps ${avg:.2}"), floor - price));
                price = floor;
            }
            if let Some(q) = quote
                && q > price
            {
                reasons.push(Reason::new(format!("vendor quote floor ${q:.2}"), q - price));
                price = q;
            }
        }

        if price < cfg.min_price {
            reasons.push(Reason::new("minimum price", cfg.min_price - price));
            price = cfg.min_price;
        }

        if comps.is_none()
            && let Some(q) = quote
        {
            let ceiling = floor_cents(q * cfg.quote_cap_multiplier);
            let bounded = price.max(q).min(ceiling);
            if bounded != price {
                let label = if bounded < price {
                    format!("capped at {:.1}x vendor quote ${q:.2}", cfg.quote_cap_multiplier)
                } else {
                    format!("vendor quote floor ${q:.2}")
                };
                reasons.push(Reason::new(label, bounded - price));
                price = bounded;
            }
        }

        if !price.is_finite() {
            return Err(ScoreError::NonFinite(price));
        }
        Ok(RawScore {
            dollars: price,
            reasons,
        })
    }
}
