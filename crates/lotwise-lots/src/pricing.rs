//! Lot pricing aggregator: per-book yield by lot size.

use std::collections::BTreeMap;

use lotwise_core::{LotConfig, Money};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lot_size::LotSizeInference;

/// Means closer than this are a tie.
const TIE_EPSILON: f64 = 1e-9;

/// A marketplace lot listing as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotListing {
    pub title: String,
    pub total_price: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// A listing with its lot size resolved (or not).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotComp {
    pub title: String,
    pub total_price: Money,
    pub currency: String,
    pub lot_size: Option<u32>,
}

impl LotComp {
    pub fn new(title: impl Into<String>, total_price: Money, currency: &str, lot_size: Option<u32>) -> Self {
        Self {
            title: title.into(),
            total_price,
            currency: currency.to_string(),
            lot_size,
        }
    }

    pub fn from_listing(listing: &LotListing, inference: &LotSizeInference) -> Self {
        Self {
            lot_size: inference.infer(&listing.title),
            title: listing.title.clone(),
            total_price: listing.total_price,
            currency: listing.currency.clone(),
        }
    }

    /// Total ÷ size, only when the size resolved and the price is positive.
    pub fn per_book_price(&self) -> Option<f64> {
        match self.lot_size {
            Some(size) if size > 0 && self.total_price > Money::ZERO => {
                Some(self.total_price.dollars() / f64::from(size))
            }
            _ => None,
        }
    }
}

/// Per-book prices observed at one lot size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotBucket {
    pub size: u32,
    pub per_book_prices: Vec<f64>,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Fewer observations than the configured minimum.
    pub low_confidence: bool,
}

/// Lot size → per-book prices, with the best-yielding size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotPricingTable {
    buckets: BTreeMap<u32, LotBucket>,
    optimal_size: Option<u32>,
    pub total_comps: usize,
    pub used_comps: usize,
    pub unresolved_comps: usize,
    pub other_currency_comps: usize,
}

impl LotPricingTable {
    pub fn buckets(&self) -> impl Iterator<Item = &LotBucket> {
        self.buckets.values()
    }

    pub fn bucket(&self, size: u32) -> Option<&LotBucket> {
        self.buckets.get(&size)
    }

    pub fn mean(&self, size: u32) -> Option<f64> {
        self.buckets.get(&size).map(|b| b.mean)
    }

    pub fn optimal_size(&self) -> Option<u32> {
        self.optimal_size
    }

    pub fn optimal_per_book_price(&self) -> Option<f64> {
        self.optimal_size.and_then(|s| self.mean(s))
    }

    /// The bucket at the optimal size.
    pub fn optimal_bucket(&self) -> Option<&LotBucket> {
        self.optimal_size.and_then(|s| self.bucket(s))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Options for [`aggregate`].
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub min_samples: usize,
    pub currency: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::from(&LotConfig::default())
    }
}

impl From<&LotConfig> for AggregateOptions {
    fn from(config: &LotConfig) -> Self {
        Self {
            min_samples: config.min_samples_per_size,
            currency: config.currency.clone(),
        }
    }
}

/// Group comps by resolved size and find the size with the best mean per-book
/// price. Equal means go to the larger size.
pub fn aggregate(comps: &[LotComp], options: &AggregateOptions) -> LotPricingTable {
    let mut grouped: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut unresolved = 0;
    let mut other_currency = 0;

    for comp in comps {
        if !comp.currency.eq_ignore_ascii_case(&options.currency) {
            other_currency += 1;
            continue;
        }
        match (comp.lot_size, comp.per_book_price()) {
            (Some(size), Some(per_book)) => grouped.entry(size).or_default().push(per_book),
            _ => unresolved += 1,
        }
    }

    let used = grouped.values().map(Vec::len).sum();
    let buckets: BTreeMap<u32, LotBucket> = grouped
        .into_iter()
        .map(|(size, prices)| {
            let n = prices.len() as f64;
            let mean = prices.iter().sum::<f64>() / n;
            let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
            let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let bucket = LotBucket {
                size,
                low_confidence: prices.len() < options.min_samples,
                per_book_prices: prices,
                mean,
                min,
                max,
            };
            (size, bucket)
        })
        .collect();

    // Ascending sizes; a tie replaces the incumbent, so the larger size wins.
    let mut optimal: Option<(u32, f64)> = None;
    for bucket in buckets.values() {
        match optimal {
            Some((_, best)) if bucket.mean < best - TIE_EPSILON => {}
            _ => optimal = Some((bucket.size, bucket.mean)),
        }
    }

    debug!(
        total = comps.len(),
        used,
        unresolved,
        other_currency,
        optimal_size = ?optimal.map(|(s, _)| s),
        "aggregated lot comps"
    );
    LotPricingTable {
        buckets,
        optimal_size: optimal.map(|(s, _)| s),
        total_comps: comps.len(),
        used_comps: used,
        unresolved_comps: unresolved,
        other_currency_comps: other_currency,
    }
}

/// Resolve sizes for raw listings, then aggregate.
pub fn price_listings(
    listings: &[LotListing],
    inference: &LotSizeInference,
    options: &AggregateOptions,
) -> LotPricingTable {
    let comps: Vec<LotComp> = listings
        .iter()
        .map(|l| LotComp::from_listing(l, inference))
        .collect();
    aggregate(&comps, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn comp(dollars: f64, size: Option<u32>) -> LotComp {
        LotComp::new("comp", Money::from_dollars(dollars), "USD", size)
    }

    #[test]
    fn means_per_size_and_optimal() {
        let table = aggregate(
            &[comp(28.0, Some(7)), comp(35.0, Some(7)), comp(18.0, Some(3))],
            &AggregateOptions::default(),
        );
        assert_eq!(table.mean(7), Some(4.5));
        assert_eq!(table.mean(3), Some(6.0));
        assert_eq!(table.optimal_size(), Some(3));
        assert_eq!(table.optimal_per_book_price(), Some(6.0));
        assert_eq!(table.used_comps, 3);
    }

    #[test]
    fn tie_goes_to_larger_size() {
        // 10 / 2 = 5.00 and 25 / 5 = 5.00
        let table = aggregate(
            &[comp(25.0, Some(5)), comp(10.0, Some(2))],
            &AggregateOptions::default(),
        );
        assert_eq!(table.mean(2), table.mean(5));
        assert_eq!(table.optimal_size(), Some(5));
    }

    #[test]
    fn tie_break_ignores_input_order() {
        let a = aggregate(
            &[comp(10.0, Some(2)), comp(25.0, Some(5))],
            &AggregateOptions::default(),
        );
        let b = aggregate(
            &[comp(25.0, Some(5)), comp(10.0, Some(2))],
            &AggregateOptions::default(),
        );
        assert_eq!(a.optimal_size(), Some(5));
        assert_eq!(b.optimal_size(), Some(5));
    }

    #[test]
    fn unresolved_and_free_comps_are_excluded() {
        let table = aggregate(
            &[comp(28.0, Some(7)), comp(40.0, None), comp(0.0, Some(4))],
            &AggregateOptions::default(),
        );
        assert_eq!(table.buckets().count(), 1);
        assert_eq!(table.unresolved_comps, 2);
        assert_eq!(table.total_comps, 3);
    }

    #[test]
    fn sparse_buckets_are_flagged_not_dropped() {
        let table = aggregate(
            &[comp(28.0, Some(7)), comp(35.0, Some(7)), comp(18.0, Some(3))],
            &AggregateOptions::default(),
        );
        assert!(table.bucket(3).unwrap().low_confidence);
        assert!(!table.bucket(7).unwrap().low_confidence);
        let seven = table.bucket(7).unwrap();
        assert_eq!((seven.min, seven.max), (4.0, 5.0));
    }

    #[test]
    fn other_currencies_are_counted_and_skipped() {
        let table = aggregate(
            &[
                comp(28.0, Some(7)),
                LotComp::new("gbp", Money::from_dollars(90.0), "GBP", Some(3)),
            ],
            &AggregateOptions::default(),
        );
        assert_eq!(table.other_currency_comps, 1);
        assert_eq!(table.optimal_size(), Some(7));
    }

    #[test]
    fn empty_input_has_no_optimum() {
        let table = aggregate(&[], &AggregateOptions::default());
        assert!(table.is_empty());
        assert_eq!(table.optimal_per_book_price(), None);
    }

    proptest! {
        #[test]
        fn optimum_has_the_highest_mean(
            comps in proptest::collection::vec((1u32..50_000, 2u32..20), 1..40),
        ) {
            let comps: Vec<LotComp> = comps
                .into_iter()
                .map(|(cents, size)| {
                    LotComp::new("c", Money::from_cents(i64::from(cents)), "USD", Some(size))
                })
                .collect();
            let table = aggregate(&comps, &AggregateOptions::default());
            let best = table.optimal_per_book_price().unwrap();
            for bucket in table.buckets() {
                prop_assert!(bucket.mean <= best + TIE_EPSILON);
                prop_assert!(bucket.min - 1e-9 <= bucket.mean && bucket.mean <= bucket.max + 1e-9);
            }
            prop_assert_eq!(table.used_comps, comps.len());
        }
    }

    #[test]
    fn listings_resolve_sizes_from_titles() {
        let listings = vec![
            LotListing {
                title: "James Patterson Lot 1st 12 Alex Cross Novels".into(),
                total_price: Money::from_dollars(48.0),
                currency: "USD".into(),
            },
            LotListing {
                title: "Alex Cross Collection".into(),
                total_price: Money::from_dollars(30.0),
                currency: "USD".into(),
            },
        ];
        let table = price_listings(&listings, &LotSizeInference::default(), &AggregateOptions::default());
        assert_eq!(table.optimal_size(), Some(12));
        assert_eq!(table.mean(12), Some(4.0));
        assert_eq!(table.unresolved_comps, 1);
    }
}
