//! Lot bundling: compare what a group of books fetches as a lot against the
//! sum of their individual estimates.
//!
//! When lot comps yield an optimal per-book price the lot value is preferred
//! outright; individual pricing is chosen only when no usable lot value exists
//! or the bucket at the optimal size holds fewer comps than
//! `min_comps_for_lot_preference`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use lotwise_ai::PredictionRouter;
use lotwise_core::{
    CoreError, Enrichments, Isbn13, ItemRecord, LotConfig, Money, PriceEstimate,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LotError;
use crate::lot_size::LotSizeInference;
use crate::pricing::{price_listings, AggregateOptions, LotPricingTable};
use crate::source::{canonical_author, LotCompSource, LotStrategy, SearchScope};

/// A book on hand, with whatever enrichment payloads were fetched for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotMember {
    pub item: ItemRecord,
    #[serde(default)]
    pub enrichments: Enrichments,
}

impl LotMember {
    pub fn new(item: ItemRecord) -> Self {
        Self {
            item,
            enrichments: Enrichments::new(),
        }
    }

    pub fn isbn(&self) -> &Isbn13 {
        self.item.isbn()
    }

    fn series(&self) -> Option<(&str, Option<u32>)> {
        let meta = self.item.book_metadata()?;
        let name = meta.series_name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((name, meta.series_index))
    }

    fn author(&self) -> Option<String> {
        self.item
            .book_metadata()
            .and_then(|m| m.primary_author())
            .map(canonical_author)
            .filter(|a| !a.is_empty())
    }
}

/// Individual-sale pricing for one book.
pub trait ItemPricer: Sync {
    fn price(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
        now: DateTime<Utc>,
    ) -> Result<PriceEstimate, CoreError>;
}

impl ItemPricer for PredictionRouter {
    fn price(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
        now: DateTime<Utc>,
    ) -> Result<PriceEstimate, CoreError> {
        self.predict_at(item, enrichments, now)
    }
}

/// Which value a suggestion settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingBasis {
    Lot,
    Individual,
}

impl fmt::Display for PricingBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lot => "lot",
            Self::Individual => "individual",
        })
    }
}

/// A proposed lot. Built once per query and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotSuggestion {
    members: Vec<Isbn13>,
    strategy: LotStrategy,
    scope: Option<SearchScope>,
    member_estimates: Vec<PriceEstimate>,
    individual_value: Money,
    lot_value: Option<Money>,
    per_book_price: Option<Money>,
    optimal_lot_size: Option<u32>,
    lot_comps_used: usize,
    optimal_size_comps: usize,
    low_confidence: bool,
    chosen_value: Money,
    basis: PricingBasis,
    justification: String,
    missing_volumes: Vec<u32>,
}

impl LotSuggestion {
    pub fn members(&self) -> &[Isbn13] {
        &self.members
    }

    pub fn strategy(&self) -> LotStrategy {
        self.strategy
    }

    pub fn scope(&self) -> Option<&SearchScope> {
        self.scope.as_ref()
    }

    /// Per-member estimates, in member order.
    pub fn member_estimates(&self) -> &[PriceEstimate] {
        &self.member_estimates
    }

    pub fn individual_value(&self) -> Money {
        self.individual_value
    }

    pub fn lot_value(&self) -> Option<Money> {
        self.lot_value
    }

    pub fn per_book_price(&self) -> Option<Money> {
        self.per_book_price
    }

    pub fn optimal_lot_size(&self) -> Option<u32> {
        self.optimal_lot_size
    }

    /// Comps that resolved to any lot size.
    pub fn lot_comps_used(&self) -> usize {
        self.lot_comps_used
    }

    /// Comps at the optimal lot size, the ones the lot value rests on.
    pub fn optimal_size_comps(&self) -> usize {
        self.optimal_size_comps
    }

    /// The optimal size bucket holds fewer comps than the sample floor.
    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn chosen_value(&self) -> Money {
        self.chosen_value
    }

    pub fn basis(&self) -> PricingBasis {
        self.basis
    }

    pub fn justification(&self) -> &str {
        &self.justification
    }

    /// Gaps in the series numbering up to the highest index on hand.
    pub fn missing_volumes(&self) -> &[u32] {
        &self.missing_volumes
    }
}

/// A member with its individual estimate already computed.
#[derive(Clone)]
pub(crate) struct Priced<'a> {
    pub member: &'a LotMember,
    pub estimate: PriceEstimate,
}

pub struct BundlingEngine<'a> {
    pricer: &'a dyn ItemPricer,
    comps: &'a dyn LotCompSource,
    config: LotConfig,
    inference: LotSizeInference,
}

impl<'a> BundlingEngine<'a> {
    pub fn new(pricer: &'a dyn ItemPricer, comps: &'a dyn LotCompSource, config: LotConfig) -> Self {
        Self {
            pricer,
            comps,
            inference: LotSizeInference::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &LotConfig {
        &self.config
    }

    /// Price `members` as one lot under `strategy`.
    pub fn suggest(
        &self,
        members: &[LotMember],
        strategy: LotStrategy,
        now: DateTime<Utc>,
    ) -> Result<LotSuggestion, LotError> {
        if members.is_empty() {
            return Err(LotError::EmptyLot);
        }
        let priced = self.price_members(members, now)?;
        Ok(self.build(&priced, strategy))
    }

    /// Individual estimates on the rayon pool, in member order.
    pub(crate) fn price_members<'m>(
        &self,
        members: impl IntoParallelIterator<Item = &'m LotMember>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Priced<'m>>, LotError> {
        members
            .into_par_iter()
            .map(|member| {
                self.pricer
                    .price(&member.item, &member.enrichments, now)
                    .map(|estimate| Priced { member, estimate })
                    .map_err(|source| LotError::Member {
                        isbn: member.isbn().clone(),
                        source,
                    })
            })
            .collect()
    }

    pub(crate) fn build(&self, priced: &[Priced<'_>], strategy: LotStrategy) -> LotSuggestion {
        let count = priced.len();
        let individual_value: Money = priced.iter().map(|p| p.estimate.value).sum();
        let scope = scope_for(priced, strategy);
        let missing_volumes = match strategy {
            LotStrategy::Series => missing_volumes(priced),
            _ => Vec::new(),
        };

        let table = match &scope {
            Some(scope) if strategy.uses_lot_comps() && count >= 2 => {
                let listings = self.comps.comps(scope);
                Some(price_listings(
                    &listings,
                    &self.inference,
                    &AggregateOptions::from(&self.config),
                ))
            }
            _ => None,
        };
        let lot = table.as_ref().and_then(|t| LotPrice::from_table(t, count));
        let used = table.as_ref().map_or(0, |t| t.used_comps);

        let (chosen_value, basis) = match &lot {
            Some(lot) if lot.comps >= self.config.min_comps_for_lot_preference => {
                (lot.value, PricingBasis::Lot)
            }
            _ => (individual_value, PricingBasis::Individual),
        };

        let mut justification = justify(
            count,
            scope.as_ref(),
            lot.as_ref(),
            individual_value,
            basis,
            self.config.min_comps_for_lot_preference,
        );
        if !missing_volumes.is_empty() {
            let list: Vec<String> = missing_volumes.iter().map(u32::to_string).collect();
            justification.push_str(&format!(" Missing volumes: {}.", list.join(", ")));
        }

        debug!(
            strategy = %strategy,
            members = count,
            individual = %individual_value,
            lot = ?lot.as_ref().map(|l| l.value.to_string()),
            basis = %basis,
            "lot suggestion built"
        );

        LotSuggestion {
            members: priced.iter().map(|p| p.member.isbn().clone()).collect(),
            strategy,
            scope,
            member_estimates: priced.iter().map(|p| p.estimate.clone()).collect(),
            individual_value,
            lot_value: lot.as_ref().map(|l| l.value),
            per_book_price: lot.as_ref().map(|l| l.per_book),
            optimal_lot_size: lot.as_ref().map(|l| l.optimal_size),
            lot_comps_used: used,
            optimal_size_comps: lot.as_ref().map_or(0, |l| l.comps),
            low_confidence: lot.as_ref().is_some_and(|l| l.low_confidence),
            chosen_value,
            basis,
            justification,
            missing_volumes,
        }
    }

    /// Log a one-line summary of a finished plan.
    pub(crate) fn log_plan(&self, suggestions: &[LotSuggestion]) {
        let lot_priced = suggestions
            .iter()
            .filter(|s| s.basis == PricingBasis::Lot)
            .count();
        info!(suggestions = suggestions.len(), lot_priced, "lot plan ready");
    }
}

struct LotPrice {
    value: Money,
    per_book: Money,
    optimal_size: u32,
    comps: usize,
    low_confidence: bool,
}

impl LotPrice {
    fn from_table(table: &LotPricingTable, count: usize) -> Option<Self> {
        let bucket = table.optimal_bucket()?;
        Some(Self {
            value: Money::from_dollars(bucket.mean * count as f64),
            per_book: Money::from_dollars(bucket.mean),
            optimal_size: bucket.size,
            comps: bucket.per_book_prices.len(),
            low_confidence: bucket.low_confidence,
        })
    }
}

/// Most common label among members; ties go to the alphabetically first.
fn dominant<I: IntoIterator<Item = String>>(labels: I) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }
    let mut best: Option<(String, usize)> = None;
    for (label, n) in counts {
        if best.as_ref().is_none_or(|(_, b)| n > *b) {
            best = Some((label, n));
        }
    }
    best.map(|(label, _)| label)
}

fn scope_for(priced: &[Priced<'_>], strategy: LotStrategy) -> Option<SearchScope> {
    let label = match strategy {
        LotStrategy::Series => dominant(
            priced
                .iter()
                .filter_map(|p| p.member.series().map(|(name, _)| name.to_string())),
        ),
        LotStrategy::Author => dominant(priced.iter().filter_map(|p| p.member.author())),
        LotStrategy::Value => None,
    }?;
    Some(SearchScope::new(strategy, label))
}

fn missing_volumes(priced: &[Priced<'_>]) -> Vec<u32> {
    let held: BTreeSet<u32> = priced
        .iter()
        .filter_map(|p| p.member.series().and_then(|(_, idx)| idx))
        .filter(|i| *i > 0)
        .collect();
    match held.last() {
        Some(&max) => (1..max).filter(|i| !held.contains(i)).collect(),
        None => Vec::new(),
    }
}

fn justify(
    count: usize,
    scope: Option<&SearchScope>,
    lot: Option<&LotPrice>,
    individual: Money,
    basis: PricingBasis,
    min_comps: usize,
) -> String {
    let target = match scope {
        Some(s) => format!("{} lot \"{}\"", s.strategy, s.label),
        None => "lot".to_string(),
    };
    match (lot, basis) {
        (Some(lot), PricingBasis::Lot) => format!(
            "{count}-book {target} priced from {} lot comps at {}/book (best size {}): \
             lot {} vs individual {}: {}",
            lot.comps,
            lot.per_book,
            lot.optimal_size,
            lot.value,
            individual,
            lot.value.delta_from(individual),
        ),
        (Some(lot), PricingBasis::Individual) => format!(
            "{count}-book {target}: lot {} rests on {} comps at size {} (need {min_comps}); \
             individual {} chosen: {}",
            lot.value,
            lot.comps,
            lot.optimal_size,
            individual,
            lot.value.delta_from(individual),
        ),
        (None, _) => format!(
            "{count}-book {target}: no usable lot comps; individual {individual} chosen"
        ),
    }
}
