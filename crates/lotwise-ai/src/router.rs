//! Prediction router: picks a scorer per item from the data it actually has.
//!
//! Tiers are an ordered list of `(gate, scorer)` pairs walked by one loop:
//! specialists in configured priority, then the generalist, then the
//! heuristic. A tier whose gate is unsatisfied is skipped; a tier whose scorer
//! errors or returns a non-finite price falls through to the next one.
//!
//! A heuristic answer for an item with no market or vendor data is always
//! `Minimal`. Fresh market and vendor snapshots can still lift a heuristic
//! answer one level, since freshness adjusts every tier the same way.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use lotwise_core::features::{
    platform_slot, EVIDENCE_SLOTS, PLATFORM_PRICE_SUFFIXES, PLATFORM_SLOT_SUFFIXES,
};
use lotwise_core::freshness::DataSource;
use lotwise_core::{
    Confidence, CoreError, Domain, EngineConfig, Enrichments, FeatureAssembler, FeatureVector,
    FreshnessIndex, FreshnessReport, GeneralistGate, ItemRecord, Money, PlatformId, PriceEstimate,
    Reason, SchemaRegistry, ScorerTier, SourceTag,
};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::ModelCatalog;
use crate::heuristic::HeuristicScorer;
use crate::scorer::{ScoreError, Scorer};

// ── Routing sink ──

/// Receives routing outcomes. Must tolerate concurrent calls.
pub trait RoutingSink: Send + Sync {
    /// An estimate was produced by `tier`.
    fn routed(&self, tier: ScorerTier);

    /// `tier` was selected but its scorer failed, so routing moved on.
    fn fell_through(&self, tier: ScorerTier);
}

/// Cumulative lock-free routing counters.
#[derive(Debug, Default)]
pub struct RoutingCounters {
    total: AtomicU64,
    specialist: AtomicU64,
    generalist: AtomicU64,
    heuristic: AtomicU64,
    fallthroughs: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoutingStats {
    pub total: u64,
    pub specialist: u64,
    pub generalist: u64,
    pub heuristic: u64,
    pub fallthroughs: u64,
    pub specialist_pct: f64,
    pub generalist_pct: f64,
    pub heuristic_pct: f64,
}

impl RoutingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, tier: ScorerTier) -> &AtomicU64 {
        match tier {
            ScorerTier::Specialist => &self.specialist,
            ScorerTier::Generalist => &self.generalist,
            ScorerTier::Heuristic => &self.heuristic,
        }
    }

    pub fn snapshot(&self) -> RoutingStats {
        let total = self.total.load(Ordering::Relaxed);
        let specialist = self.specialist.load(Ordering::Relaxed);
        let generalist = self.generalist.load(Ordering::Relaxed);
        let heuristic = self.heuristic.load(Ordering::Relaxed);
        let pct = |n: u64| {
            if total == 0 {
                0.0
            } else {
                (10_000.0 * n as f64 / total as f64).round() / 100.0
            }
        };
        RoutingStats {
            total,
            specialist,
            generalist,
            heuristic,
            fallthroughs: self.fallthroughs.load(Ordering::Relaxed),
            specialist_pct: pct(specialist),
            generalist_pct: pct(generalist),
            heuristic_pct: pct(heuristic),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total,
            &self.specialist,
            &self.generalist,
            &self.heuristic,
            &self.fallthroughs,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl RoutingSink for RoutingCounters {
    fn routed(&self, tier: ScorerTier) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.slot(tier).fetch_add(1, Ordering::Relaxed);
    }

    fn fell_through(&self, _tier: ScorerTier) {
        self.fallthroughs.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Tiers ──

enum Gate {
    /// A positive price in the platform's enrichment group.
    PlatformPrices(PlatformId),
    /// Any market, vendor or enrichment slot populated.
    Evidence,
    Always,
}

impl Gate {
    fn admits(&self, fv: &FeatureVector) -> bool {
        match self {
            Self::PlatformPrices(platform) => PLATFORM_PRICE_SUFFIXES
                .iter()
                .any(|s| fv.available(&platform_slot(platform, s)).is_some_and(|v| v > 0.0)),
            Self::Evidence => {
                fv.any_available(EVIDENCE_SLOTS)
                    || fv.platforms().iter().any(|p| {
                        PLATFORM_SLOT_SUFFIXES
                            .iter()
                            .any(|s| fv.available(&platform_slot(p, s)).is_some())
                    })
            }
            Self::Always => true,
        }
    }
}

struct Tier {
    tier: ScorerTier,
    platform: Option<PlatformId>,
    gate: Gate,
    scorer: Arc<dyn Scorer>,
}

impl Tier {
    fn source(&self) -> SourceTag {
        SourceTag {
            tier: self.tier,
            platform: self.platform.clone(),
            model: self.scorer.name().to_string(),
        }
    }

    /// Inputs whose freshness moves this tier's confidence.
    fn depends_on(&self, source: &DataSource) -> bool {
        match (self.tier, source) {
            (ScorerTier::Specialist, DataSource::Platform(p)) => self.platform.as_ref() == Some(p),
            (ScorerTier::Specialist, DataSource::Item(d)) => *d == Domain::Metadata,
            (ScorerTier::Generalist, _) => true,
            (ScorerTier::Heuristic, DataSource::Item(d)) => {
                matches!(d, Domain::Market | Domain::VendorBuyback)
            }
            (ScorerTier::Heuristic, DataSource::Platform(_)) => false,
        }
    }

    fn confidence(&self, report: &FreshnessReport) -> Confidence {
        let (fresh, stale) = report
            .entries
            .iter()
            .filter(|e| self.depends_on(&e.source))
            .fold((0usize, 0usize), |(f, s), e| {
                if e.freshness.is_fresh() {
                    (f + 1, s)
                } else {
                    (f, s + 1)
                }
            });
        let base = self.tier.base_confidence();
        match fresh.cmp(&stale) {
            std::cmp::Ordering::Greater => base.raise(),
            std::cmp::Ordering::Less => base.lower(),
            std::cmp::Ordering::Equal => base,
        }
    }
}

// ── Router ──

pub struct PredictionRouter {
    assembler: FeatureAssembler,
    freshness: FreshnessIndex,
    tiers: Vec<Tier>,
    sink: Arc<dyn RoutingSink>,
}

impl PredictionRouter {
    /// Build the tier list from configuration and whatever the catalog holds.
    pub fn new(
        config: &EngineConfig,
        registry: Arc<SchemaRegistry>,
        catalog: &ModelCatalog,
        sink: Arc<dyn RoutingSink>,
    ) -> Self {
        let mut tiers = Vec::new();
        for platform in &config.routing.specialists {
            if let Some(scorer) = catalog.specialist(platform) {
                tiers.push(Tier {
                    tier: ScorerTier::Specialist,
                    platform: Some(platform.clone()),
                    gate: Gate::PlatformPrices(platform.clone()),
                    scorer: scorer.clone(),
                });
            }
        }
        if let Some(scorer) = catalog.generalist() {
            let gate = match config.routing.generalist_gate {
                GeneralistGate::RequireEvidence => Gate::Evidence,
                GeneralistGate::Always => Gate::Always,
            };
            tiers.push(Tier {
                tier: ScorerTier::Generalist,
                platform: None,
                gate,
                scorer: scorer.clone(),
            });
        }
        tiers.push(Tier {
            tier: ScorerTier::Heuristic,
            platform: None,
            gate: Gate::Always,
            scorer: Arc::new(HeuristicScorer::new(config.heuristic.clone())),
        });

        info!(
            tiers = tiers.len(),
            order = %tiers.iter().map(|t| t.source().to_string()).collect::<Vec<_>>().join(" > "),
            "prediction router ready"
        );
        Self {
            assembler: FeatureAssembler::new(registry),
            freshness: FreshnessIndex::new(&config.freshness),
            tiers,
            sink,
        }
    }

    /// Standard schemas for the configured specialists, models from `routing.model_dir`.
    pub fn from_config(config: &EngineConfig, sink: Arc<dyn RoutingSink>) -> Self {
        let specialists = &config.routing.specialists;
        let registry = Arc::new(SchemaRegistry::standard(specialists));
        let catalog = match &config.routing.model_dir {
            Some(dir) => ModelCatalog::load(Path::new(dir), &registry, specialists),
            None => {
                info!("no model directory configured; heuristic only");
                ModelCatalog::default()
            }
        };
        Self::new(config, registry, &catalog, sink)
    }

    pub fn assembler(&self) -> &FeatureAssembler {
        &self.assembler
    }

    pub fn freshness(&self) -> &FreshnessIndex {
        &self.freshness
    }

    /// Tiers in dispatch order.
    pub fn tiers(&self) -> Vec<SourceTag> {
        self.tiers.iter().map(Tier::source).collect()
    }

    pub fn predict(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
    ) -> Result<PriceEstimate, CoreError> {
        self.predict_at(item, enrichments, Utc::now())
    }

    /// Route one item, judging freshness against `now`.
    pub fn predict_at(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
        now: DateTime<Utc>,
    ) -> Result<PriceEstimate, CoreError> {
        item.validate()?;
        let report = self.freshness.report(item, enrichments, now);
        let mut vectors: HashMap<&str, FeatureVector> = HashMap::new();

        for tier in &self.tiers {
            let fv = match vectors.entry(tier.scorer.schema()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    let schema = *e.key();
                    e.insert(self.assembler.assemble(item, enrichments, schema, now)?)
                }
            };
            if !tier.gate.admits(fv) {
                continue;
            }

            let outcome = tier.scorer.score(fv).and_then(|raw| {
                if raw.dollars.is_finite() && raw.dollars >= 0.0 {
                    Ok(raw)
                } else {
                    Err(ScoreError::NonFinite(raw.dollars))
                }
            });
            let raw = match outcome {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        isbn = %item.isbn(),
                        tier = %tier.tier,
                        model = tier.scorer.name(),
                        error = %e,
                        "scorer failed; falling through"
                    );
                    self.sink.fell_through(tier.tier);
                    continue;
                }
            };

            let mut rationale = raw.reasons;
            rationale.extend(
                report
                    .stale_sources()
                    .filter(|e| tier.depends_on(&e.source))
                    .map(|e| Reason::new(format!("stale {}", e.source.label()), 0.0)),
            );
            let estimate = PriceEstimate::new(
                Money::from_dollars(raw.dollars),
                tier.source(),
                tier.confidence(&report),
                rationale,
            );
            self.sink.routed(tier.tier);
            debug!(
                isbn = %item.isbn(),
                source = %estimate.source,
                value = %estimate.value,
                confidence = %estimate.confidence,
                "routed"
            );
            return Ok(estimate);
        }

        Err(CoreError::InvalidRecord(format!(
            "no scorer could price {}",
            item.isbn()
        )))
    }

    /// Route many items on the rayon pool. Results keep input order.
    pub fn predict_batch(
        &self,
        items: &[(ItemRecord, Enrichments)],
        now: DateTime<Utc>,
    ) -> Vec<Result<PriceEstimate, CoreError>> {
        items
            .par_iter()
            .map(|(item, enrichments)| self.predict_at(item, enrichments, now))
            .collect()
    }
}
