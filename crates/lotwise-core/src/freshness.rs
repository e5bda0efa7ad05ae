//! Freshness index: classifies each data domain as fresh or stale.
//!
//! Thresholds are configuration. A missing timestamp is maximally stale, a
//! timestamp in the future is age zero. Staleness is advisory: it lowers
//! confidence but never removes data from scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{Domain, Enrichments, ItemRecord, PlatformId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

/// Per-domain staleness thresholds, in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub market_days: u32,
    pub vendor_buyback_days: u32,
    pub metadata_days: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            market_days: 7,
            vendor_buyback_days: 14,
            metadata_days: 90,
        }
    }
}

/// Pure classifier over `(domain, last_fetched_at, now)`.
#[derive(Debug, Clone)]
pub struct FreshnessIndex {
    thresholds: BTreeMap<Domain, Duration>,
}

impl Default for FreshnessIndex {
    fn default() -> Self {
        Self::new(&FreshnessConfig::default())
    }
}

impl FreshnessIndex {
    pub fn new(config: &FreshnessConfig) -> Self {
        let days = |d: u32| Duration::days(i64::from(d));
        let thresholds = BTreeMap::from([
            (Domain::Market, days(config.market_days)),
            (Domain::VendorBuyback, days(config.vendor_buyback_days)),
            (Domain::Metadata, days(config.metadata_days)),
        ]);
        Self { thresholds }
    }

    pub fn threshold(&self, domain: Domain) -> Duration {
        self.thresholds
            .get(&domain)
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    /// Fresh when the snapshot's age is within the domain threshold (inclusive).
    pub fn classify(
        &self,
        domain: Domain,
        last_fetched_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Freshness {
        let Some(fetched) = last_fetched_at else {
            return Freshness::Stale;
        };
        let age = (now - fetched).max(Duration::zero());
        if age <= self.threshold(domain) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    /// Classify every domain of an item plus each enrichment snapshot.
    pub fn report(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
        now: DateTime<Utc>,
    ) -> FreshnessReport {
        let entry = |source: DataSource, domain: Domain, fetched_at: Option<DateTime<Utc>>| {
            FreshnessEntry {
                source,
                domain,
                fetched_at,
                age_days: fetched_at.map(|t| (now - t).max(Duration::zero()).num_days()),
                freshness: self.classify(domain, fetched_at, now),
            }
        };

        let mut entries: Vec<FreshnessEntry> = Domain::ALL
            .iter()
            .map(|&d| entry(DataSource::Item(d), d, item.fetched_at(d)))
            .collect();

        // Enrichment payloads are market data with their own fetch times.
        entries.extend(enrichments.iter().map(|(platform, snap)| {
            entry(
                DataSource::Platform(platform.clone()),
                Domain::Market,
                Some(snap.fetched_at),
            )
        }));

        FreshnessReport { entries }
    }
}

/// Where a classified timestamp came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum DataSource {
    Item(Domain),
    Platform(PlatformId),
}

impl DataSource {
    pub fn label(&self) -> String {
        match self {
            Self::Item(d) => d.to_string(),
            Self::Platform(p) => format!("platform:{p}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessEntry {
    pub source: DataSource,
    pub domain: Domain,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age_days: Option<i64>,
    pub freshness: Freshness,
}

/// Staleness of every input an item was (or could be) scored from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub entries: Vec<FreshnessEntry>,
}

impl FreshnessReport {
    pub fn stale_sources(&self) -> impl Iterator<Item = &FreshnessEntry> {
        self.entries.iter().filter(|e| !e.freshness.is_fresh())
    }

    pub fn all_fresh(&self) -> bool {
        self.entries.iter().all(|e| e.freshness.is_fresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isbn::Isbn13;
    use crate::record::{ItemAttributes, MarketStats, PlatformStats, Snapshot};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap()
    }

    #[test]
    fn default_thresholds() {
        let idx = FreshnessIndex::default();
        assert_eq!(idx.threshold(Domain::Market), Duration::days(7));
        assert_eq!(idx.threshold(Domain::VendorBuyback), Duration::days(14));
        assert_eq!(idx.threshold(Domain::Metadata), Duration::days(90));
    }

    #[test]
    fn missing_timestamp_is_stale() {
        let idx = FreshnessIndex::default();
        for domain in Domain::ALL {
            assert_eq!(idx.classify(domain, None, now()), Freshness::Stale);
        }
    }

    #[test]
    fn boundary_is_inclusive() {
        let idx = FreshnessIndex::default();
        let seven_days = now() - Duration::days(7);
        let just_over = seven_days - Duration::seconds(1);
        assert_eq!(idx.classify(Domain::Market, Some(seven_days), now()), Freshness::Fresh);
        assert_eq!(idx.classify(Domain::Market, Some(just_over), now()), Freshness::Stale);
    }

    #[test]
    fn same_age_differs_by_domain() {
        let idx = FreshnessIndex::default();
        let ten_days = Some(now() - Duration::days(10));
        assert_eq!(idx.classify(Domain::Market, ten_days, now()), Freshness::Stale);
        assert_eq!(idx.classify(Domain::VendorBuyback, ten_days, now()), Freshness::Fresh);
        assert_eq!(idx.classify(Domain::Metadata, ten_days, now()), Freshness::Fresh);
    }

    #[test]
    fn thresholds_are_overridable() {
        let idx = FreshnessIndex::new(&FreshnessConfig {
            market_days: 30,
            ..Default::default()
        });
        let ten_days = Some(now() - Duration::days(10));
        assert_eq!(idx.classify(Domain::Market, ten_days, now()), Freshness::Fresh);
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let idx = FreshnessIndex::default();
        let tomorrow = Some(now() + Duration::days(1));
        assert_eq!(idx.classify(Domain::Market, tomorrow, now()), Freshness::Fresh);
    }

    #[test]
    fn report_covers_item_domains_and_platforms() {
        let item = ItemRecord::new(Isbn13::parse("9780316018043").unwrap(), ItemAttributes::default())
            .with_market(Snapshot::new(MarketStats::default(), now() - Duration::days(2)));
        let mut enrichments = Enrichments::new();
        enrichments.insert(
            PlatformId::new("abebooks"),
            Snapshot::new(PlatformStats::default(), now() - Duration::days(20)),
        );

        let report = FreshnessIndex::default().report(&item, &enrichments, now());
        assert_eq!(report.entries.len(), 4);
        assert_eq!(report.entries[0].freshness, Freshness::Fresh);
        assert_eq!(report.entries[0].age_days, Some(2));

        let stale: Vec<String> = report.stale_sources().map(|e| e.source.label()).collect();
        assert_eq!(stale, vec!["vendor_buyback", "metadata", "platform:abebooks"]);
        assert!(!report.all_fresh());
    }
}
