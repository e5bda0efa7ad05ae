//! Item records: one physical book plus its per-domain data snapshots.
//!
//! Every snapshot is append-replaced on refresh: the new observation becomes
//! the snapshot for its domain, but a field the new observation leaves empty
//! keeps the value previously known for it. A refresh can never turn a known
//! value into an absence.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::isbn::Isbn13;

/// Current item record schema version.
pub const ITEM_RECORD_VERSION: u32 = 1;

/// Data domains with independent refresh cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market,
    VendorBuyback,
    Metadata,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Market, Domain::VendorBuyback, Domain::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::VendorBuyback => "vendor_buyback",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload plus the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self { value, fetched_at }
    }
}

/// Payloads whose empty fields can be back-filled from an earlier observation.
pub trait Preserve {
    /// Fill every field that is empty in `self` from `prior`.
    fn preserve_from(&mut self, prior: &Self);
}

macro_rules! preserve_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl Preserve for $ty {
            fn preserve_from(&mut self, prior: &Self) {
                $(
                    if self.$field.is_none() {
                        self.$field = prior.$field.clone();
                    }
                )*
            }
        }
    };
}

/// Replace `slot` with `incoming`, carrying forward fields the new observation lacks.
///
/// A snapshot older than the one held only back-fills fields the held one lacks.
fn refresh_slot<T: Preserve>(slot: &mut Option<Snapshot<T>>, mut incoming: Snapshot<T>) {
    match slot {
        Some(prior) if incoming.fetched_at < prior.fetched_at => {
            prior.value.preserve_from(&incoming.value);
        }
        Some(prior) => {
            incoming.value.preserve_from(&prior.value);
            *prior = incoming;
        }
        None => *slot = Some(incoming),
    }
}

// ── Attributes ──

/// Condition grade, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGrade {
    New,
    LikeNew,
    VeryGood,
    #[default]
    Good,
    Acceptable,
    Poor,
}

impl ConditionGrade {
    pub const ALL: [ConditionGrade; 6] = [
        Self::New,
        Self::LikeNew,
        Self::VeryGood,
        Self::Good,
        Self::Acceptable,
        Self::Poor,
    ];

    /// Price multiplier applied by the heuristic scorer.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::New => 1.25,
            Self::LikeNew => 1.15,
            Self::VeryGood => 1.05,
            Self::Good => 0.95,
            Self::Acceptable => 0.8,
            Self::Poor => 0.6,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::LikeNew => "Like New",
            Self::VeryGood => "Very Good",
            Self::Good => "Good",
            Self::Acceptable => "Acceptable",
            Self::Poor => "Poor",
        }
    }
}

impl FromStr for ConditionGrade {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "new" | "brandnew" => Ok(Self::New),
            "likenew" | "asnew" | "fine" => Ok(Self::LikeNew),
            "verygood" | "vg" => Ok(Self::VeryGood),
            "good" => Ok(Self::Good),
            "acceptable" | "fair" => Ok(Self::Acceptable),
            "poor" => Ok(Self::Poor),
            _ => Err(CoreError::UnknownCondition(s.to_string())),
        }
    }
}

impl fmt::Display for ConditionGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Hardcover,
    Paperback,
    MassMarket,
}

/// Physical attributes of the copy in hand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemAttributes {
    #[serde(default)]
    pub condition: ConditionGrade,
    #[serde(default)]
    pub binding: Option<Binding>,
    #[serde(default)]
    pub signed: Option<bool>,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub printing: Option<String>,
}

impl ItemAttributes {
    pub fn is_first_edition(&self) -> bool {
        let first = |s: &Option<String>| {
            s.as_deref().is_some_and(|v| {
                let v = v.to_ascii_lowercase();
                v.contains("1st") || v.contains("first")
            })
        };
        first(&self.printing) || first(&self.edition)
    }
}

// ── Domain payloads ──

/// Aggregated marketplace signals for one ISBN.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketStats {
    pub sold_count: Option<u32>,
    pub sold_avg_price: Option<f64>,
    pub active_count: Option<u32>,
    pub active_median_price: Option<f64>,
    pub sell_through_rate: Option<f64>,
    pub amazon_sales_rank: Option<u64>,
    pub amazon_offer_count: Option<u32>,
}

preserve_fields!(MarketStats {
    sold_count,
    sold_avg_price,
    active_count,
    active_median_price,
    sell_through_rate,
    amazon_sales_rank,
    amazon_offer_count,
});

impl MarketStats {
    /// Sold-listing evidence: at least one sale with a positive average price.
    pub fn has_sold_comps(&self) -> bool {
        self.sold_count.is_some_and(|n| n > 0) && self.sold_avg_price.is_some_and(|p| p > 0.0)
    }
}

/// Buyback vendor quotes (the price a vendor will pay today).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorQuote {
    pub best_offer: Option<f64>,
    pub best_vendor: Option<String>,
    pub offer_count: Option<u32>,
}

preserve_fields!(VendorQuote {
    best_offer,
    best_vendor,
    offer_count,
});

/// Bibliographic metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub series_name: Option<String>,
    pub series_index: Option<u32>,
    pub page_count: Option<u32>,
    pub published_year: Option<i32>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<u64>,
    pub list_price: Option<f64>,
    pub categories: Option<Vec<String>>,
}

preserve_fields!(BookMetadata {
    title,
    authors,
    series_name,
    series_index,
    page_count,
    published_year,
    average_rating,
    ratings_count,
    list_price,
    categories,
});

impl BookMetadata {
    pub fn primary_author(&self) -> Option<&str> {
        self.authors
            .as_ref()
            .and_then(|a| a.iter().map(|s| s.trim()).find(|s| !s.is_empty()))
    }
}

// ── Enrichments ──

/// Marketplace identifier for enrichment payloads (`abebooks`, `bookfinder`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlatformId(String);

impl PlatformId {
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PlatformId {
    fn from(id: String) -> Self {
        Self::new(&id)
    }
}

impl From<PlatformId> for String {
    fn from(id: PlatformId) -> Self {
        id.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sold/listing aggregates from one marketplace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformStats {
    pub listing_count: Option<u32>,
    pub min_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub median_price: Option<f64>,
    pub sold_count: Option<u32>,
    pub sold_avg_price: Option<f64>,
}

preserve_fields!(PlatformStats {
    listing_count,
    min_price,
    avg_price,
    median_price,
    sold_count,
    sold_avg_price,
});

impl PlatformStats {
    pub fn has_sold_comps(&self) -> bool {
        self.sold_count.is_some_and(|n| n > 0) && self.sold_avg_price.is_some_and(|p| p > 0.0)
    }
}

/// Platform payloads supplied alongside an item, already fetched by the caller.
pub type Enrichments = BTreeMap<PlatformId, Snapshot<PlatformStats>>;

// ── Item record ──

/// One book instance with its snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default = "default_version")]
    schema_version: u32,
    isbn: Isbn13,
    #[serde(default)]
    pub attributes: ItemAttributes,
    #[serde(default)]
    market: Option<Snapshot<MarketStats>>,
    #[serde(default)]
    vendor: Option<Snapshot<VendorQuote>>,
    #[serde(default)]
    metadata: Option<Snapshot<BookMetadata>>,
}

fn default_version() -> u32 {
    ITEM_RECORD_VERSION
}

impl ItemRecord {
    pub fn new(isbn: Isbn13, attributes: ItemAttributes) -> Self {
        Self {
            schema_version: ITEM_RECORD_VERSION,
            isbn,
            attributes,
            market: None,
            vendor: None,
            metadata: None,
        }
    }

    /// Parse and validate a record from JSON.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Reject records written under a schema this build does not understand,
    /// and payloads with nonsensical numbers.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.schema_version != ITEM_RECORD_VERSION {
            return Err(CoreError::UnsupportedRecordVersion {
                found: self.schema_version,
                supported: ITEM_RECORD_VERSION,
            });
        }
        let prices = [
            ("market.sold_avg_price", self.market_stats().and_then(|m| m.sold_avg_price)),
            (
                "market.active_median_price",
                self.market_stats().and_then(|m| m.active_median_price),
            ),
            ("vendor.best_offer", self.vendor_quote().and_then(|v| v.best_offer)),
            ("metadata.list_price", self.book_metadata().and_then(|m| m.list_price)),
        ];
        for (name, value) in prices {
            if let Some(v) = value
                && (!v.is_finite() || v < 0.0)
            {
                return Err(CoreError::InvalidRecord(format!("{name} = {v}")));
            }
        }
        Ok(())
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn isbn(&self) -> &Isbn13 {
        &self.isbn
    }

    pub fn market(&self) -> Option<&Snapshot<MarketStats>> {
        self.market.as_ref()
    }

    pub fn vendor(&self) -> Option<&Snapshot<VendorQuote>> {
        self.vendor.as_ref()
    }

    pub fn metadata(&self) -> Option<&Snapshot<BookMetadata>> {
        self.metadata.as_ref()
    }

    pub fn market_stats(&self) -> Option<&MarketStats> {
        self.market.as_ref().map(|s| &s.value)
    }

    pub fn vendor_quote(&self) -> Option<&VendorQuote> {
        self.vendor.as_ref().map(|s| &s.value)
    }

    pub fn book_metadata(&self) -> Option<&BookMetadata> {
        self.metadata.as_ref().map(|s| &s.value)
    }

    /// Last fetch time for a domain, if that domain was ever fetched.
    pub fn fetched_at(&self, domain: Domain) -> Option<DateTime<Utc>> {
        match domain {
            Domain::Market => self.market.as_ref().map(|s| s.fetched_at),
            Domain::VendorBuyback => self.vendor.as_ref().map(|s| s.fetched_at),
            Domain::Metadata => self.metadata.as_ref().map(|s| s.fetched_at),
        }
    }

    pub fn refresh_market(&mut self, snapshot: Snapshot<MarketStats>) {
        refresh_slot(&mut self.market, snapshot);
    }

    pub fn refresh_vendor(&mut self, snapshot: Snapshot<VendorQuote>) {
        refresh_slot(&mut self.vendor, snapshot);
    }

    pub fn refresh_metadata(&mut self, snapshot: Snapshot<BookMetadata>) {
        refresh_slot(&mut self.metadata, snapshot);
    }

    /// Update physical attributes. Unknown values in `incoming` keep the prior ones;
    /// the condition grade is always taken from `incoming`.
    pub fn refresh_attributes(&mut self, mut incoming: ItemAttributes) {
        let prior = &self.attributes;
        if incoming.binding.is_none() {
            incoming.binding = prior.binding;
        }
        if incoming.signed.is_none() {
            incoming.signed = prior.signed;
        }
        if incoming.edition.is_none() {
            incoming.edition = prior.edition.clone();
        }
        if incoming.printing.is_none() {
            incoming.printing = prior.printing.clone();
        }
        self.attributes = incoming;
    }

    /// Builder-style helpers for callers assembling records in code.
    pub fn with_market(mut self, snapshot: Snapshot<MarketStats>) -> Self {
        self.refresh_market(snapshot);
        self
    }

    pub fn with_vendor(mut self, snapshot: Snapshot<VendorQuote>) -> Self {
        self.refresh_vendor(snapshot);
        self
    }

    pub fn with_metadata(mut self, snapshot: Snapshot<BookMetadata>) -> Self {
        self.refresh_metadata(snapshot);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn isbn() -> Isbn13 {
        Isbn13::parse("9780316018043").unwrap()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn refresh_keeps_known_values_the_new_snapshot_lacks() {
        let mut item = ItemRecord::new(isbn(), ItemAttributes::default()).with_market(Snapshot::new(
            MarketStats {
                sold_count: Some(12),
                sold_avg_price: Some(9.5),
                ..Default::default()
            },
            at(1),
        ));

        item.refresh_market(Snapshot::new(
            MarketStats {
                active_count: Some(4),
                sold_avg_price: Some(11.0),
                ..Default::default()
            },
            at(5),
        ));

        let market = item.market().unwrap();
        assert_eq!(market.fetched_at, at(5));
        assert_eq!(market.value.sold_count, Some(12), "kept from prior");
        assert_eq!(market.value.sold_avg_price, Some(11.0), "superseded");
        assert_eq!(market.value.active_count, Some(4), "new");
    }

    #[test]
    fn refresh_never_rewinds_fetch_time() {
        let mut item = ItemRecord::new(isbn(), ItemAttributes::default())
            .with_vendor(Snapshot::new(VendorQuote::default(), at(9)));
        item.refresh_vendor(Snapshot::new(
            VendorQuote {
                best_offer: Some(2.0),
                ..Default::default()
            },
            at(2),
        ));
        assert_eq!(item.vendor().unwrap().fetched_at, at(9));
        // Nothing newer was known, so the late value fills the gap.
        assert_eq!(item.vendor_quote().unwrap().best_offer, Some(2.0));
    }

    #[test]
    fn late_older_snapshot_does_not_override_newer_values() {
        let mut item = ItemRecord::new(isbn(), ItemAttributes::default()).with_vendor(
            Snapshot::new(
                VendorQuote {
                    best_offer: Some(5.0),
                    ..Default::default()
                },
                at(9),
            ),
        );
        item.refresh_vendor(Snapshot::new(
            VendorQuote {
                best_offer: Some(2.0),
                ..Default::default()
            },
            at(2),
        ));
        let vendor = item.vendor().unwrap();
        assert_eq!(vendor.fetched_at, at(9));
        assert_eq!(vendor.value.best_offer, Some(5.0));
    }

    #[test]
    fn attribute_refresh_preserves_unknowns() {
        let mut item = ItemRecord::new(
            isbn(),
            ItemAttributes {
                signed: Some(true),
                binding: Some(Binding::Hardcover),
                ..Default::default()
            },
        );
        item.refresh_attributes(ItemAttributes {
            condition: ConditionGrade::VeryGood,
            ..Default::default()
        });
        assert_eq!(item.attributes.signed, Some(true));
        assert_eq!(item.attributes.binding, Some(Binding::Hardcover));
        assert_eq!(item.attributes.condition, ConditionGrade::VeryGood);
    }

    #[test]
    fn condition_parses_loose_spellings() {
        assert_eq!("Like New".parse::<ConditionGrade>().unwrap(), ConditionGrade::LikeNew);
        assert_eq!("very_good".parse::<ConditionGrade>().unwrap(), ConditionGrade::VeryGood);
        assert_eq!("ACCEPTABLE".parse::<ConditionGrade>().unwrap(), ConditionGrade::Acceptable);
        assert!("mint-ish".parse::<ConditionGrade>().is_err());
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let json = r#"{"schema_version": 7, "isbn": "9780316018043"}"#;
        let err = ItemRecord::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedRecordVersion { found: 7, .. }
        ));
    }

    #[test]
    fn minimal_json_record_defaults() {
        let item = ItemRecord::from_json(r#"{"isbn": "0316018740"}"#).unwrap();
        assert_eq!(item.isbn().as_str(), "9780316018746");
        assert_eq!(item.schema_version(), ITEM_RECORD_VERSION);
        assert_eq!(item.attributes.condition, ConditionGrade::Good);
        assert!(item.market().is_none());
    }

    #[test]
    fn negative_prices_are_rejected() {
        let json = r#"{
            "isbn": "9780316018043",
            "vendor": {"value": {"best_offer": -1.0}, "fetched_at": "2026-03-01T00:00:00Z"}
        }"#;
        assert!(matches!(
            ItemRecord::from_json(json),
            Err(CoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn first_edition_detected_from_printing_or_edition() {
        let attrs = ItemAttributes {
            printing: Some("1st".into()),
            ..Default::default()
        };
        assert!(attrs.is_first_edition());
        let attrs = ItemAttributes {
            edition: Some("First Edition".into()),
            ..Default::default()
        };
        assert!(attrs.is_first_edition());
        assert!(!ItemAttributes::default().is_first_edition());
    }
}
