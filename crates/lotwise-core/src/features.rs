//! Feature schemas and the feature assembler.
//!
//! A [`FeatureSchema`] is a named, versioned, ordered list of slots. Every
//! schema lives in one [`SchemaRegistry`] shared by the scorers and by the
//! training export, so a model and the vectors fed to it always agree on slot
//! order. The assembler maps an [`ItemRecord`] plus enrichments into a
//! [`FeatureVector`] for one schema, filling missing inputs with `0.0` and
//! recording which slots were filled that way.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::{Binding, ConditionGrade, Enrichments, ItemRecord, PlatformId};

/// Value written into a slot whose input is missing.
pub const SENTINEL: f32 = 0.0;

/// Version string of the unified schema.
pub const UNIFIED_SCHEMA: &str = "unified-v1";

/// Category keywords marking textbook-like demand.
const TEXTBOOK_KEYWORDS: &[&str] = &[
    "business",
    "finance",
    "medical",
    "nursing",
    "law",
    "science",
    "technology",
    "computer",
    "engineering",
    "mathematics",
];

const FICTION_KEYWORDS: &[&str] = &["fiction", "novel", "mystery", "thriller", "romance", "fantasy"];

// ── Slot layout ──

/// Base slots shared by every schema, in order.
pub const BASE_SLOTS: &[&str] = &[
    // Market signals.
    "log_amazon_rank",
    "amazon_count",
    "ebay_sold_count",
    "ebay_sold_avg_price",
    "ebay_active_count",
    "ebay_active_median",
    "sell_through_rate",
    // Vendor buyback.
    "vendor_best_offer",
    "vendor_offer_count",
    // Metadata.
    "page_count",
    "age_years",
    "log_ratings",
    "rating",
    "list_price",
    // Condition, one-hot.
    "is_new",
    "is_like_new",
    "is_very_good",
    "is_good",
    "is_acceptable",
    "is_poor",
    // Physical attributes.
    "is_hardcover",
    "is_paperback",
    "is_mass_market",
    "is_signed",
    "is_first_edition",
    // Category flags.
    "is_textbook",
    "is_fiction",
    // Derived.
    "demand_score",
    "competition_ratio",
    "price_velocity",
];

/// Slots that carry market or vendor evidence (as opposed to book attributes).
pub const EVIDENCE_SLOTS: &[&str] = &[
    "log_amazon_rank",
    "amazon_count",
    "ebay_sold_count",
    "ebay_sold_avg_price",
    "ebay_active_count",
    "ebay_active_median",
    "sell_through_rate",
    "vendor_best_offer",
    "vendor_offer_count",
];

/// One-hot condition slots.
pub const CONDITION_SLOTS: [(ConditionGrade, &str); 6] = [
    (ConditionGrade::New, "is_new"),
    (ConditionGrade::LikeNew, "is_like_new"),
    (ConditionGrade::VeryGood, "is_very_good"),
    (ConditionGrade::Good, "is_good"),
    (ConditionGrade::Acceptable, "is_acceptable"),
    (ConditionGrade::Poor, "is_poor"),
];

/// Per-platform enrichment slot suffixes, in order.
pub const PLATFORM_SLOT_SUFFIXES: &[&str] = &[
    "listing_count",
    "min_price",
    "avg_price",
    "median_price",
    "sold_count",
    "sold_avg_price",
];

/// Suffixes of the price-bearing slots in a platform group.
pub const PLATFORM_PRICE_SUFFIXES: &[&str] = &["min_price", "avg_price", "median_price", "sold_avg_price"];

pub fn platform_slot(platform: &PlatformId, suffix: &str) -> String {
    format!("{}_{suffix}", platform.as_str())
}

/// Version string of a platform specialist's schema.
pub fn specialist_schema(platform: &PlatformId) -> String {
    format!("{}-v1", platform.as_str())
}

// ── Schema ──

/// An ordered set of named slots under a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    version: String,
    slots: Vec<String>,
    index: HashMap<String, usize>,
    platforms: Vec<PlatformId>,
}

impl FeatureSchema {
    fn build(version: String, platforms: Vec<PlatformId>) -> Self {
        let mut slots: Vec<String> = BASE_SLOTS.iter().map(|s| s.to_string()).collect();
        for platform in &platforms {
            slots.extend(PLATFORM_SLOT_SUFFIXES.iter().map(|s| platform_slot(platform, s)));
        }
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Self {
            version,
            slots,
            index,
            platforms,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, slot: &str) -> Option<usize> {
        self.index.get(slot).copied()
    }

    /// Platforms whose enrichment groups this schema carries.
    pub fn platforms(&self) -> &[PlatformId] {
        &self.platforms
    }
}

/// Every feature schema this build understands, keyed by version.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<FeatureSchema>>,
}

impl SchemaRegistry {
    /// `unified-v1` over all `platforms`, plus one `<platform>-v1` schema each.
    pub fn standard(platforms: &[PlatformId]) -> Self {
        let mut registry = Self::default();
        registry.register(FeatureSchema::build(
            UNIFIED_SCHEMA.to_string(),
            platforms.to_vec(),
        ));
        for platform in platforms {
            registry.register(FeatureSchema::build(
                specialist_schema(platform),
                vec![platform.clone()],
            ));
        }
        registry
    }

    fn register(&mut self, schema: FeatureSchema) {
        self.schemas
            .insert(schema.version.clone(), Arc::new(schema));
    }

    pub fn get(&self, version: &str) -> Result<Arc<FeatureSchema>, CoreError> {
        self.schemas
            .get(version)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSchema(version.to_string()))
    }

    pub fn unified(&self) -> Result<Arc<FeatureSchema>, CoreError> {
        self.get(UNIFIED_SCHEMA)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(|k| k.as_str())
    }
}

// ── Vector ──

/// Fixed-length values for one schema, plus which slots hold the sentinel
/// because their input was missing.
///
/// Only built through [`FeatureVector::from_parts`], so the schema it carries
/// always matches both lengths. Serialised vectors are read back through
/// [`FeatureVectorParts::bind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    schema: String,
    values: Vec<f32>,
    sentinel: Vec<bool>,
    #[serde(skip)]
    slots: Arc<FeatureSchema>,
}

/// The wire form of a [`FeatureVector`], not yet checked against a schema.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureVectorParts {
    pub schema: String,
    pub values: Vec<f32>,
    pub sentinel: Vec<bool>,
}

impl FeatureVectorParts {
    /// Resolve the schema version in `registry` and validate both lengths.
    pub fn bind(self, registry: &SchemaRegistry) -> Result<FeatureVector, CoreError> {
        let schema = registry.get(&self.schema)?;
        FeatureVector::from_parts(schema, self.values, self.sentinel)
    }
}

impl FeatureVector {
    /// Build a vector from raw parts, rejecting any length mismatch.
    pub fn from_parts(
        schema: Arc<FeatureSchema>,
        values: Vec<f32>,
        sentinel: Vec<bool>,
    ) -> Result<Self, CoreError> {
        for found in [values.len(), sentinel.len()] {
            if found != schema.len() {
                return Err(CoreError::VectorLength {
                    schema: schema.version.clone(),
                    expected: schema.len(),
                    found,
                });
            }
        }
        Ok(Self {
            schema: schema.version.clone(),
            values,
            sentinel,
            slots: schema,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Platforms whose enrichment groups this vector carries.
    pub fn platforms(&self) -> &[PlatformId] {
        self.slots.platforms()
    }

    /// Per-slot flag: `true` where the value is the sentinel.
    pub fn sentinel_mask(&self) -> &[bool] {
        &self.sentinel
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check this vector against the schema a scorer was built for.
    pub fn check(&self, expected: &FeatureSchema) -> Result<(), CoreError> {
        if self.schema != expected.version {
            return Err(CoreError::SchemaMismatch {
                expected: expected.version.clone(),
                found: self.schema.clone(),
            });
        }
        for found in [self.values.len(), self.sentinel.len()] {
            if found != expected.len() {
                return Err(CoreError::VectorLength {
                    schema: self.schema.clone(),
                    expected: expected.len(),
                    found,
                });
            }
        }
        Ok(())
    }

    fn slot_index(&self, slot: &str) -> Option<usize> {
        self.slots.index_of(slot)
    }

    /// Value of a named slot, whether real or sentinel.
    pub fn get(&self, slot: &str) -> Option<f32> {
        self.slot_index(slot).map(|i| self.values[i])
    }

    /// Value of a named slot only when it came from real input.
    pub fn available(&self, slot: &str) -> Option<f32> {
        self.slot_index(slot)
            .filter(|&i| !self.sentinel[i])
            .map(|i| self.values[i])
    }

    pub fn is_sentinel(&self, slot: &str) -> bool {
        self.slot_index(slot).is_none_or(|i| self.sentinel[i])
    }

    /// Names of slots filled with the sentinel.
    pub fn missing(&self) -> Vec<&str> {
        self.slots
            .slots
            .iter()
            .zip(&self.sentinel)
            .filter(|(_, s)| **s)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Share of slots backed by real input.
    pub fn completeness(&self) -> f32 {
        if self.sentinel.is_empty() {
            return 0.0;
        }
        let real = self.sentinel.iter().filter(|s| !**s).count();
        real as f32 / self.sentinel.len() as f32
    }

    /// Any real value among `slots` that is strictly positive.
    pub fn any_positive(&self, slots: &[&str]) -> bool {
        slots
            .iter()
            .any(|s| self.available(s).is_some_and(|v| v > 0.0))
    }

    /// Any real value among `slots`.
    pub fn any_available(&self, slots: &[&str]) -> bool {
        slots.iter().any(|s| self.available(s).is_some())
    }
}

// ── Assembler ──

/// Deterministic mapping from records to feature vectors.
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    registry: Arc<SchemaRegistry>,
}

/// Slot writer that tracks which slots received real input.
struct SlotWriter {
    values: BTreeMap<String, f32>,
    sentinel: BTreeMap<String, bool>,
}

impl SlotWriter {
    fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            sentinel: BTreeMap::new(),
        }
    }

    fn set(&mut self, slot: &str, value: Option<f64>) {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.values.insert(slot.to_string(), v as f32);
                self.sentinel.insert(slot.to_string(), false);
            }
            None => {
                self.values.insert(slot.to_string(), SENTINEL);
                self.sentinel.insert(slot.to_string(), true);
            }
        }
    }

    fn flag(&mut self, slot: &str, known: bool, on: bool) {
        self.set(slot, known.then_some(if on { 1.0 } else { 0.0 }));
    }

    fn real(&self, slot: &str) -> Option<f64> {
        match self.sentinel.get(slot) {
            Some(false) => self.values.get(slot).map(|v| f64::from(*v)),
            _ => None,
        }
    }
}

impl FeatureAssembler {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Assemble the vector for `schema_version`. `as_of` anchors age features.
    pub fn assemble(
        &self,
        item: &ItemRecord,
        enrichments: &Enrichments,
        schema_version: &str,
        as_of: DateTime<Utc>,
    ) -> Result<FeatureVector, CoreError> {
        item.validate()?;
        let schema = self.registry.get(schema_version)?;
        let mut w = SlotWriter::new();

        write_market(&mut w, item);
        write_vendor(&mut w, item);
        write_metadata(&mut w, item, as_of);
        write_attributes(&mut w, item);
        write_derived(&mut w, item);
        for platform in schema.platforms() {
            write_platform(&mut w, platform, enrichments);
        }

        let mut values = Vec::with_capacity(schema.len());
        let mut sentinel = Vec::with_capacity(schema.len());
        for slot in schema.slots() {
            values.push(w.values.get(slot).copied().unwrap_or(SENTINEL));
            sentinel.push(w.sentinel.get(slot).copied().unwrap_or(true));
        }

        FeatureVector::from_parts(schema, values, sentinel)
    }
}

fn write_market(w: &mut SlotWriter, item: &ItemRecord) {
    let m = item.market_stats();
    w.set(
        "log_amazon_rank",
        m.and_then(|m| m.amazon_sales_rank)
            .filter(|r| *r > 0)
            .map(|r| (r as f64).ln_1p()),
    );
    w.set(
        "amazon_count",
        m.and_then(|m| m.amazon_offer_count).map(f64::from),
    );
    w.set(
        "ebay_sold_count",
        m.and_then(|m| m.sold_count).filter(|n| *n > 0).map(f64::from),
    );
    w.set(
        "ebay_sold_avg_price",
        m.and_then(|m| m.sold_avg_price).filter(|p| *p > 0.0),
    );
    w.set(
        "ebay_active_count",
        m.and_then(|m| m.active_count).map(f64::from),
    );
    w.set(
        "ebay_active_median",
        m.and_then(|m| m.active_median_price).filter(|p| *p > 0.0),
    );
    w.set("sell_through_rate", m.and_then(|m| m.sell_through_rate));
}

fn write_vendor(w: &mut SlotWriter, item: &ItemRecord) {
    let v = item.vendor_quote();
    w.set(
        "vendor_best_offer",
        v.and_then(|v| v.best_offer).filter(|p| *p > 0.0),
    );
    w.set(
        "vendor_offer_count",
        v.and_then(|v| v.offer_count).map(f64::from),
    );
}

fn write_metadata(w: &mut SlotWriter, item: &ItemRecord, as_of: DateTime<Utc>) {
    let md = item.book_metadata();
    w.set(
        "page_count",
        md.and_then(|m| m.page_count).filter(|p| *p > 0).map(f64::from),
    );
    w.set(
        "age_years",
        md.and_then(|m| m.published_year)
            .map(|y| f64::from((as_of.year() - y).max(0))),
    );
    w.set(
        "log_ratings",
        md.and_then(|m| m.ratings_count).map(|n| (n as f64).ln_1p()),
    );
    w.set("rating", md.and_then(|m| m.average_rating));
    w.set("list_price", md.and_then(|m| m.list_price).filter(|p| *p > 0.0));

    let categories: Vec<String> = md
        .and_then(|m| m.categories.as_ref())
        .map(|c| c.iter().map(|s| s.to_lowercase()).collect())
        .unwrap_or_default();
    let known = !categories.is_empty();
    let matches = |keywords: &[&str]| {
        categories
            .iter()
            .any(|cat| keywords.iter().any(|k| cat.contains(k)))
    };
    w.flag("is_textbook", known, matches(TEXTBOOK_KEYWORDS));
    w.flag("is_fiction", known, matches(FICTION_KEYWORDS));
}

fn write_attributes(w: &mut SlotWriter, item: &ItemRecord) {
    let attrs = &item.attributes;
    for (grade, slot) in CONDITION_SLOTS {
        w.flag(slot, true, attrs.condition == grade);
    }

    let binding = attrs.binding;
    w.flag("is_hardcover", binding.is_some(), binding == Some(Binding::Hardcover));
    w.flag("is_paperback", binding.is_some(), binding == Some(Binding::Paperback));
    w.flag("is_mass_market", binding.is_some(), binding == Some(Binding::MassMarket));
    w.flag("is_signed", attrs.signed.is_some(), attrs.signed == Some(true));
    let printing_known = attrs.printing.is_some() || attrs.edition.is_some();
    w.flag("is_first_edition", printing_known, attrs.is_first_edition());
}

fn write_derived(w: &mut SlotWriter, item: &ItemRecord) {
    let sold = w.real("ebay_sold_count");
    let rank = w.real("log_amazon_rank");
    let active = w.real("ebay_active_count");

    w.set(
        "demand_score",
        match (sold, rank) {
            (Some(s), Some(r)) if r > 0.0 => Some(s / r.max(1.0)),
            _ => None,
        },
    );
    w.set(
        "competition_ratio",
        match (sold, active) {
            (Some(s), Some(a)) if s > 0.0 => Some(a / s),
            (None, Some(a)) if a > 0.0 => Some(a),
            _ => None,
        },
    );

    let m = item.market_stats();
    let active_median = m.and_then(|m| m.active_median_price).filter(|p| *p > 0.0);
    let sold_avg = m.and_then(|m| m.sold_avg_price).filter(|p| *p > 0.0);
    w.set(
        "price_velocity",
        match (active_median, sold_avg) {
            (Some(a), Some(s)) => Some((a - s) / s.max(1.0)),
            _ => None,
        },
    );
}

fn write_platform(w: &mut SlotWriter, platform: &PlatformId, enrichments: &Enrichments) {
    let stats = enrichments.get(platform).map(|s| &s.value);
    let positive = |v: Option<f64>| v.filter(|p| *p > 0.0);
    let fields = [
        ("listing_count", stats.and_then(|s| s.listing_count).map(f64::from)),
        ("min_price", positive(stats.and_then(|s| s.min_price))),
        ("avg_price", positive(stats.and_then(|s| s.avg_price))),
        ("median_price", positive(stats.and_then(|s| s.median_price))),
        ("sold_count", stats.and_then(|s| s.sold_count).map(f64::from)),
        ("sold_avg_price", positive(stats.and_then(|s| s.sold_avg_price))),
    ];
    for (suffix, value) in fields {
        w.set(&platform_slot(platform, suffix), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isbn::Isbn13;
    use crate::record::{
        BookMetadata, ItemAttributes, MarketStats, PlatformStats, Snapshot, VendorQuote,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap()
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::standard(&[
            PlatformId::new("abebooks"),
            PlatformId::new("bookfinder"),
        ]))
    }

    fn bare_item() -> ItemRecord {
        ItemRecord::new(Isbn13::parse("9780316018043").unwrap(), ItemAttributes::default())
    }

    #[test]
    fn registry_holds_unified_and_specialists() {
        let reg = registry();
        let versions: Vec<&str> = reg.versions().collect();
        assert_eq!(versions, vec!["abebooks-v1", "bookfinder-v1", "unified-v1"]);
        assert_eq!(
            reg.unified().unwrap().len(),
            BASE_SLOTS.len() + 2 * PLATFORM_SLOT_SUFFIXES.len()
        );
        assert_eq!(
            reg.get("abebooks-v1").unwrap().len(),
            BASE_SLOTS.len() + PLATFORM_SLOT_SUFFIXES.len()
        );
        assert!(matches!(reg.get("unified-v9"), Err(CoreError::UnknownSchema(_))));
    }

    #[test]
    fn bare_item_is_mostly_sentinel() {
        let asm = FeatureAssembler::new(registry());
        let fv = asm
            .assemble(&bare_item(), &Enrichments::new(), UNIFIED_SCHEMA, now())
            .unwrap();

        assert_eq!(fv.len(), asm.registry().unified().unwrap().len());
        assert!(fv.is_sentinel("page_count"));
        assert!(fv.is_sentinel("abebooks_avg_price"));
        assert_eq!(fv.get("page_count"), Some(SENTINEL));
        // Condition is always known.
        assert_eq!(fv.available("is_good"), Some(1.0));
        assert_eq!(fv.available("is_new"), Some(0.0));
        assert!(!fv.any_available(EVIDENCE_SLOTS));
        assert!(fv.completeness() < 0.2);
    }

    #[test]
    fn populated_fields_are_marked_available() {
        let item = bare_item()
            .with_market(Snapshot::new(
                MarketStats {
                    sold_count: Some(10),
                    sold_avg_price: Some(12.0),
                    active_count: Some(5),
                    active_median_price: Some(15.0),
                    amazon_sales_rank: Some(50_000),
                    ..Default::default()
                },
                now(),
            ))
            .with_vendor(Snapshot::new(
                VendorQuote {
                    best_offer: Some(3.25),
                    ..Default::default()
                },
                now(),
            ))
            .with_metadata(Snapshot::new(
                BookMetadata {
                    page_count: Some(320),
                    published_year: Some(2016),
                    categories: Some(vec!["Fiction / Thrillers".into()]),
                    ..Default::default()
                },
                now(),
            ));

        let fv = FeatureAssembler::new(registry())
            .assemble(&item, &Enrichments::new(), UNIFIED_SCHEMA, now())
            .unwrap();

        assert_eq!(fv.available("page_count"), Some(320.0));
        assert_eq!(fv.available("age_years"), Some(10.0));
        assert_eq!(fv.available("vendor_best_offer"), Some(3.25));
        assert_eq!(fv.available("is_fiction"), Some(1.0));
        assert_eq!(fv.available("is_textbook"), Some(0.0));
        assert_eq!(fv.available("competition_ratio"), Some(0.5));
        let velocity = fv.available("price_velocity").unwrap();
        assert!((velocity - 0.25).abs() < 1e-6);
        assert!(fv.available("demand_score").is_some());
    }

    #[test]
    fn specialist_schema_only_carries_its_platform() {
        let mut enrichments = Enrichments::new();
        enrichments.insert(
            PlatformId::new("abebooks"),
            Snapshot::new(
                PlatformStats {
                    listing_count: Some(14),
                    avg_price: Some(8.4),
                    ..Default::default()
                },
                now(),
            ),
        );
        let fv = FeatureAssembler::new(registry())
            .assemble(&bare_item(), &enrichments, "abebooks-v1", now())
            .unwrap();

        assert_eq!(fv.schema(), "abebooks-v1");
        assert!((fv.available("abebooks_avg_price").unwrap() - 8.4).abs() < 1e-6);
        assert_eq!(fv.get("bookfinder_avg_price"), None);
        assert!(fv.any_positive(&["abebooks_min_price", "abebooks_avg_price"]));
    }

    #[test]
    fn assembly_is_deterministic() {
        let asm = FeatureAssembler::new(registry());
        let a = asm
            .assemble(&bare_item(), &Enrichments::new(), UNIFIED_SCHEMA, now())
            .unwrap();
        let b = asm
            .assemble(&bare_item(), &Enrichments::new(), UNIFIED_SCHEMA, now())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let schema = registry().unified().unwrap();
        let err = FeatureVector::from_parts(schema, vec![0.0; 3], vec![true; 3]).unwrap_err();
        assert!(matches!(err, CoreError::VectorLength { expected, found: 3, .. } if expected > 3));
    }

    #[test]
    fn check_rejects_other_schema() {
        let reg = registry();
        let fv = FeatureAssembler::new(reg.clone())
            .assemble(&bare_item(), &Enrichments::new(), "abebooks-v1", now())
            .unwrap();
        let err = fv.check(&reg.unified().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn unknown_schema_surfaces_as_error() {
        let err = FeatureAssembler::new(registry())
            .assemble(&bare_item(), &Enrichments::new(), "amazon-v1", now())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownSchema(_)));
    }

    #[test]
    fn serialised_vector_binds_back_to_its_schema() {
        let reg = registry();
        let item = bare_item().with_vendor(Snapshot::new(
            VendorQuote {
                best_offer: Some(4.5),
                ..Default::default()
            },
            now(),
        ));
        let fv = FeatureAssembler::new(reg.clone())
            .assemble(&item, &Enrichments::new(), UNIFIED_SCHEMA, now())
            .unwrap();

        let json = serde_json::to_string(&fv).unwrap();
        let parts: FeatureVectorParts = serde_json::from_str(&json).unwrap();
        let back = parts.bind(&reg).unwrap();
        assert_eq!(back, fv);
        assert_eq!(back.available("vendor_best_offer"), Some(4.5));
        assert_eq!(back.platforms().len(), 2);
    }

    #[test]
    fn short_sentinel_list_is_rejected() {
        let reg = registry();
        let len = reg.unified().unwrap().len();
        let json = serde_json::json!({
            "schema": UNIFIED_SCHEMA,
            "values": vec![0.0_f32; len],
            "sentinel": [],
        });
        let parts: FeatureVectorParts = serde_json::from_value(json).unwrap();
        let err = parts.bind(&reg).unwrap_err();
        assert!(matches!(
            err,
            CoreError::VectorLength { found: 0, expected, .. } if expected == len
        ));
    }

    #[test]
    fn unknown_version_does_not_bind() {
        let parts = FeatureVectorParts {
            schema: "unified-v9".into(),
            values: Vec::new(),
            sentinel: Vec::new(),
        };
        assert!(matches!(
            parts.bind(&registry()),
            Err(CoreError::UnknownSchema(_))
        ));
    }
}
