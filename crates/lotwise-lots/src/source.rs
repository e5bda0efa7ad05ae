//! Comp sources: where already-fetched lot listings come from.
//!
//! The engine never fetches. A caller hands it a [`LotCompSource`] holding
//! listings gathered per search scope by whatever collector it runs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pricing::LotListing;

/// How a lot's members were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStrategy {
    Series,
    Author,
    /// Low-value books bundled together; never priced against lot comps.
    Value,
}

impl LotStrategy {
    pub const ALL: [LotStrategy; 3] = [LotStrategy::Series, LotStrategy::Author, LotStrategy::Value];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Author => "author",
            Self::Value => "value",
        }
    }

    /// Whether lot comps exist for this kind of grouping.
    pub fn uses_lot_comps(&self) -> bool {
        matches!(self, Self::Series | Self::Author)
    }
}

impl fmt::Display for LotStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LotStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "series" => Ok(Self::Series),
            "author" => Ok(Self::Author),
            "value" => Ok(Self::Value),
            other => Err(format!("unknown lot strategy: {other}")),
        }
    }
}

/// The market segment a lot is priced against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchScope {
    pub strategy: LotStrategy,
    /// Series name or canonical author.
    pub label: String,
}

impl SearchScope {
    pub fn new(strategy: LotStrategy, label: impl Into<String>) -> Self {
        Self {
            strategy,
            label: label.into(),
        }
    }

    /// Marketplace search phrase for collectors.
    pub fn query(&self) -> String {
        match self.strategy {
            LotStrategy::Series => format!("\"{}\" lot", self.label),
            LotStrategy::Author => format!("{} book lot", self.label),
            LotStrategy::Value => format!("{} book lot", self.label),
        }
    }

    fn key(&self) -> (LotStrategy, String) {
        (self.strategy, normalize_label(&self.label))
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.strategy, self.label)
    }
}

fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `"Patterson, James"` → `"James Patterson"`; whitespace collapsed.
pub fn canonical_author(name: &str) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    match name.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() && !last.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => name.trim_matches(',').trim().to_string(),
    }
}

/// Lot listings for a scope. An unknown scope yields no listings.
pub trait LotCompSource: Send + Sync {
    fn comps(&self, scope: &SearchScope) -> Vec<LotListing>;
}

/// No comps for any scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComps;

impl LotCompSource for NoComps {
    fn comps(&self, _scope: &SearchScope) -> Vec<LotListing> {
        Vec::new()
    }
}

/// In-memory listings keyed by scope. Labels match case- and
/// whitespace-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticCompSource {
    listings: HashMap<(LotStrategy, String), Vec<LotListing>>,
}

/// One scope's listings as stored on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopedListings {
    pub strategy: LotStrategy,
    pub label: String,
    pub listings: Vec<LotListing>,
}

impl StaticCompSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope: &SearchScope, listings: impl IntoIterator<Item = LotListing>) {
        self.listings.entry(scope.key()).or_default().extend(listings);
    }

    pub fn with(mut self, scope: SearchScope, listings: Vec<LotListing>) -> Self {
        self.insert(&scope, listings);
        self
    }

    pub fn len(&self) -> usize {
        self.listings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<ScopedListings> for StaticCompSource {
    fn from_iter<I: IntoIterator<Item = ScopedListings>>(iter: I) -> Self {
        let mut source = Self::new();
        for entry in iter {
            source.insert(&SearchScope::new(entry.strategy, entry.label), entry.listings);
        }
        source
    }
}

impl LotCompSource for StaticCompSource {
    fn comps(&self, scope: &SearchScope) -> Vec<LotListing> {
        self.listings.get(&scope.key()).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotwise_core::Money;

    fn listing(title: &str, dollars: f64) -> LotListing {
        LotListing {
            title: title.into(),
            total_price: Money::from_dollars(dollars),
            currency: "USD".into(),
        }
    }

    #[test]
    fn queries_use_marketplace_phrasing() {
        assert_eq!(
            SearchScope::new(LotStrategy::Series, "Alex Cross").query(),
            "\"Alex Cross\" lot"
        );
        assert_eq!(
            SearchScope::new(LotStrategy::Author, "James Patterson").query(),
            "James Patterson book lot"
        );
    }

    #[test]
    fn author_names_are_canonicalised() {
        assert_eq!(canonical_author("Patterson, James"), "James Patterson");
        assert_eq!(canonical_author("  James   Patterson "), "James Patterson");
        assert_eq!(canonical_author("Madonna,"), "Madonna");
    }

    #[test]
    fn static_source_matches_loosely() {
        let source = StaticCompSource::new().with(
            SearchScope::new(LotStrategy::Series, "Alex Cross"),
            vec![listing("Lot of 7", 28.0)],
        );
        assert_eq!(source.comps(&SearchScope::new(LotStrategy::Series, " alex  CROSS")).len(), 1);
        assert!(source.comps(&SearchScope::new(LotStrategy::Author, "Alex Cross")).is_empty());
        assert!(NoComps.comps(&SearchScope::new(LotStrategy::Series, "x")).is_empty());
    }

    #[test]
    fn scoped_listings_deserialise_from_json() {
        let json = r#"[{"strategy": "author", "label": "Lee Child",
            "listings": [{"title": "Lot of 9 Jack Reacher", "total_price": 45.0}]}]"#;
        let entries: Vec<ScopedListings> = serde_json::from_str(json).unwrap();
        let source: StaticCompSource = entries.into_iter().collect();
        let comps = source.comps(&SearchScope::new(LotStrategy::Author, "lee child"));
        assert_eq!(comps[0].currency, "USD");
        assert_eq!(comps[0].total_price, Money::from_cents(4500));
    }

    #[test]
    fn strategies_parse() {
        assert_eq!("Series".parse::<LotStrategy>(), Ok(LotStrategy::Series));
        assert!("genre".parse::<LotStrategy>().is_err());
    }
}
