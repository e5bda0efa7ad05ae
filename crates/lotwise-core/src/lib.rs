pub mod config;
pub mod error;
pub mod estimate;
pub mod features;
pub mod freshness;
pub mod isbn;
pub mod money;
pub mod record;
pub mod schema;

pub use config::{EngineConfig, GeneralistGate, HeuristicConfig, LotConfig, RoutingConfig};
pub use error::CoreError;
pub use estimate::{Confidence, PriceEstimate, RawScore, Reason, ScorerTier, SourceTag};
pub use features::{
    FeatureAssembler, FeatureSchema, FeatureVector, FeatureVectorParts, SchemaRegistry,
};
pub use freshness::{Freshness, FreshnessConfig, FreshnessIndex, FreshnessReport};
pub use isbn::Isbn13;
pub use money::{Delta, Money};
pub use record::{
    Binding, BookMetadata, ConditionGrade, Domain, Enrichments, ItemAttributes, ItemRecord,
    MarketStats, PlatformId, PlatformStats, Snapshot, VendorQuote,
};
pub use schema::export;
