//! Lot detection, per-size lot pricing, and bundling suggestions for books on
//! hand. Listings are supplied by the caller; nothing here fetches.

pub mod bundling;
pub mod error;
pub mod lot_size;
pub mod planner;
pub mod pricing;
pub mod source;

pub use bundling::{BundlingEngine, ItemPricer, LotMember, LotSuggestion, PricingBasis};
pub use error::LotError;
pub use lot_size::{infer_lot_size, looks_like_lot, LotSizeInference};
pub use planner::plan_lots;
pub use pricing::{aggregate, price_listings, AggregateOptions, LotComp, LotListing, LotPricingTable};
pub use source::{
    canonical_author, LotCompSource, LotStrategy, NoComps, ScopedListings, SearchScope,
    StaticCompSource,
};
