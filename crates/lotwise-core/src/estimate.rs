//! Price estimates and their confidence scale.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::record::PlatformId;

/// Ordinal confidence. Not a probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Minimal,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Confidence {
    const LADDER: [Confidence; 5] = [
        Self::Minimal,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::VeryHigh,
    ];

    fn rank(self) -> usize {
        self as usize
    }

    /// One level up, saturating at `VeryHigh`.
    pub fn raise(self) -> Self {
        Self::LADDER[(self.rank() + 1).min(Self::LADDER.len() - 1)]
    }

    /// One level down, saturating at `Minimal`.
    pub fn lower(self) -> Self {
        Self::LADDER[self.rank().saturating_sub(1)]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which routing tier produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerTier {
    Specialist,
    Generalist,
    Heuristic,
}

impl ScorerTier {
    pub const ALL: [ScorerTier; 3] = [Self::Specialist, Self::Generalist, Self::Heuristic];

    /// Confidence before freshness adjustment.
    pub fn base_confidence(&self) -> Confidence {
        match self {
            Self::Specialist => Confidence::High,
            Self::Generalist => Confidence::Medium,
            Self::Heuristic => Confidence::Minimal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specialist => "specialist",
            Self::Generalist => "generalist",
            Self::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for ScorerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier plus the concrete scorer behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTag {
    pub tier: ScorerTier,
    /// Set for specialists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformId>,
    /// Model name, or `heuristic`.
    pub model: String,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.platform {
            Some(p) => write!(f, "{}:{p} ({})", self.tier, self.model),
            None => write!(f, "{} ({})", self.tier, self.model),
        }
    }
}

/// One contribution to an estimate. `weight` is signed, in dollars where the
/// scorer can attribute one, otherwise a relative magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub text: String,
    pub weight: f64,
}

impl Reason {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// What a scorer returns before routing metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScore {
    pub dollars: f64,
    pub reasons: Vec<Reason>,
}

/// A routed price for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub value: Money,
    pub source: SourceTag,
    pub confidence: Confidence,
    /// Ordered by contribution magnitude, largest first.
    pub rationale: Vec<Reason>,
}

impl PriceEstimate {
    pub fn new(
        value: Money,
        source: SourceTag,
        confidence: Confidence,
        mut rationale: Vec<Reason>,
    ) -> Self {
        sort_by_magnitude(&mut rationale);
        Self {
            value,
            source,
            confidence,
            rationale,
        }
    }

    pub fn tier(&self) -> ScorerTier {
        self.source.tier
    }
}

/// Stable sort, largest absolute weight first.
pub fn sort_by_magnitude(reasons: &mut [Reason]) {
    reasons.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
}
