//! Lot planner: propose lots from a shelf of books on hand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lotwise_core::Money;
use rayon::prelude::*;

use crate::bundling::{BundlingEngine, LotMember, LotSuggestion, Priced};
use crate::error::LotError;
use crate::source::{canonical_author, LotStrategy};

const MIN_GROUP: usize = 2;

/// Group `books` by each requested strategy and price every group of two or
/// more. Each book is priced individually once.
///
/// Suggestions are ranked by chosen value, then member count, highest first.
pub fn plan_lots(
    engine: &BundlingEngine<'_>,
    books: &[LotMember],
    strategies: &[LotStrategy],
    now: DateTime<Utc>,
) -> Result<Vec<LotSuggestion>, LotError> {
    if books.is_empty() {
        return Ok(Vec::new());
    }
    let priced = engine.price_members(books, now)?;
    let threshold = Money::from_dollars(engine.config().value_bundle_threshold);

    let mut groups: Vec<(LotStrategy, Vec<usize>)> = Vec::new();
    for strategy in strategies {
        match strategy {
            LotStrategy::Series => groups.extend(
                group_by(&priced, |p| {
                    let meta = p.member.item.book_metadata()?;
                    let name = meta.series_name.as_deref()?.trim();
                    (!name.is_empty()).then(|| name.to_lowercase())
                })
                .into_iter()
                .map(|idx| (LotStrategy::Series, idx)),
            ),
            LotStrategy::Author => groups.extend(
                group_by(&priced, |p| {
                    let author = canonical_author(p.member.item.book_metadata()?.primary_author()?);
                    (!author.is_empty()).then(|| author.to_lowercase())
                })
                .into_iter()
                .map(|idx| (LotStrategy::Author, idx)),
            ),
            LotStrategy::Value => {
                let cheap: Vec<usize> = priced
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.estimate.value < threshold)
                    .map(|(i, _)| i)
                    .collect();
                if cheap.len() >= MIN_GROUP {
                    groups.push((LotStrategy::Value, cheap));
                }
            }
        }
    }

    let mut suggestions: Vec<LotSuggestion> = groups
        .par_iter()
        .map(|(strategy, idx)| {
            let members: Vec<Priced<'_>> = idx.iter().map(|&i| priced[i].clone()).collect();
            engine.build(&members, *strategy)
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.chosen_value()
            .cmp(&a.chosen_value())
            .then_with(|| b.members().len().cmp(&a.members().len()))
    });
    engine.log_plan(&suggestions);
    Ok(suggestions)
}

/// Indices grouped by key, groups below the minimum size dropped.
fn group_by<F>(priced: &[Priced<'_>], key: F) -> Vec<Vec<usize>>
where
    F: Fn(&Priced<'_>) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, p) in priced.iter().enumerate() {
        if let Some(k) = key(p) {
            groups.entry(k).or_default().push(i);
        }
    }
    groups
        .into_values()
        .filter(|g| g.len() >= MIN_GROUP)
        .collect()
}
