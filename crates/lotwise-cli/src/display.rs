//! Plain-text cards and tables for the terminal.

use lotwise_ai::RoutingStats;
use lotwise_core::{FreshnessReport, Isbn13, PriceEstimate};
use lotwise_lots::{LotPricingTable, LotSuggestion};

const MAX_LIST_ITEMS: usize = 10;
const MAX_TITLE: usize = 60;

// ── Estimates ──

pub fn print_estimate_card(isbn: &Isbn13, estimate: &PriceEstimate) {
    println!("=== {isbn} ===");
    println!("  {:<14} {}", "value", estimate.value);
    println!("  {:<14} {}", "source", estimate.source);
    println!("  {:<14} {}", "confidence", estimate.confidence);
    if estimate.rationale.is_empty() {
        return;
    }
    println!();
    println!("Rationale");
    for reason in estimate.rationale.iter().take(MAX_LIST_ITEMS) {
        println!("  {:<40} {:>+9.2}", truncate(&reason.text, 40), reason.weight);
    }
    if estimate.rationale.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", estimate.rationale.len() - MAX_LIST_ITEMS);
    }
}

pub fn print_routing_stats(stats: &RoutingStats) {
    println!("Routing ({} scored, {} fallthroughs)", stats.total, stats.fallthroughs);
    for (tier, n, pct) in [
        ("specialist", stats.specialist, stats.specialist_pct),
        ("generalist", stats.generalist, stats.generalist_pct),
        ("heuristic", stats.heuristic, stats.heuristic_pct),
    ] {
        println!("  {tier:<14} {n:>6}  {pct:>6.2}%");
    }
}

// ── Freshness ──

pub fn print_freshness(isbn: &Isbn13, report: &FreshnessReport) {
    println!("=== {isbn} ===");
    for entry in &report.entries {
        let age = match entry.age_days {
            Some(days) => format!("{days}d"),
            None => "-".to_string(),
        };
        println!(
            "  {:<22} {:<8} {:>6}  {}",
            entry.source.label(),
            entry.domain.as_str(),
            age,
            entry.freshness.as_str()
        );
    }
    if report.all_fresh() {
        println!("  all inputs fresh");
    }
}

// ── Lots ──

pub fn print_lot_sizes(rows: &[(&str, Option<u32>, bool)]) {
    for (title, size, is_lot) in rows {
        let size = size.map_or_else(|| "-".to_string(), |n| n.to_string());
        let flag = if *is_lot { "lot" } else { "" };
        println!("  {size:>4}  {flag:<4} {}", truncate(title, MAX_TITLE));
    }
}

pub fn print_pricing_table(table: &LotPricingTable) {
    println!(
        "Lot comps: {} total, {} used, {} unresolved, {} other currency",
        table.total_comps, table.used_comps, table.unresolved_comps, table.other_currency_comps
    );
    if table.is_empty() {
        println!("  no comp resolved to a lot size");
        return;
    }
    println!("  {:>4}  {:>4}  {:>9}  {:>9}  {:>9}", "size", "n", "mean", "min", "max");
    for bucket in table.buckets() {
        let marker = if Some(bucket.size) == table.optimal_size() {
            "  <- best"
        } else if bucket.low_confidence {
            "  (sparse)"
        } else {
            ""
        };
        println!(
            "  {:>4}  {:>4}  {:>9.2}  {:>9.2}  {:>9.2}{marker}",
            bucket.size,
            bucket.per_book_prices.len(),
            bucket.mean,
            bucket.min,
            bucket.max
        );
    }
}

pub fn print_suggestion(s: &LotSuggestion) {
    let heading = match s.scope() {
        Some(scope) => format!("{} lot: {}", s.strategy(), scope.label),
        None => format!("{} lot", s.strategy()),
    };
    println!("=== {heading} ({} books) ===", s.members().len());
    println!("  {:<18} {} ({})", "chosen", s.chosen_value(), s.basis());
    println!("  {:<18} {}", "individual", s.individual_value());
    if let Some(lot) = s.lot_value() {
        println!("  {:<18} {}", "lot", lot);
    }
    if let (Some(size), Some(per_book)) = (s.optimal_lot_size(), s.per_book_price()) {
        let sparse = if s.low_confidence() { ", sparse" } else { "" };
        println!(
            "  {:<18} {} at {}/book ({} of {} comps{sparse})",
            "best lot size",
            size,
            per_book,
            s.optimal_size_comps(),
            s.lot_comps_used()
        );
    }
    if let Some(scope) = s.scope() {
        println!("  {:<18} {}", "search", scope.query());
    }
    println!("  {}", s.justification());

    println!("  Members:");
    for (isbn, estimate) in s
        .members()
        .iter()
        .zip(s.member_estimates())
        .take(MAX_LIST_ITEMS)
    {
        println!("    {isbn}  {:>10}  {}", estimate.value.to_string(), estimate.source);
    }
    if s.members().len() > MAX_LIST_ITEMS {
        println!("    ... and {} more", s.members().len() - MAX_LIST_ITEMS);
    }
    println!();
}

// ── Helpers ──

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Café Lot of Twelve", 8), "Café ...");
    }
}
