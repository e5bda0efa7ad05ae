//! Lot size inference from free-text listing titles.
//!
//! Pattern classes are tried in order and the first class with a usable
//! match wins:
//!
//! 1. cardinal forms: `Lot of 7`, `Set of 7 Books`, `7 Book Lot`,
//!    `Complete Set 7`, `Lot 7`, `Qty 7`, `7 pcs`
//! 2. ordinal-then-size forms: `Lot 1st 12`, `Lot First 12` (ordinal dropped)
//! 3. bare `#7`, only inside a plausibility window
//!
//! A size below 2 or above 200 is never a lot, so years and catalogue
//! numbers ("Set 1984") fall through. `None` means "exclude from aggregation".

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use lotwise_core::LotConfig;
use regex::Regex;

/// Default plausibility window for bare `#N` markers.
pub const DEFAULT_HASH_WINDOW: RangeInclusive<u32> = 2..=60;

const MIN_LOT_SIZE: u32 = 2;
/// Largest size a cardinal or ordinal phrase may assert.
pub const MAX_LOT_SIZE: u32 = 200;

static CARDINAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:lot|set)\s*[-:]?\s*of\s*(\d+)\b",
        r"(?i)\b(?:complete|full|entire)\s+set\s*[-:]?\s*(?:of\s*)?(\d+)\b",
        r"(?i)\b(\d+)\s*-?\s*(?:books?|novels?|paperbacks?|hardcovers?)\b",
        r"(?i)\b(?:lot|set)\s*[-:]?\s*(\d+)\b",
        r"(?i)\b(?:qty|quantity)\s*[-:]?\s*(\d+)\b",
        r"(?i)\b(\d+)\s*(?:pcs?|pieces?)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:lot|set)\s+(?:first|second|third|fourth|fifth|\d+(?:st|nd|rd|th))\s+(\d+)\b",
    )
    .unwrap()
});

static HASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\s*(\d+)\b").unwrap());

/// Keywords marking a multi-book listing. `" lot "` is space-bounded so
/// "slot" and "ballot" don't match.
const LOT_KEYWORDS: &[&str] = &[
    "lot of",
    "set of",
    "bundle",
    "collection",
    "complete set",
    "full set",
    "entire set",
    "book lot",
    "novel lot",
    "books lot",
    "paperback lot",
    "hardcover lot",
    "mixed lot",
    " lot ",
    "lot-",
    "-lot",
    "(lot)",
    "[lot]",
    "qty",
    "quantity",
    "bulk",
    "wholesale",
    "complete series",
    "full series",
    "entire series",
    "resell lot",
    "library sale",
];

/// Lot size parser with a configurable `#N` window.
#[derive(Debug, Clone)]
pub struct LotSizeInference {
    hash_window: RangeInclusive<u32>,
}

impl Default for LotSizeInference {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_WINDOW)
    }
}

impl LotSizeInference {
    pub fn new(hash_window: RangeInclusive<u32>) -> Self {
        Self { hash_window }
    }

    pub fn from_config(config: &LotConfig) -> Self {
        Self::new(config.hash_size_min..=config.hash_size_max)
    }

    pub fn infer(&self, title: &str) -> Option<u32> {
        let plausible = |n: u32| n <= MAX_LOT_SIZE;
        first_size(CARDINAL.iter(), title, plausible)
            .or_else(|| first_size(std::iter::once(&*ORDINAL), title, plausible))
            .or_else(|| first_size(std::iter::once(&*HASH), title, |n| self.hash_window.contains(&n)))
    }
}

/// First capture across `patterns` (in order) that parses to a plausible size.
fn first_size<'a>(
    patterns: impl Iterator<Item = &'a Regex>,
    title: &str,
    accept: impl Fn(u32) -> bool,
) -> Option<u32> {
    for re in patterns {
        for caps in re.captures_iter(title) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok())
                && n >= MIN_LOT_SIZE
                && accept(n)
            {
                return Some(n);
            }
        }
    }
    None
}

/// Lot size with the default `#N` window.
pub fn infer_lot_size(title: &str) -> Option<u32> {
    LotSizeInference::default().infer(title)
}

/// Whether a title reads as a multi-book listing, sized or not.
pub fn looks_like_lot(title: &str) -> bool {
    let padded = format!(" {} ", title.to_lowercase());
    LOT_KEYWORDS.iter().any(|k| padded.contains(k)) || infer_lot_size(title).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_before_size() {
        assert_eq!(infer_lot_size("James Patterson Lot 1st 12 Alex Cross Novels"), Some(12));
        assert_eq!(infer_lot_size("Lot First 12 Hardcovers"), Some(12));
        assert_eq!(infer_lot_size("set 3rd 5"), Some(5));
    }

    #[test]
    fn cardinal_forms() {
        assert_eq!(infer_lot_size("Lot of 7"), Some(7));
        assert_eq!(infer_lot_size("Set of 7 Books"), Some(7));
        assert_eq!(infer_lot_size("7 Book Lot Harry Potter"), Some(7));
        assert_eq!(infer_lot_size("Complete Set 7"), Some(7));
        assert_eq!(infer_lot_size("Jack Reacher Lot 9 Hardcover"), Some(9));
        assert_eq!(infer_lot_size("Qty: 5 Louis L'Amour westerns"), Some(5));
        assert_eq!(infer_lot_size("Harry Potter 4 pcs"), Some(4));
        assert_eq!(infer_lot_size("Bundle: 3 Novels"), Some(3));
        assert_eq!(infer_lot_size("lot-6 mysteries"), Some(6));
    }

    #[test]
    fn no_markers_is_none() {
        assert_eq!(infer_lot_size("Alex Cross Collection"), None);
        assert_eq!(infer_lot_size("Harry Potter and the Sorcerer's Stone"), None);
        assert_eq!(infer_lot_size(""), None);
    }

    #[test]
    fn sizes_below_two_never_resolve() {
        assert_eq!(infer_lot_size("Lot of 1"), None);
        assert_eq!(infer_lot_size("1 book"), None);
        assert_eq!(infer_lot_size("Lot of 0 #0"), None);
    }

    #[test]
    fn hash_marker_respects_window() {
        assert_eq!(infer_lot_size("Alex Cross #7"), Some(7));
        assert_eq!(infer_lot_size("Vintage catalog #1234"), None);
        assert_eq!(infer_lot_size("Issue #61"), None);
        assert_eq!(infer_lot_size("Issue #60"), Some(60));

        let wide = LotSizeInference::new(2..=2000);
        assert_eq!(wide.infer("Vintage catalog #1234"), Some(1234));
    }

    #[test]
    fn years_are_not_lot_sizes() {
        assert_eq!(infer_lot_size("Set 1984 Orwell"), None);
        assert_eq!(infer_lot_size("Lot 2023 Edition Paperbacks"), None);
        assert_eq!(infer_lot_size("Set 1984 Orwell Lot of 3"), Some(3));
        assert_eq!(infer_lot_size("Lot of 200"), Some(200));
        assert_eq!(infer_lot_size("Lot of 201"), None);
    }

    #[test]
    fn cardinal_wins_over_hash() {
        assert_eq!(infer_lot_size("Alex Cross #1-#12 Lot of 12"), Some(12));
    }

    #[test]
    fn huge_numbers_do_not_panic() {
        assert_eq!(infer_lot_size("lot of 99999999999999999999"), None);
    }

    #[test]
    fn lot_detection() {
        assert!(looks_like_lot("Harry Potter Lot of 5 Books"));
        assert!(looks_like_lot("Alex Cross Collection"));
        assert!(looks_like_lot("10 Book Lot"));
        assert!(looks_like_lot("Series Complete Set"));
        assert!(looks_like_lot("Lot 3 westerns"));
        assert!(!looks_like_lot("The Slot Machine Book"));
        assert!(!looks_like_lot("Ballot Book"));
        assert!(!looks_like_lot("First Edition"));
        assert!(!looks_like_lot("Harry Potter and the Sorcerer's Stone"));
    }
}
