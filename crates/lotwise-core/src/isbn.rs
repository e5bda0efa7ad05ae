//! ISBN normalisation to the canonical 13-digit form.
//!
//! Accepts ISBN-13, bare 12-digit prefixes, ISBN-10 and 9-digit SBNs. Hyphens,
//! spaces and other punctuation are ignored. A wrong check digit is recomputed
//! rather than rejected, since scanners and vendor feeds frequently mangle it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A normalised 13-digit ISBN. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn13(String);

impl Isbn13 {
    /// Normalise any accepted ISBN spelling into its 13-digit form.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        coerce(&cleaned)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidIsbn(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn13 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isbn13 {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isbn13> for String {
    fn from(isbn: Isbn13) -> Self {
        isbn.0
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn coerce(cleaned: &str) -> Option<String> {
    match cleaned.len() {
        13 if all_digits(cleaned) => Some(with_isbn13_check(&cleaned[..12])),
        12 if all_digits(cleaned) => Some(with_isbn13_check(cleaned)),
        10 if all_digits(&cleaned[..9]) => Some(isbn10_core_to_isbn13(&cleaned[..9])),
        // SBN: a 9-character ISBN-10 missing its leading zero.
        9 if all_digits(&cleaned[..8]) => {
            let core = format!("0{}", &cleaned[..8]);
            Some(isbn10_core_to_isbn13(&core))
        }
        _ => None,
    }
}

fn isbn10_core_to_isbn13(core: &str) -> String {
    with_isbn13_check(&format!("978{core}"))
}

fn with_isbn13_check(prefix: &str) -> String {
    format!("{prefix}{}", isbn13_check_digit(prefix))
}

/// Check digit over a 12-digit prefix (alternating weights 1 and 3).
fn isbn13_check_digit(prefix: &str) -> u32 {
    let total: u32 = prefix
        .bytes()
        .enumerate()
        .map(|(idx, b)| {
            let digit = u32::from(b - b'0');
            if idx % 2 == 1 { digit * 3 } else { digit }
        })
        .sum();
    (10 - total % 10) % 10
}
