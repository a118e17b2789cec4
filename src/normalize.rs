//! Cell normalization: amounts out of spreadsheet text and display labels out of
//! free-text classification cells.

use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sentinel label for rows whose classification is missing or unmapped.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Largest magnitude accepted for a single cell (one quadrillion). Totals over
/// any number of such cells stay far below `Decimal::MAX`.
pub const AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

/// Parses a spreadsheet amount such as `"$1,234.50"` or `"-2,000"`.
///
/// Blank cells are `Some(0)`. Returns `None` when the text is present but is
/// not a number once the currency symbol and thousands separators are removed,
/// or when its magnitude exceeds [`AMOUNT_LIMIT`].
pub fn try_parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Decimal::ZERO);
    }

    let (mut negative, rest) = split_sign(trimmed);
    let rest = match rest.strip_prefix('$') {
        Some(after_symbol) => {
            // "$-1,000" is as common in exports as "-$1,000"
            if negative {
                after_symbol
            } else {
                let (inner_negative, inner) = split_sign(after_symbol);
                negative = inner_negative;
                inner
            }
        }
        None => rest,
    };

    let digits: String = rest.chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value = Decimal::from_str(&digits).ok()?;
    if value > Decimal::from(AMOUNT_LIMIT) {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Parses an amount, counting anything unparseable as zero. Never fails.
pub fn parse_amount(raw: &str) -> Decimal {
    try_parse_amount(raw).unwrap_or(Decimal::ZERO)
}

fn split_sign(text: &str) -> (bool, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        (true, rest.trim_start())
    } else if let Some(rest) = text.strip_prefix('+') {
        (false, rest.trim_start())
    } else {
        (false, text)
    }
}

/// Lower-cases the text, then upper-cases every letter that starts a word.
///
/// A letter starts a word when it is the first character or follows a
/// non-letter, so `"PUBLIC SAFETY"` becomes `"Public Safety"` and
/// `"o'brien-smith"` becomes `"O'Brien-Smith"`.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut after_letter = false;

    for ch in raw.chars() {
        if ch.is_alphabetic() {
            if after_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            after_letter = true;
        } else {
            out.push(ch);
            after_letter = false;
        }
    }

    out
}

/// How a classification label is rendered after it is read from a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Casing {
    /// Keep the cell text as published (trimmed).
    #[default]
    Preserve,
    /// Apply [`title_case`].
    Title,
}

impl Casing {
    pub fn apply(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Casing::Preserve => trimmed.to_string(),
            Casing::Title => title_case(trimmed),
        }
    }

    /// Like [`Casing::apply`], but blank or absent text becomes [`UNKNOWN_LABEL`].
    pub fn label_or_unknown(self, raw: Option<&str>) -> String {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => self.apply(text),
            None => UNKNOWN_LABEL.to_string(),
        }
    }
}
