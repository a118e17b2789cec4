use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Year-over-year change between two amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub absolute: Decimal,
    /// Percent of the prior amount. Zero whenever the prior amount is zero.
    pub percent: Decimal,
}

/// `current - prior`, and that difference as a percent of `prior`.
///
/// A zero prior amount yields a zero percent rather than an infinite one;
/// callers rely on this and must not special-case it. Results too large for a
/// `Decimal` saturate at `Decimal::MAX` / `Decimal::MIN`.
pub fn delta(prior: Decimal, current: Decimal) -> Change {
    let absolute = current.saturating_sub(prior);
    let percent = if prior.is_zero() {
        Decimal::ZERO
    } else {
        absolute
            .checked_div(prior)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or_else(|| saturated(absolute.is_sign_negative() != prior.is_sign_negative()))
    };
    Change { absolute, percent }
}

fn saturated(negative: bool) -> Decimal {
    if negative {
        Decimal::MIN
    } else {
        Decimal::MAX
    }
}
