use rust_decimal::{Decimal, RoundingStrategy};

const UNITS: [(i64, &str); 3] = [
    (1_000, "K"),
    (1_000_000, "M"),
    (1_000_000_000, "B"),
];

fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

fn sign(value: Decimal) -> &'static str {
    if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    }
}

/// Short dollar form for tiles and chart labels: `$1.5M`, `$12.0K`, `$950`.
///
/// One decimal above a thousand, whole dollars below it. A value that rounds
/// up to the next unit is shown in that unit (`$1.0M`, not `$1000.0K`).
pub fn abbreviate(amount: Decimal) -> String {
    let magnitude = amount.abs();

    let whole = round_half_up(magnitude, 0);
    if whole < Decimal::ONE_THOUSAND {
        let sign = if whole.is_zero() { "" } else { sign(amount) };
        return format!("{}${}", sign, whole.trunc());
    }

    let mut index = UNITS
        .iter()
        .rposition(|(threshold, _)| magnitude >= Decimal::from(*threshold))
        .unwrap_or(0);
    let mut scaled = round_half_up(magnitude / Decimal::from(UNITS[index].0), 1);
    if scaled >= Decimal::ONE_THOUSAND && index + 1 < UNITS.len() {
        index += 1;
        scaled = round_half_up(magnitude / Decimal::from(UNITS[index].0), 1);
    }

    format!("{}${:.1}{}", sign(amount), scaled, UNITS[index].1)
}

/// Whole dollars with thousands separators: `$1,234,568`, `-$50`.
pub fn format_currency(amount: Decimal) -> String {
    let whole = round_half_up(amount.abs(), 0).trunc().to_string();
    format!("{}${}", sign(amount), group_thousands(&whole))
}

/// One decimal place: `12.3%`.
pub fn format_percent(percent: Decimal) -> String {
    format!("{:.1}%", round_half_up(percent, 1))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
