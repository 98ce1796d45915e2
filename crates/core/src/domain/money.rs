use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a dollar amount to cents. The result always carries two decimal
/// places. Non-finite input collapses to zero.
pub fn to_cents(value: f64) -> Decimal {
    let mut cents = Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    cents.rescale(2);
    cents
}

/// `$12,345.60` style rendering.
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}${}.{fraction}", group_thousands(whole))
}

pub fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{format_usd, group_thousands, to_cents};

    #[test]
    fn cents_rounding() {
        assert_eq!(to_cents(199.999_999), Decimal::new(20_000, 2));
        assert_eq!(to_cents(9_800.125), Decimal::new(980_013, 2));
        assert_eq!(to_cents(f64::NAN), Decimal::ZERO);
    }

    #[test]
    fn whole_dollar_amounts_keep_two_decimal_places() {
        assert_eq!(to_cents(12_750.0).to_string(), "12750.00");
        assert_eq!(to_cents(9_800.1).to_string(), "9800.10");
        assert_eq!(to_cents(f64::NAN).to_string(), "0.00");
        assert_eq!(serde_json::to_string(&to_cents(500.0)).expect("serialize"), "\"500.00\"");
    }

    #[test]
    fn usd_rendering_groups_thousands() {
        assert_eq!(format_usd(Decimal::new(980_000, 2)), "$9,800.00");
        assert_eq!(format_usd(Decimal::new(20_000, 2)), "$200.00");
        assert_eq!(format_usd(Decimal::new(123_456_789, 1)), "$12,345,678.90");
        assert_eq!(format_usd(Decimal::new(-5_050, 2)), "-$50.50");
        assert_eq!(group_thousands("10000"), "10,000");
    }
}
