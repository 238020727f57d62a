//! Fixed-point money helpers.
//!
//! Every amount shown to a customer or written to the database goes through
//! [`round_money`], which rounds half-up (ties away from zero) to cents.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::{PosError, Result};

/// Round to two decimals, ties away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `unit_price × quantity`, rounded to cents.
pub fn line_subtotal(unit_price: Decimal, quantity: i64) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Format as `$1,234.50`; negatives as `-$1,234.50`.
pub fn format_money(value: Decimal) -> String {
    let rounded = round_money(value);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${grouped}.{frac_part}")
    } else {
        format!("${grouped}.{frac_part}")
    }
}

/// Parse user input such as `12.5`, `$1,234.50` or ` 3 `.
pub fn parse_money(input: &str) -> Result<Decimal> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(PosError::validation("amount is required"));
    }
    Decimal::from_str(&cleaned)
        .map_err(|e| PosError::validation(format!("invalid amount '{input}': {e}")))
}

/// Lossy conversion for spreadsheet cells.
pub fn to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}

/// Decimal literal for tests.
#[cfg(test)]
pub(crate) fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}
