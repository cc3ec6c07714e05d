//! Integer money math for carts and orders.
//!
//! All amounts are minor currency units (kopecks, cents). Nothing here touches
//! floating point, the database, or the clock.

use serde::{Deserialize, Serialize};

/// Anything that contributes `unit_price * quantity` to a subtotal.
pub trait PricedLine {
    fn unit_price(&self) -> i64;
    fn quantity(&self) -> i64;

    fn line_total(&self) -> i64 {
        self.unit_price().saturating_mul(self.quantity())
    }
}

impl PricedLine for crate::models::checkout::CheckoutItem {
    fn unit_price(&self) -> i64 {
        self.price_snapshot
    }

    fn quantity(&self) -> i64 {
        i64::from(self.qty)
    }
}

impl PricedLine for crate::entities::order_item::Model {
    fn unit_price(&self) -> i64 {
        self.price_snapshot
    }

    fn quantity(&self) -> i64 {
        i64::from(self.qty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

/// Σ unit_price * qty over all lines.
pub fn subtotal<L: PricedLine>(lines: &[L]) -> i64 {
    lines
        .iter()
        .fold(0i64, |acc, line| acc.saturating_add(line.line_total()))
}

/// `max(0, subtotal - discount)`
pub fn total(subtotal: i64, discount: i64) -> i64 {
    subtotal.saturating_sub(discount).max(0)
}

/// `round(subtotal * percent / 100)`, half-up, never more than the subtotal.
pub fn percent_discount(subtotal: i64, percent: i64) -> i64 {
    if subtotal <= 0 {
        return 0;
    }
    let percent = i128::from(percent.clamp(0, 100));
    let rounded = (i128::from(subtotal) * percent + 50) / 100;
    // percent <= 100 keeps this within the subtotal
    i64::try_from(rounded).unwrap_or(subtotal).min(subtotal)
}

/// `min(value, subtotal)`, never negative.
pub fn fixed_discount(subtotal: i64, value: i64) -> i64 {
    value.max(0).min(subtotal.max(0))
}

/// Subtotal, clamped discount and total for a set of lines.
pub fn price_lines<L: PricedLine>(lines: &[L], discount: i64) -> Totals {
    let subtotal = subtotal(lines);
    let discount = discount.max(0).min(subtotal);
    Totals {
        subtotal,
        discount,
        total: total(subtotal, discount),
    }
}

/// Display form of an amount: whole units when there is no fractional part,
/// otherwise two decimals (`100000 -> "1000"`, `12345 -> "123.45"`).
pub fn format_major_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let (major, fraction) = (abs / 100, abs % 100);
    if fraction == 0 {
        format!("{}{}", sign, major)
    } else {
        format!("{}{}.{:02}", sign, major, fraction)
    }
}

/// Gateway form of an amount, always two decimals (`150050 -> "1500.50"`).
pub fn format_decimal_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
