//! Receipt totals.
//!
//! Amounts are computed in integer cents so that `30.00 × 0.085` lands on
//! exactly `2.55`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaxPolicy {
    Exempt,
    Sales { rate: f64 },
}

impl TaxPolicy {
    /// A zero (or negative) rate disables tax.
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.0 {
            TaxPolicy::Sales { rate }
        } else {
            TaxPolicy::Exempt
        }
    }

    pub fn rate(self) -> f64 {
        match self {
            TaxPolicy::Exempt => 0.0,
            TaxPolicy::Sales { rate } => rate,
        }
    }

    /// Label for the payment summary, e.g. `Tax (8.5%)`.
    pub fn label(self) -> String {
        let pct = (self.rate() * 1000.0).round() / 10.0;
        if pct.fract() == 0.0 {
            format!("Tax ({pct:.0}%)")
        } else {
            format!("Tax ({pct:.1}%)")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReceiptTotals {
    pub unit_price: f64,
    pub quantity: i64,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(skip)]
    pub taxed: bool,
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn compute_totals(unit_price: f64, quantity: i64, policy: TaxPolicy) -> ReceiptTotals {
    let subtotal_cents = to_cents(unit_price).saturating_mul(quantity.max(0));
    let tax_cents = match policy {
        TaxPolicy::Exempt => 0,
        TaxPolicy::Sales { rate } => (subtotal_cents as f64 * rate).round() as i64,
    };
    ReceiptTotals {
        unit_price: from_cents(to_cents(unit_price)),
        quantity,
        subtotal: from_cents(subtotal_cents),
        tax: from_cents(tax_cents),
        total: from_cents(subtotal_cents.saturating_add(tax_cents)),
        taxed: matches!(policy, TaxPolicy::Sales { .. }),
    }
}

/// Format an amount for display, e.g. `$32.55`.
pub fn money(amount: f64) -> String {
    format!("${amount:.2}")
}
