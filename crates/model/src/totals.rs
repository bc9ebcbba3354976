//! Totals breakdown shared between the totals calculator and the orders
//! wire format (spec §4.5).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A computed totals breakdown for an order, plus its tamper-evident
/// signature (spec §4.5, §9 "Totals tamper signature").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub signature: String,
}
