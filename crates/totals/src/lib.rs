//! Totals Calculator (spec §4.5).
//!
//! Computes subtotal, tax, shipping, and total for an order's line items
//! under banker's rounding (round-half-to-even), and produces a
//! deterministic SHA-256 signature over the breakdown for later tamper
//! detection by the orchestrator (spec §9 "Totals tamper signature").

use model::{ProductId, Totals};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One priced line going into the calculator. This mirrors an
/// [`model::OrderItem`] snapshot but only carries the fields totals math
/// needs.
#[derive(Debug, Clone)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Tax rate and shipping override for a totals computation.
#[derive(Debug, Clone)]
pub struct TotalsOptions {
    pub tax_rate: Decimal,
    pub shipping: Option<Decimal>,
}

impl Default for TotalsOptions {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2), // 0.05
            shipping: None,
        }
    }
}

/// Canonical, signature-stable encoding of a totals breakdown. Field order
/// is fixed by this struct's declaration order; items are sorted by
/// product identifier before being embedded.
#[derive(Serialize)]
struct SignaturePayload<'a> {
    items: Vec<SignatureLine<'a>>,
    subtotal: Decimal,
    tax_rate: Decimal,
    tax_amount: Decimal,
    shipping: Decimal,
    total: Decimal,
}

#[derive(Serialize)]
struct SignatureLine<'a> {
    product_id: &'a str,
    quantity: u32,
    unit_price: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Computes the totals breakdown for `items` under `opts`, rounding every
/// monetary output to 2 decimals with round-half-to-even.
///
/// Shipping, if not supplied in `opts`, defaults to `10.00 + sum(qty) *
/// 2.00` (spec §4.5).
pub fn compute(items: &[LineInput], opts: &TotalsOptions) -> Totals {
    let raw_subtotal: Decimal = items
        .iter()
        .map(|item| item.unit_price * Decimal::from(item.quantity))
        .sum();
    let subtotal = round2(raw_subtotal);
    let tax_amount = round2(subtotal * opts.tax_rate);

    let shipping = match opts.shipping {
        Some(explicit) => round2(explicit),
        None => {
            let total_qty: u32 = items.iter().map(|item| item.quantity).sum();
            round2(Decimal::new(1000, 2) + Decimal::from(total_qty) * Decimal::new(200, 2))
        }
    };

    let total = round2(subtotal + tax_amount + shipping);

    let mut sorted_items: Vec<&LineInput> = items.iter().collect();
    sorted_items.sort_by(|a, b| a.product_id.as_str().cmp(b.product_id.as_str()));

    let payload = SignaturePayload {
        items: sorted_items
            .iter()
            .map(|item| SignatureLine {
                product_id: item.product_id.as_str(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
        subtotal,
        tax_rate: opts.tax_rate,
        tax_amount,
        shipping,
        total,
    };

    let encoded = serde_json::to_vec(&payload).expect("signature payload is always serializable");
    let signature = format!("{:x}", Sha256::digest(&encoded));

    Totals {
        subtotal,
        tax_rate: opts.tax_rate,
        tax_amount,
        shipping,
        total,
        signature,
    }
}

/// Recomputes the signature for an already-computed [`Totals`] and its
/// originating items, for the orchestrator's tamper check (spec §4.1
/// "Totals re-verification").
pub fn recompute_signature(items: &[LineInput], opts: &TotalsOptions) -> String {
    compute(items, opts).signature
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, qty: u32, price: &str) -> LineInput {
        LineInput {
            product_id: ProductId::new(id),
            quantity: qty,
            unit_price: price.parse().unwrap(),
        }
    }

    #[test]
    fn happy_path_matches_spec_scenario_1() {
        let items = vec![line("1", 2, "10.00"), line("2", 1, "10.00")];
        let totals = compute(&items, &TotalsOptions::default());
        assert_eq!(totals.subtotal, "30.00".parse().unwrap());
        assert_eq!(totals.tax_amount, "1.50".parse().unwrap());
        assert_eq!(totals.shipping, "16.00".parse().unwrap());
        assert_eq!(totals.total, "47.50".parse().unwrap());
        assert_eq!(totals.signature.len(), 64);
    }

    #[test]
    fn bankers_rounding_rounds_half_to_even() {
        let half_down: Decimal = "0.125".parse().unwrap();
        let half_up: Decimal = "0.135".parse().unwrap();
        assert_eq!(round2(half_down), "0.12".parse().unwrap());
        assert_eq!(round2(half_up), "0.14".parse().unwrap());
    }

    #[test]
    fn signature_is_stable_regardless_of_item_order() {
        let a = vec![line("1", 2, "10.00"), line("2", 1, "10.00")];
        let b = vec![line("2", 1, "10.00"), line("1", 2, "10.00")];
        let sig_a = compute(&a, &TotalsOptions::default()).signature;
        let sig_b = compute(&b, &TotalsOptions::default()).signature;
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn explicit_shipping_overrides_default() {
        let items = vec![line("1", 1, "5.00")];
        let opts = TotalsOptions {
            tax_rate: Decimal::new(5, 2),
            shipping: Some("3.33".parse().unwrap()),
        };
        let totals = compute(&items, &opts);
        assert_eq!(totals.shipping, "3.33".parse().unwrap());
    }
}
