//! Pricing calculator.
//!
//! Pure and deterministic: the same cart, discount and shipping rule always
//! produce the same breakdown, so the total can be recomputed after a reload
//! and compared with what was shown before the redirect.

use crate::types::{CartItem, DeliveryMethod, Money};
use serde::{Deserialize, Serialize};

/// Flat tax rate in percent
pub const TAX_PERCENT: i64 = 8;

/// How shipping is charged
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRule {
    /// Fee for standard delivery below the threshold
    pub standard_fee: Money,
    /// Fee for express delivery below the threshold
    pub express_fee: Money,
    /// Subtotal from which shipping is free
    pub free_shipping_threshold: Money,
}

impl Default for ShippingRule {
    fn default() -> Self {
        Self {
            standard_fee: Money::from_major(50),
            express_fee: Money::from_major(100),
            free_shipping_threshold: Money::from_major(600),
        }
    }
}

impl ShippingRule {
    /// Shipping cost for a subtotal and delivery method
    #[must_use]
    pub fn cost(&self, subtotal: Money, method: DeliveryMethod) -> Money {
        if subtotal >= self.free_shipping_threshold {
            return Money::ZERO;
        }
        match method {
            DeliveryMethod::Standard => self.standard_fee,
            DeliveryMethod::Express => self.express_fee,
        }
    }
}

/// Derived amounts for a cart; never stored as the source of truth
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    /// Σ unit price × quantity
    pub subtotal: Money,
    /// Discount applied
    pub discount: Money,
    /// Shipping cost
    pub shipping: Money,
    /// 8% of (subtotal − discount), zero when the discount covers the subtotal
    pub tax: Money,
    /// subtotal + shipping + tax − discount
    pub total: Money,
    /// Total number of units
    pub item_count: u32,
    /// `true` when the threshold waived shipping
    pub free_shipping: bool,
}

/// Computes the breakdown for an explicit shipping cost.
#[must_use]
pub fn compute(items: &[CartItem], discount: Money, shipping: Money) -> PriceBreakdown {
    let subtotal: Money = items.iter().map(CartItem::line_total).sum();
    let tax = subtotal.saturating_sub(discount).percent_round_half_up(TAX_PERCENT);
    let total = subtotal + shipping + tax - discount;

    PriceBreakdown {
        subtotal,
        discount,
        shipping,
        tax,
        total,
        item_count: items.iter().map(|item| item.quantity).sum(),
        free_shipping: false,
    }
}

/// Computes the breakdown, deriving shipping from `rule` and `method`.
#[must_use]
pub fn compute_with_rule(
    items: &[CartItem],
    discount: Money,
    rule: &ShippingRule,
    method: DeliveryMethod,
) -> PriceBreakdown {
    let subtotal: Money = items.iter().map(CartItem::line_total).sum();
    let shipping = rule.cost(subtotal, method);
    PriceBreakdown {
        free_shipping: shipping.is_zero() && subtotal >= rule.free_shipping_threshold,
        ..compute(items, discount, shipping)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(price_major: i64, quantity: u32) -> CartItem {
        CartItem::new("p", "Turmeric", Money::from_major(price_major), quantity)
    }

    #[test]
    fn scenario_over_threshold_with_discount() {
        let items = vec![item(250, 2), item(500, 1)];
        let breakdown = compute(&items, Money::from_major(100), Money::ZERO);

        assert_eq!(breakdown.subtotal, Money::from_major(1000));
        assert_eq!(breakdown.tax, Money::from_major(72));
        assert_eq!(breakdown.total, Money::from_major(972));
        assert_eq!(breakdown.item_count, 3);
    }

    #[test]
    fn shipping_rule_waives_fee_from_threshold() {
        let rule = ShippingRule::default();

        let below = compute_with_rule(&[item(599, 1)], Money::ZERO, &rule, DeliveryMethod::Standard);
        assert_eq!(below.shipping, Money::from_major(50));
        assert!(!below.free_shipping);

        let express = compute_with_rule(&[item(599, 1)], Money::ZERO, &rule, DeliveryMethod::Express);
        assert_eq!(express.shipping, Money::from_major(100));

        let at = compute_with_rule(&[item(600, 1)], Money::ZERO, &rule, DeliveryMethod::Express);
        assert_eq!(at.shipping, Money::ZERO);
        assert!(at.free_shipping);
    }

    #[test]
    fn tax_floors_at_zero_when_discount_covers_subtotal() {
        let breakdown = compute(&[item(80, 1)], Money::from_major(100), Money::from_major(50));
        assert_eq!(breakdown.tax, Money::ZERO);
        assert_eq!(breakdown.total, Money::from_major(30));
    }

    #[test]
    fn empty_cart_costs_only_shipping() {
        let breakdown = compute(&[], Money::ZERO, Money::from_major(50));
        assert_eq!(breakdown.subtotal, Money::ZERO);
        assert_eq!(breakdown.total, Money::from_major(50));
        assert_eq!(breakdown.item_count, 0);
    }

    proptest! {
        #[test]
        fn total_matches_formula(
            prices in prop::collection::vec(1i64..50_000, 0..6),
            quantity in 1u32..5,
            discount_share in 0u32..=100,
            shipping in 0i64..20_000,
        ) {
            let items: Vec<CartItem> = prices
                .iter()
                .map(|p| CartItem::new("p", "x", Money::from_minor(*p), quantity))
                .collect();
            let subtotal: i64 = prices.iter().map(|p| p * i64::from(quantity)).sum();
            let discount = subtotal * i64::from(discount_share) / 100;

            let breakdown = compute(&items, Money::from_minor(discount), Money::from_minor(shipping));

            let expected_tax = ((subtotal - discount) * 8 + 50) / 100;
            prop_assert_eq!(breakdown.tax.minor(), expected_tax);
            prop_assert_eq!(
                breakdown.total.minor(),
                subtotal + shipping + expected_tax - discount
            );

            // Recomputing from identical inputs (as after a reload) is exact
            let again = compute(&items.clone(), Money::from_minor(discount), Money::from_minor(shipping));
            prop_assert_eq!(again, breakdown);
        }
    }
}
