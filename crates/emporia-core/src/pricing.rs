//! # Pricing Engine
//!
//! Quantity-tiered wholesale pricing, per-account overrides and the flat
//! retail price.
//!
//! ## Tier Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart-wide quantity        Unit price                                   │
//! │  ──────────────────        ──────────                                   │
//! │     100 –    249             $8.00                                      │
//! │     250 –    499             $7.50                                      │
//! │     500 –    999             $7.00                                      │
//! │   1,000 –  4,999             $6.50                                      │
//! │   5,000 –  9,999             $6.00                                      │
//! │  10,000 – 24,999             $5.50                                      │
//! │  25,000 +                    $5.00                                      │
//! │                                                                         │
//! │  Lower bounds inclusive. Below 100 there is no wholesale price.        │
//! │  The band is picked from the TOTAL quantity across every line, so      │
//! │  one unit added to line B can re-price line A.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use emporia_core::money::Money;
//! use emporia_core::pricing::price_for_quantity;
//!
//! assert_eq!(price_for_quantity(99), None);
//! assert_eq!(price_for_quantity(249), Some(Money::from_cents(800)));
//! assert_eq!(price_for_quantity(250), Some(Money::from_cents(750)));
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tier Table
// =============================================================================

/// One band of the wholesale price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    /// Inclusive lower bound. Also the key custom overrides use.
    pub min: i64,
    /// Inclusive upper bound; `None` for the open top band.
    pub max: Option<i64>,
    #[ts(as = "String")]
    pub unit_price: Money,
}

impl PricingTier {
    pub fn contains(&self, quantity: i64) -> bool {
        quantity >= self.min && self.max.map_or(true, |max| quantity <= max)
    }
}

/// The wholesale tier table, ordered by `min`.
pub const PRICING_TIERS: [PricingTier; 7] = [
    PricingTier { min: 100, max: Some(249), unit_price: Money::from_cents(800) },
    PricingTier { min: 250, max: Some(499), unit_price: Money::from_cents(750) },
    PricingTier { min: 500, max: Some(999), unit_price: Money::from_cents(700) },
    PricingTier { min: 1_000, max: Some(4_999), unit_price: Money::from_cents(650) },
    PricingTier { min: 5_000, max: Some(9_999), unit_price: Money::from_cents(600) },
    PricingTier { min: 10_000, max: Some(24_999), unit_price: Money::from_cents(550) },
    PricingTier { min: 25_000, max: None, unit_price: Money::from_cents(500) },
];

/// Smallest quantity that has a wholesale price.
pub const LOWEST_TIER_MIN: i64 = PRICING_TIERS[0].min;

/// Returns the band for a cart-wide quantity, scanning from the top.
pub fn tier_for_quantity(total_quantity: i64) -> Option<&'static PricingTier> {
    PRICING_TIERS
        .iter()
        .rev()
        .find(|tier| total_quantity >= tier.min)
}

/// Unit price for a cart-wide quantity. `None` means the quantity is not
/// eligible for wholesale pricing.
pub fn price_for_quantity(total_quantity: i64) -> Option<Money> {
    tier_for_quantity(total_quantity).map(|tier| tier.unit_price)
}

// =============================================================================
// Custom Pricing
// =============================================================================

/// A negotiated price for one (flavor, strength, band) combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceOverride {
    pub flavor: String,
    pub strength: String,
    /// `min` of the band this override replaces.
    pub tier_min: i64,
    #[ts(as = "String")]
    pub price: Money,
}

/// All overrides held by one account. Serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(transparent)]
pub struct CustomPricing(pub Vec<PriceOverride>);

impl CustomPricing {
    pub fn new() -> Self {
        CustomPricing(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up the override for a key. Flavor and strength compare
    /// case-insensitively.
    pub fn lookup(&self, flavor: &str, strength: &str, tier_min: i64) -> Option<Money> {
        self.0
            .iter()
            .find(|o| {
                o.tier_min == tier_min
                    && o.flavor.eq_ignore_ascii_case(flavor)
                    && o.strength.eq_ignore_ascii_case(strength)
            })
            .map(|o| o.price)
    }

    /// Inserts or replaces the override for a key.
    pub fn set(&mut self, flavor: &str, strength: &str, tier_min: i64, price: Money) {
        self.0.retain(|o| {
            !(o.tier_min == tier_min
                && o.flavor.eq_ignore_ascii_case(flavor)
                && o.strength.eq_ignore_ascii_case(strength))
        });
        self.0.push(PriceOverride {
            flavor: flavor.to_string(),
            strength: strength.to_string(),
            tier_min,
            price,
        });
    }
}

/// The table price unless the account holds an override for this exact
/// (flavor, strength, band).
pub fn apply_custom_pricing(
    base: Money,
    custom_pricing: &CustomPricing,
    flavor: &str,
    strength: &str,
    tier: &PricingTier,
) -> Money {
    custom_pricing
        .lookup(flavor, strength, tier.min)
        .unwrap_or(base)
}

// =============================================================================
// Totals
// =============================================================================

/// Σ quantity × unit price over `(quantity, unit_price)` pairs.
///
/// Unit prices are already whole cents, so the sum is exact and there is
/// nothing left to round.
pub fn cart_total<I>(lines: I) -> Money
where
    I: IntoIterator<Item = (i64, Money)>,
{
    lines
        .into_iter()
        .map(|(quantity, unit_price)| unit_price.multiply_quantity(quantity))
        .sum()
}

// =============================================================================
// Retail
// =============================================================================

/// A promotional code applied to retail unit prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PromoDiscount {
    pub code: String,
    /// Discount in basis points (1000 = 10% off).
    pub discount_bps: u32,
}

/// Flat retail price, optionally discounted (half-up to the cent).
pub fn retail_unit_price(base: Money, promo: Option<&PromoDiscount>) -> Money {
    match promo {
        Some(promo) => base.apply_percentage_discount(promo.discount_bps.min(10_000)),
        None => base,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
