//! # Cart
//!
//! The shopping cart as an explicit value. The storefront owns it between
//! requests and hands it to checkout; nothing here reads ambient state.
//!
//! ## Re-pricing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Wholesale cart: every mutation re-prices EVERY line                    │
//! │                                                                         │
//! │   Mint  ×200  @ $7.50        add Berry ×700       Mint  ×200  @ $6.50   │
//! │   Berry × 100 @ $7.50   ──────────────────────►   Berry ×800  @ $6.50   │
//! │   total 300 (band 250)                            total 1000 (band 1000)│
//! │                                                                         │
//! │  Retail cart: flat product price, optional promo discount per unit.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Minimum Order
//! A cart may be built up from nothing, so growing it never fails on the
//! minimum. Once a cart has reached its minimum, a reduction that would take
//! it back under (without emptying it) fails with `BelowMinimumOrder` and the
//! cart is left as it was. [`Cart::checkout`] enforces the minimum
//! unconditionally.

use serde::{Deserialize, Serialize};

use crate::config::CommerceConfig;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::pricing::{
    apply_custom_pricing, cart_total, retail_unit_price, tier_for_quantity, CustomPricing,
    PromoDiscount,
};
use crate::types::{OrderType, Product};
use crate::validation::{validate_cart_size, validate_quantity};
use crate::MAX_LINE_QUANTITY;

/// Which storefront a cart belongs to. Same closed set as [`OrderType`].
pub type CartKind = OrderType;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: i64,
    pub flavor: String,
    pub strength: String,
    pub quantity: i64,
    /// The product's flat retail price at the time it was added.
    pub list_price: Money,
    /// Current unit price. `None` while a wholesale cart is under the
    /// first band.
    pub unit_price: Option<Money>,
}

impl CartLine {
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.map(|p| p.multiply_quantity(self.quantity))
    }
}

/// A cart line with a settled price, ready to become an order item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i64,
    pub flavor: String,
    pub strength: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A cart that passed the checkout checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutQuote {
    pub order_type: OrderType,
    pub lines: Vec<PricedLine>,
    pub total_quantity: i64,
    pub subtotal: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    kind: CartKind,
    min_quantity: i64,
    lines: Vec<CartLine>,
    #[serde(default)]
    custom_pricing: CustomPricing,
    #[serde(default)]
    promo: Option<PromoDiscount>,
}

impl Cart {
    /// Empty retail cart, optionally with a promotional code.
    pub fn retail(config: &CommerceConfig, promo: Option<PromoDiscount>) -> Self {
        Cart {
            kind: OrderType::Retail,
            min_quantity: config.retail_min_quantity,
            lines: Vec::new(),
            custom_pricing: CustomPricing::new(),
            promo,
        }
    }

    /// Empty wholesale cart priced with the buyer's overrides.
    pub fn wholesale(config: &CommerceConfig, custom_pricing: CustomPricing) -> Self {
        Cart {
            kind: OrderType::Wholesale,
            min_quantity: config.wholesale_min_quantity,
            lines: Vec::new(),
            custom_pricing,
            promo: None,
        }
    }

    pub fn kind(&self) -> CartKind {
        self.kind
    }

    pub fn min_quantity(&self) -> i64 {
        self.min_quantity
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity across every line; this is what picks the band.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Σ line totals, or `None` while any line is unpriced.
    pub fn subtotal(&self) -> Option<Money> {
        let lines: Option<Vec<(i64, Money)>> = self
            .lines
            .iter()
            .map(|l| l.unit_price.map(|p| (l.quantity, p)))
            .collect();
        lines.map(cart_total)
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Adds units of a product, merging with an existing line.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity { quantity });
        }
        if !product.is_active {
            return Err(CoreError::ProductNotFound(product.id));
        }

        validate_quantity(quantity)?;

        let mut lines = self.lines.clone();
        match lines.iter_mut().find(|l| l.product_id == product.id) {
            Some(line) => {
                line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                    ValidationError::OutOfRange {
                        field: "quantity".to_string(),
                        min: 1,
                        max: MAX_LINE_QUANTITY,
                    }
                })?;
                validate_quantity(line.quantity)?;
            }
            None => {
                validate_cart_size(lines.len())?;
                lines.push(CartLine {
                    product_id: product.id,
                    flavor: product.flavor.clone(),
                    strength: product.strength.clone(),
                    quantity,
                    list_price: product.retail_price,
                    unit_price: None,
                });
            }
        }

        self.commit(lines)
    }

    /// Sets a line to an exact quantity.
    pub fn update_quantity(&mut self, product_id: i64, quantity: i64) -> CoreResult<()> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity { quantity });
        }
        validate_quantity(quantity)?;

        let mut lines = self.lines.clone();
        let line = lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CoreError::ProductNotFound(product_id))?;
        line.quantity = quantity;

        self.commit(lines)
    }

    /// Drops a line entirely.
    pub fn remove_item(&mut self, product_id: i64) -> CoreResult<()> {
        let mut lines = self.lines.clone();
        let before = lines.len();
        lines.retain(|l| l.product_id != product_id);
        if lines.len() == before {
            return Err(CoreError::ProductNotFound(product_id));
        }

        self.commit(lines)
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Re-prices a candidate line set and swaps it in, or leaves the cart
    /// untouched when the change would break the minimum.
    fn commit(&mut self, mut lines: Vec<CartLine>) -> CoreResult<()> {
        let old_total = self.total_quantity();
        let new_total: i64 = lines.iter().map(|l| l.quantity).sum();

        let shrinks_under_minimum = new_total > 0
            && new_total < old_total
            && old_total >= self.min_quantity
            && new_total < self.min_quantity;
        if shrinks_under_minimum {
            return Err(CoreError::BelowMinimumOrder {
                total: new_total,
                minimum: self.min_quantity,
            });
        }

        self.reprice(&mut lines, new_total);
        self.lines = lines;
        Ok(())
    }

    fn reprice(&self, lines: &mut [CartLine], total_quantity: i64) {
        match self.kind {
            OrderType::Wholesale => {
                let tier = tier_for_quantity(total_quantity);
                for line in lines.iter_mut() {
                    line.unit_price = tier.map(|t| {
                        apply_custom_pricing(
                            t.unit_price,
                            &self.custom_pricing,
                            &line.flavor,
                            &line.strength,
                            t,
                        )
                    });
                }
            }
            OrderType::Retail => {
                for line in lines.iter_mut() {
                    line.unit_price = Some(retail_unit_price(line.list_price, self.promo.as_ref()));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Checkout against stored data.
    ///
    /// Only the storefront and each line's product id and quantity are read
    /// from this cart. Labels and list prices come from `catalog`, overrides
    /// from the buyer's stored account, the promotion from the caller and the
    /// minimum from `config`. A cart that round-tripped through a client is
    /// priced exactly as a fresh one.
    pub fn checkout_against(
        &self,
        catalog: &[Product],
        custom_pricing: &CustomPricing,
        promo: Option<&PromoDiscount>,
        config: &CommerceConfig,
    ) -> CoreResult<CheckoutQuote> {
        let mut trusted = match self.kind {
            OrderType::Retail => Cart::retail(config, promo.cloned()),
            OrderType::Wholesale => Cart::wholesale(config, custom_pricing.clone()),
        };

        for line in &self.lines {
            let product = catalog
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or(CoreError::ProductNotFound(line.product_id))?;
            trusted.add_item(product, line.quantity)?;
        }

        trusted.checkout()
    }

    /// Validates the cart for checkout and freezes its prices.
    ///
    /// Uses the terms this cart carries. A cart that came back from a client
    /// goes through [`Cart::checkout_against`] instead.
    pub fn checkout(&self) -> CoreResult<CheckoutQuote> {
        if self.lines.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let total_quantity = self.total_quantity();
        let minimum = match self.kind {
            OrderType::Wholesale => self.min_quantity.max(crate::pricing::LOWEST_TIER_MIN),
            OrderType::Retail => self.min_quantity,
        };
        if total_quantity < minimum {
            return Err(CoreError::BelowMinimumOrder {
                total: total_quantity,
                minimum,
            });
        }

        let mut lines = self.lines.clone();
        for line in &lines {
            validate_quantity(line.quantity)?;
        }
        self.reprice(&mut lines, total_quantity);

        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let unit_price = line.unit_price.ok_or(CoreError::BelowMinimumOrder {
                total: total_quantity,
                minimum,
            })?;
            priced.push(PricedLine {
                line_total: unit_price.multiply_quantity(line.quantity),
                product_id: line.product_id,
                flavor: line.flavor,
                strength: line.strength,
                quantity: line.quantity,
                unit_price,
            });
        }

        let subtotal = priced.iter().map(|l| l.line_total).sum();

        Ok(CheckoutQuote {
            order_type: self.kind,
            lines: priced,
            total_quantity,
            subtotal,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, flavor: &str, cents: i64) -> Product {
        Product {
            id,
            name: format!("{flavor} pouch"),
            flavor: flavor.to_string(),
            strength: "6mg".to_string(),
            retail_price: Money::from_cents(cents),
            is_active: true,
        }
    }

    fn unit_prices(cart: &Cart) -> Vec<Option<Money>> {
        cart.lines().iter().map(|l| l.unit_price).collect()
    }

    #[test]
    fn test_growing_cart_reprices_every_line() {
        let config = CommerceConfig::default();
        let mut cart = Cart::wholesale(&config, CustomPricing::new());

        cart.add_item(&product(1, "Mint", 0), 200).unwrap();
        cart.add_item(&product(2, "Berry", 0), 100).unwrap();
        assert_eq!(cart.total_quantity(), 300);
        assert_eq!(unit_prices(&cart), vec![Some(Money::from_cents(750)); 2]);

        cart.add_item(&product(2, "Berry", 0), 700).unwrap();
        assert_eq!(cart.total_quantity(), 1_000);
        assert_eq!(unit_prices(&cart), vec![Some(Money::from_cents(650)); 2]);
        assert_eq!(cart.subtotal(), Some(Money::from_cents(650_000)));
    }

    #[test]
    fn test_wholesale_lines_unpriced_under_first_band() {
        let config = CommerceConfig::default();
        let mut cart = Cart::wholesale(&config, CustomPricing::new());

        cart.add_item(&product(1, "Mint", 0), 99).unwrap();
        assert_eq!(unit_prices(&cart), vec![None]);
        assert_eq!(cart.subtotal(), None);

        let err = cart.checkout().unwrap_err();
        assert!(matches!(
            err,
            CoreError::BelowMinimumOrder { total: 99, minimum: 100 }
        ));
    }

    #[test]
    fn test_shrinking_under_minimum_is_rejected() {
        let config = CommerceConfig::default();
        let mut cart = Cart::wholesale(&config, CustomPricing::new());
        cart.add_item(&product(1, "Mint", 0), 60).unwrap();
        cart.add_item(&product(2, "Berry", 0), 60).unwrap();
        let before = cart.clone();

        let err = cart.update_quantity(1, 30).unwrap_err();
        assert!(matches!(err, CoreError::BelowMinimumOrder { total: 90, .. }));
        assert_eq!(cart, before);

        let err = cart.remove_item(2).unwrap_err();
        assert!(matches!(err, CoreError::BelowMinimumOrder { total: 60, .. }));
        assert_eq!(cart, before);

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_shrinking_across_a_band_reprices_down_the_table() {
        let config = CommerceConfig::default();
        let mut cart = Cart::wholesale(&config, CustomPricing::new());
        cart.add_item(&product(1, "Mint", 0), 300).unwrap();
        cart.update_quantity(1, 249).unwrap();
        assert_eq!(unit_prices(&cart), vec![Some(Money::from_cents(800))]);
    }

    #[test]
    fn test_invalid_quantities() {
        let config = CommerceConfig::default();
        let mut cart = Cart::retail(&config, None);

        assert!(matches!(
            cart.add_item(&product(1, "Mint", 499), 0),
            Err(CoreError::InvalidQuantity { quantity: 0 })
        ));
        cart.add_item(&product(1, "Mint", 499), 5).unwrap();
        assert!(matches!(
            cart.update_quantity(1, -3),
            Err(CoreError::InvalidQuantity { quantity: -3 })
        ));
        assert!(matches!(
            cart.update_quantity(42, 3),
            Err(CoreError::ProductNotFound(42))
        ));
    }

    #[test]
    fn test_custom_pricing_applies_per_line() {
        let config = CommerceConfig::default();
        let mut custom = CustomPricing::new();
        custom.set("Mint", "6mg", 100, Money::from_cents(720));

        let mut cart = Cart::wholesale(&config, custom);
        cart.add_item(&product(1, "Mint", 0), 50).unwrap();
        cart.add_item(&product(2, "Berry", 0), 50).unwrap();

        assert_eq!(
            unit_prices(&cart),
            vec![Some(Money::from_cents(720)), Some(Money::from_cents(800))]
        );

        let quote = cart.checkout().unwrap();
        assert_eq!(quote.subtotal, Money::from_cents(36_000 + 40_000));
    }

    #[test]
    fn test_retail_checkout_with_promo() {
        let config = CommerceConfig::default();
        let promo = PromoDiscount {
            code: "WELCOME".to_string(),
            discount_bps: 1_000,
        };
        let mut cart = Cart::retail(&config, Some(promo));
        cart.add_item(&product(1, "Mint", 1_000), 5).unwrap();

        let quote = cart.checkout().unwrap();
        assert_eq!(quote.order_type, OrderType::Retail);
        assert_eq!(quote.lines[0].unit_price, Money::from_cents(900));
        assert_eq!(quote.subtotal, Money::from_cents(4_500));
    }

    #[test]
    fn test_retail_minimum() {
        let config = CommerceConfig::default();
        let mut cart = Cart::retail(&config, None);
        cart.add_item(&product(1, "Mint", 1_000), 4).unwrap();
        assert!(matches!(
            cart.checkout(),
            Err(CoreError::BelowMinimumOrder { total: 4, minimum: 5 })
        ));
    }

    #[test]
    fn test_empty_cart_cannot_check_out() {
        let cart = Cart::retail(&CommerceConfig::default(), None);
        assert!(matches!(cart.checkout(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_merging_huge_quantity_is_a_validation_error() {
        let mut cart = Cart::retail(&CommerceConfig::default(), None);
        let mint = product(1, "Mint", 499);
        cart.add_item(&mint, 5).unwrap();
        let before = cart.clone();

        let err = cart.add_item(&mint, i64::MAX).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(cart, before);
    }

    #[test]
    fn test_checkout_against_ignores_client_held_terms() {
        let config = CommerceConfig::default();
        let mint = product(1, "Mint", 499);

        // Retail: cheap list price, full promo and a lowered minimum
        let mut cart = Cart::retail(&config, None);
        cart.add_item(&mint, 5).unwrap();
        let mut json = serde_json::to_value(&cart).unwrap();
        json["minQuantity"] = 1.into();
        json["lines"][0]["listPrice"] = "0.01".into();
        json["lines"][0]["quantity"] = 1.into();
        json["promo"] = serde_json::json!({ "code": "FREE", "discountBps": 10_000 });
        let tampered: Cart = serde_json::from_value(json).unwrap();

        assert!(matches!(
            tampered.checkout_against(&[mint.clone()], &CustomPricing::new(), None, &config),
            Err(CoreError::BelowMinimumOrder { total: 1, minimum: 5 })
        ));

        let mut json = serde_json::to_value(&tampered).unwrap();
        json["lines"][0]["quantity"] = 5.into();
        let tampered: Cart = serde_json::from_value(json).unwrap();
        let quote = tampered
            .checkout_against(&[mint.clone()], &CustomPricing::new(), None, &config)
            .unwrap();
        assert_eq!(quote.subtotal, Money::from_cents(2_495));

        // Wholesale: an invented override is dropped
        let mut invented = CustomPricing::new();
        invented.set("Mint", "6mg", 100, Money::from_cents(1));
        let mut cart = Cart::wholesale(&config, invented);
        cart.add_item(&mint, 100).unwrap();
        assert_eq!(cart.subtotal(), Some(Money::from_cents(100)));

        let quote = cart
            .checkout_against(&[mint], &CustomPricing::new(), None, &config)
            .unwrap();
        assert_eq!(quote.subtotal, Money::from_cents(80_000));
    }

    #[test]
    fn test_checkout_against_unknown_product() {
        let config = CommerceConfig::default();
        let mut cart = Cart::retail(&config, None);
        cart.add_item(&product(7, "Mint", 499), 5).unwrap();

        assert!(matches!(
            cart.checkout_against(&[], &CustomPricing::new(), None, &config),
            Err(CoreError::ProductNotFound(7))
        ));
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut cart = Cart::retail(&CommerceConfig::default(), None);
        let mut hidden = product(9, "Mint", 100);
        hidden.is_active = false;
        assert!(matches!(
            cart.add_item(&hidden, 5),
            Err(CoreError::ProductNotFound(9))
        ));
    }
}
