//! # Commerce Configuration
//!
//! Tunable business constants, loaded from `EMPORIA_*` environment
//! variables over built-in defaults.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Variable                            Default   Meaning                 │
//! │  ─────────────────────────────────   ───────   ──────────────────────  │
//! │  EMPORIA_RETAIL_MIN_QTY                    5   retail cart minimum     │
//! │  EMPORIA_WHOLESALE_MIN_QTY               100   wholesale cart minimum  │
//! │  EMPORIA_REFERRAL_COMMISSION_BPS         500   5% of subtotal          │
//! │  EMPORIA_DISTRIBUTOR_COMMISSION_BPS      500   5% of order total       │
//! │  EMPORIA_RETAIL_SHIPPING                5.00   flat per retail order   │
//! │  EMPORIA_WHOLESALE_SHIPPING             0.00   flat per wholesale order│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reading the environment is the only side effect here, and it is kept
//! behind [`CommerceConfig::from_env`]; everything else takes a lookup
//! function so tests never touch process state.

use std::str::FromStr;

use thiserror::Error;

use crate::money::Money;
use crate::pricing::LOWEST_TIER_MIN;
use crate::types::OrderType;
use crate::validation::validate_bps;

/// Malformed configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Business constants shared by the pricing, commission and order rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommerceConfig {
    pub retail_min_quantity: i64,
    pub wholesale_min_quantity: i64,
    pub referral_commission_bps: u32,
    pub distributor_commission_bps: u32,
    pub retail_shipping: Money,
    pub wholesale_shipping: Money,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        CommerceConfig {
            retail_min_quantity: 5,
            wholesale_min_quantity: LOWEST_TIER_MIN,
            referral_commission_bps: 500,
            distributor_commission_bps: 500,
            retail_shipping: Money::from_cents(500),
            wholesale_shipping: Money::ZERO,
        }
    }
}

impl CommerceConfig {
    /// Loads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads overrides from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CommerceConfig::default();

        let config = CommerceConfig {
            retail_min_quantity: read(&lookup, "EMPORIA_RETAIL_MIN_QTY", defaults.retail_min_quantity)?,
            wholesale_min_quantity: read(
                &lookup,
                "EMPORIA_WHOLESALE_MIN_QTY",
                defaults.wholesale_min_quantity,
            )?,
            referral_commission_bps: read(
                &lookup,
                "EMPORIA_REFERRAL_COMMISSION_BPS",
                defaults.referral_commission_bps,
            )?,
            distributor_commission_bps: read(
                &lookup,
                "EMPORIA_DISTRIBUTOR_COMMISSION_BPS",
                defaults.distributor_commission_bps,
            )?,
            retail_shipping: read(&lookup, "EMPORIA_RETAIL_SHIPPING", defaults.retail_shipping)?,
            wholesale_shipping: read(
                &lookup,
                "EMPORIA_WHOLESALE_SHIPPING",
                defaults.wholesale_shipping,
            )?,
        };

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String, reason: String| ConfigError::Invalid {
            key,
            value,
            reason,
        };

        if self.retail_min_quantity < 1 {
            return Err(invalid(
                "EMPORIA_RETAIL_MIN_QTY",
                self.retail_min_quantity.to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.wholesale_min_quantity < LOWEST_TIER_MIN {
            return Err(invalid(
                "EMPORIA_WHOLESALE_MIN_QTY",
                self.wholesale_min_quantity.to_string(),
                format!("must be at least {LOWEST_TIER_MIN}, the first price band"),
            ));
        }
        for (key, bps) in [
            ("EMPORIA_REFERRAL_COMMISSION_BPS", self.referral_commission_bps),
            ("EMPORIA_DISTRIBUTOR_COMMISSION_BPS", self.distributor_commission_bps),
        ] {
            validate_bps(key, bps).map_err(|e| invalid(key, bps.to_string(), e.to_string()))?;
        }
        for (key, amount) in [
            ("EMPORIA_RETAIL_SHIPPING", self.retail_shipping),
            ("EMPORIA_WHOLESALE_SHIPPING", self.wholesale_shipping),
        ] {
            if amount.is_negative() {
                return Err(invalid(
                    key,
                    amount.to_decimal_string(),
                    "must not be negative".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Minimum cart-wide quantity for an order type.
    pub fn min_quantity(&self, order_type: OrderType) -> i64 {
        match order_type {
            OrderType::Retail => self.retail_min_quantity,
            OrderType::Wholesale => self.wholesale_min_quantity,
        }
    }

    /// Flat shipping charge for an order type.
    pub fn shipping_for(&self, order_type: OrderType) -> Money {
        match order_type {
            OrderType::Retail => self.retail_shipping,
            OrderType::Wholesale => self.wholesale_shipping,
        }
    }
}

fn read<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CommerceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, CommerceConfig::default());
        assert_eq!(config.min_quantity(OrderType::Wholesale), 100);
        assert_eq!(config.min_quantity(OrderType::Retail), 5);
        assert_eq!(config.shipping_for(OrderType::Wholesale), Money::ZERO);
    }

    #[test]
    fn test_overrides() {
        let config = CommerceConfig::from_lookup(lookup_from(&[
            ("EMPORIA_RETAIL_MIN_QTY", "10"),
            ("EMPORIA_REFERRAL_COMMISSION_BPS", "750"),
            ("EMPORIA_RETAIL_SHIPPING", "7.99"),
        ]))
        .unwrap();

        assert_eq!(config.retail_min_quantity, 10);
        assert_eq!(config.referral_commission_bps, 750);
        assert_eq!(config.retail_shipping, Money::from_cents(799));
        assert_eq!(config.wholesale_min_quantity, 100);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = CommerceConfig::from_lookup(lookup_from(&[("EMPORIA_RETAIL_MIN_QTY", "five")]))
            .unwrap_err();
        assert!(err.to_string().contains("EMPORIA_RETAIL_MIN_QTY"));

        assert!(CommerceConfig::from_lookup(lookup_from(&[(
            "EMPORIA_REFERRAL_COMMISSION_BPS",
            "20000"
        )]))
        .is_err());

        assert!(CommerceConfig::from_lookup(lookup_from(&[("EMPORIA_WHOLESALE_MIN_QTY", "50")]))
            .is_err());

        assert!(CommerceConfig::from_lookup(lookup_from(&[("EMPORIA_RETAIL_SHIPPING", "-1.00")]))
            .is_err());
    }
}
