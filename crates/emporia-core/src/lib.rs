//! # emporia-core: Pure Business Logic for Emporia
//!
//! This crate holds the commerce rules of Emporia as pure functions with
//! zero I/O dependencies: tier pricing, referral commission, the order
//! state machine and the wholesale loan ledger rules.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Emporia Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Storefronts / Admin / Distributor dashboards             │   │
//! │  │    (HTTP layer, sessions, payment processor webhooks)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Actor { id, role, wholesale_status }  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                emporia-db (repositories)                        │   │
//! │  │   one sqlx transaction per operation, guarded UPDATEs          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls rule checks                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ emporia-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌────────────┐ ┌───────┐ ┌────────┐  │   │
//! │  │   │ pricing │ │  cart   │ │ commission │ │ order │ │  loan  │  │   │
//! │  │   └─────────┘ └─────────┘ └────────────┘ └───────┘ └────────┘  │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌────────────┐ ┌────────┐            │   │
//! │  │   │  money  │ │  types  │ │   policy   │ │ config │            │   │
//! │  │   └─────────┘ └─────────┘ └────────────┘ └────────┘            │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities and status enums
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`pricing`] - Wholesale tier table, custom overrides, retail price
//! - [`cart`] - Cart value object with cart-wide re-pricing
//! - [`commission`] - Referral commission math and ledger state machines
//! - [`order`] - Order state machine, consignment, checkout planning
//! - [`loan`] - Wholesale loan balance rules
//! - [`policy`] - Role × operation permission table
//! - [`config`] - Tunable business constants
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use emporia_core::cart::Cart;
//! use emporia_core::config::CommerceConfig;
//! use emporia_core::pricing::CustomPricing;
//! use emporia_core::{Money, Product};
//!
//! let config = CommerceConfig::default();
//! let mut cart = Cart::wholesale(&config, CustomPricing::new());
//! let mint = Product {
//!     id: 1,
//!     name: "Mint Pouches".to_string(),
//!     flavor: "Mint".to_string(),
//!     strength: "6mg".to_string(),
//!     retail_price: Money::from_cents(499),
//!     is_active: true,
//! };
//!
//! cart.add_item(&mint, 100).unwrap();
//! let quote = cart.checkout().unwrap();
//! assert_eq!(quote.subtotal.to_decimal_string(), "800.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod commission;
pub mod config;
pub mod error;
pub mod loan;
pub mod money;
pub mod order;
pub mod policy;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use emporia_core::Money` instead of
// `use emporia_core::money::Money`

pub use config::{CommerceConfig, ConfigError};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use policy::Operation;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity on a single cart line.
///
/// ## Business Reason
/// Well above the top price band (25,000) while still catching a
/// fat-fingered extra digit or two.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;
