//! # Repository Module
//!
//! Database repository implementations for Emporia.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Operation = One Transaction                      │
//! │                                                                         │
//! │  db.orders().update_status(42, Shipped, &actor)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  ├── SELECT order 42                     (OrderNotFound if missing)    │
//! │  ├── emporia_core::order::check_*()      (rule check, pure)            │
//! │  ├── UPDATE orders SET status = 'SHIPPED'                              │
//! │  │       WHERE id = 42 AND status = 'PROCESSING'                       │
//! │  │       └── 0 rows? a concurrent writer won → InvalidTransition       │
//! │  └── side effects (commission rows, balances)                          │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helpers take `&mut SqliteConnection` so they run the same on a pooled
//! connection or inside an open transaction (`&mut *tx`). Never touch the
//! pool while a transaction is open: in-memory databases have exactly one
//! connection.
//!
//! ## Available Repositories
//!
//! - [`UserRepository`](user::UserRepository) - Accounts, wholesale approval, custom pricing
//! - [`ProductRepository`](product::ProductRepository) - Minimal catalog
//! - [`OrderRepository`](order::OrderRepository) - Checkout and order lifecycle
//! - [`CommissionRepository`](commission::CommissionRepository) - Referral ledger and payouts
//! - [`LoanRepository`](loan::LoanRepository) - Wholesale loans and repayments
//! - [`DistributorRepository`](distributor::DistributorRepository) - Fulfillment fees and stock

pub mod commission;
pub mod distributor;
pub mod loan;
pub mod order;
pub mod product;
pub mod user;
