//! # emporia-db: Database Layer for Emporia
//!
//! This crate persists the Emporia commerce core. It uses SQLite with sqlx
//! for async operations and delegates every business decision to
//! [`emporia_core`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Emporia Data Flow                                │
//! │                                                                         │
//! │  HTTP handler / admin tool / seed binary                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    emporia-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │ │   │
//! │  │   │               │    │ OrderRepo      │    │              │ │   │
//! │  │   │ SqlitePool    │◄───│ CommissionRepo │    │ 001_init.sql │ │   │
//! │  │   │ CommerceConfig│    │ LoanRepo  ...  │    │              │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  │                              │                                  │   │
//! │  │                              ▼                                  │   │
//! │  │                  emporia-core rule checks                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and store error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use emporia_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("emporia.db")).await?;
//!
//! let order = db.orders()
//!     .create_order(&cart, Some(&actor), PaymentMethod::Card, &options)
//!     .await?;
//! let stats = db.commissions().get_stats(referrer_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, StoreError, StoreResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::commission::CommissionRepository;
pub use repository::distributor::DistributorRepository;
pub use repository::loan::LoanRepository;
pub use repository::order::OrderRepository;
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::user::{NewUser, UserRepository};
