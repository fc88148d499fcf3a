//! # Error Types
//!
//! Domain-specific error types for emporia-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  emporia-core errors (this file)                                        │
//! │  ├── CoreError        - Invariant violations and not-found kinds        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  emporia-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                     │
//! │  └── StoreError       - CoreError | DbError, what repositories return   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StoreError → caller branches on   │
//! │        StoreError::kind()                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, amounts, statuses)
//! 3. Errors are enum variants, never String
//! 4. "Doesn't exist" and "exists but illegal" are different variants

use thiserror::Error;

use crate::money::Money;
use crate::policy::Operation;
use crate::types::Role;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification callers branch on (e.g. to pick an HTTP status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any state was read.
    Validation,
    /// The entity exists but the operation would break a rule.
    Invariant,
    /// The entity does not exist.
    NotFound,
    /// The actor's role may not perform the operation.
    Forbidden,
    /// Database or other downstream failure.
    Infrastructure,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Requested quantity is zero or negative.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Cart total quantity is under the minimum order for its kind.
    ///
    /// ## When This Occurs
    /// - Wholesale checkout with fewer than 100 units
    /// - Retail checkout with fewer than 5 units
    /// - Reducing a cart line so the cart-wide total drops under the minimum
    #[error("Order quantity {total} is below the minimum of {minimum}")]
    BelowMinimumOrder { total: i64, minimum: i64 },

    /// A state machine refused the requested move.
    #[error("{entity} {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    /// Repayment larger than what is still owed.
    #[error("Repayment of {requested} exceeds remaining balance {remaining}")]
    OverRepayment { requested: Money, remaining: Money },

    /// Repayments are only accepted on approved loans.
    #[error("Loan {loan_id} is {status}, repayments require APPROVED")]
    LoanNotApproved { loan_id: i64, status: String },

    /// A user tried to use their own referral code.
    #[error("Users cannot refer themselves")]
    SelfReferralNotAllowed,

    /// The order already carries a referral attribution.
    #[error("Order {order_id} already has a referral attached")]
    AlreadyReferred { order_id: i64 },

    /// Role policy denied the operation.
    #[error("{role:?} may not perform {operation:?}")]
    Forbidden { operation: Operation, role: Role },

    /// Wholesale features require an approved wholesale account.
    #[error("Wholesale account {user_id} is not approved")]
    WholesaleNotApproved { user_id: i64 },

    /// Payment method doesn't belong to this kind of order.
    #[error("Payment method {method} is not available for {order_type} orders")]
    PaymentMethodNotAllowed { method: String, order_type: String },

    /// Inventory would go negative.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// Payout requested for a user with no pending earnings.
    #[error("User {user_id} has no pending commission to pay out")]
    NothingToPayOut { user_id: i64 },

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Loan not found: {0}")]
    LoanNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Commission transaction not found: {0}")]
    TransactionNotFound(i64),

    #[error("Commission payout not found: {0}")]
    PayoutNotFound(i64),

    #[error("Distributor commission not found: {0}")]
    DistributorCommissionNotFound(i64),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidQuantity { .. } | CoreError::Validation(_) => ErrorKind::Validation,

            CoreError::OrderNotFound(_)
            | CoreError::LoanNotFound(_)
            | CoreError::UserNotFound(_)
            | CoreError::ProductNotFound(_)
            | CoreError::TransactionNotFound(_)
            | CoreError::PayoutNotFound(_)
            | CoreError::DistributorCommissionNotFound(_) => ErrorKind::NotFound,

            CoreError::Forbidden { .. } => ErrorKind::Forbidden,

            CoreError::BelowMinimumOrder { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::OverRepayment { .. }
            | CoreError::LoanNotApproved { .. }
            | CoreError::SelfReferralNotAllowed
            | CoreError::AlreadyReferred { .. }
            | CoreError::WholesaleNotApproved { .. }
            | CoreError::PaymentMethodNotAllowed { .. }
            | CoreError::InsufficientStock { .. }
            | CoreError::NothingToPayOut { .. } => ErrorKind::Invariant,
        }
    }

    /// Builds an `InvalidTransition` from any two debuggable states.
    pub fn transition(
        entity: &'static str,
        id: i64,
        from: impl std::fmt::Debug,
        to: impl std::fmt::Debug,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            id,
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed amount, bad referral code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two values that must agree don't.
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
