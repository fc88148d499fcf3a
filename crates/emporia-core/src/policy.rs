//! # Role Policy
//!
//! The one place that answers "may this role do that". Repositories call
//! [`authorize`] before touching state; ownership rules (a distributor only
//! on its own orders, a wholesaler only on its own loans) are layered on
//! top by the operation itself.
//!
//! ```text
//! ┌──────────────────────────────┬───────┬────────┬───────────┬─────────────┐
//! │ Operation                    │ ADMIN │ RETAIL │ WHOLESALE │ DISTRIBUTOR │
//! ├──────────────────────────────┼───────┼────────┼───────────┼─────────────┤
//! │ PlaceRetailOrder             │   ✓   │   ✓    │     ✓     │      ✓      │
//! │ PlaceWholesaleOrder          │       │        │     ✓     │             │
//! │ VerifyPayment                │   ✓   │        │           │             │
//! │ UpdateOrderStatus            │   ✓   │        │           │      ✓      │
//! │ SetConsignmentStatus         │   ✓   │        │           │             │
//! │ AssignDistributor            │   ✓   │        │           │             │
//! │ RequestLoan                  │   ✓   │        │     ✓     │             │
//! │ SetLoanStatus                │   ✓   │        │           │             │
//! │ ApplyRepayment               │   ✓   │        │     ✓     │             │
//! │ ManagePayouts                │   ✓   │        │           │             │
//! │ FailCommission               │   ✓   │        │           │             │
//! │ PayDistributorCommission     │   ✓   │        │           │             │
//! │ ManageInventory              │   ✓   │        │           │             │
//! │ ManageAccounts               │   ✓   │        │           │             │
//! │ ViewSystemSummary            │   ✓   │        │           │             │
//! └──────────────────────────────┴───────┴────────┴───────────┴─────────────┘
//! ```
//! Guest checkout carries no actor and bypasses this table; it is limited
//! to retail orders by the order rules.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{Actor, Role};

/// Every role-gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    PlaceRetailOrder,
    PlaceWholesaleOrder,
    VerifyPayment,
    UpdateOrderStatus,
    SetConsignmentStatus,
    AssignDistributor,
    RequestLoan,
    SetLoanStatus,
    ApplyRepayment,
    ManagePayouts,
    FailCommission,
    PayDistributorCommission,
    ManageInventory,
    /// Wholesale approval and custom pricing.
    ManageAccounts,
    ViewSystemSummary,
}

/// The policy table.
pub const fn is_allowed(operation: Operation, role: Role) -> bool {
    use Operation::*;

    match role {
        Role::Admin => !matches!(operation, PlaceWholesaleOrder),
        Role::Retail => matches!(operation, PlaceRetailOrder),
        Role::Wholesale => matches!(
            operation,
            PlaceRetailOrder | PlaceWholesaleOrder | RequestLoan | ApplyRepayment
        ),
        Role::Distributor => matches!(operation, PlaceRetailOrder | UpdateOrderStatus),
    }
}

/// Fails with `Forbidden` unless the actor's role may run the operation.
pub fn authorize(operation: Operation, actor: &Actor) -> CoreResult<()> {
    if is_allowed(operation, actor.role) {
        Ok(())
    } else {
        Err(CoreError::Forbidden {
            operation,
            role: actor.role,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
