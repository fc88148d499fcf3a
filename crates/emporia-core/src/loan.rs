//! # Wholesale Loans
//!
//! Balance rules for credit extended to wholesale buyers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   PENDING ──► APPROVED ──(remaining hits 0)──► PAID                     │
//! │      │                                                                  │
//! │      └──────► REJECTED                                                  │
//! │                                                                         │
//! │   Invariants                                                            │
//! │   • 0 <= remaining_amount <= amount                                    │
//! │   • PAID  <=>  remaining_amount == 0                                   │
//! │   • repayments only while APPROVED                                     │
//! │   • REFERRAL_EARNINGS repayments consume one PENDING commission        │
//! │     transaction of the borrower, for exactly its amount                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::policy::{authorize, Operation};
use crate::types::{
    Actor, CommissionStatus, CommissionTransaction, LoanStatus, Role, User, WholesaleLoan,
};
use crate::validation::validate_positive_amount;

/// Checks a new loan request. A wholesaler may only borrow for itself.
pub fn check_new_loan(borrower: &User, amount: Money, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::RequestLoan, actor)?;

    if actor.role == Role::Wholesale && actor.id != borrower.id {
        return Err(CoreError::Forbidden {
            operation: Operation::RequestLoan,
            role: actor.role,
        });
    }

    validate_positive_amount("amount", amount)?;

    if !borrower.actor().is_approved_wholesaler() {
        return Err(CoreError::WholesaleNotApproved {
            user_id: borrower.id,
        });
    }

    Ok(())
}

pub fn can_set_status(from: LoanStatus, to: LoanStatus) -> bool {
    matches!(
        (from, to),
        (LoanStatus::Pending, LoanStatus::Approved) | (LoanStatus::Pending, LoanStatus::Rejected)
    )
}

/// Admin approval or rejection. PAID is only ever reached by repayment.
pub fn check_status_change(loan: &WholesaleLoan, to: LoanStatus, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::SetLoanStatus, actor)?;

    if !can_set_status(loan.status, to) {
        return Err(CoreError::transition("Loan", loan.id, loan.status, to));
    }

    Ok(())
}

/// Resulting balance of a valid repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepaymentPlan {
    pub remaining_before: Money,
    pub remaining_after: Money,
    pub pays_off: bool,
}

/// Checks a repayment against the loan and prices its effect.
///
/// ```rust
/// # use emporia_core::loan::plan_repayment;
/// # use emporia_core::money::Money;
/// # use emporia_core::types::{LoanStatus, WholesaleLoan};
/// # let now = chrono::Utc::now();
/// # let loan = WholesaleLoan {
/// #     id: 1, wholesaler_id: 2,
/// #     amount: Money::from_cents(100_000), remaining_amount: Money::from_cents(60_000),
/// #     status: LoanStatus::Approved, paid_at: None, created_at: now, updated_at: now,
/// # };
/// let plan = plan_repayment(&loan, Money::from_cents(60_000)).unwrap();
/// assert!(plan.pays_off);
/// ```
pub fn plan_repayment(loan: &WholesaleLoan, amount: Money) -> CoreResult<RepaymentPlan> {
    validate_positive_amount("amount", amount)?;

    // A settled loan has nothing left to take
    if loan.status == LoanStatus::Paid {
        return Err(CoreError::OverRepayment {
            requested: amount,
            remaining: Money::ZERO,
        });
    }

    if loan.status != LoanStatus::Approved {
        return Err(CoreError::LoanNotApproved {
            loan_id: loan.id,
            status: format!("{:?}", loan.status),
        });
    }

    if amount > loan.remaining_amount {
        return Err(CoreError::OverRepayment {
            requested: amount,
            remaining: loan.remaining_amount,
        });
    }

    let remaining_after = loan.remaining_amount - amount;

    Ok(RepaymentPlan {
        remaining_before: loan.remaining_amount,
        remaining_after,
        pays_off: remaining_after.is_zero(),
    })
}

/// Who may record a repayment: admins on any loan, a wholesaler on its own.
pub fn authorize_repayment(loan: &WholesaleLoan, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::ApplyRepayment, actor)?;

    if actor.role == Role::Wholesale && actor.id != loan.wholesaler_id {
        return Err(CoreError::Forbidden {
            operation: Operation::ApplyRepayment,
            role: actor.role,
        });
    }

    Ok(())
}

/// A referral-earnings repayment must be funded by one unpaid commission
/// of the borrower, consumed whole.
pub fn check_repayment_source(
    loan: &WholesaleLoan,
    txn: &CommissionTransaction,
    amount: Money,
) -> CoreResult<()> {
    if txn.user_id != loan.wholesaler_id {
        return Err(ValidationError::Mismatch {
            field: "commission transaction owner".to_string(),
            expected: loan.wholesaler_id.to_string(),
            actual: txn.user_id.to_string(),
        }
        .into());
    }

    if txn.status != CommissionStatus::Pending {
        return Err(CoreError::transition(
            "CommissionTransaction",
            txn.id,
            txn.status,
            CommissionStatus::Paid,
        ));
    }

    if txn.amount != amount {
        return Err(ValidationError::Mismatch {
            field: "repayment amount".to_string(),
            expected: txn.amount.to_decimal_string(),
            actual: amount.to_decimal_string(),
        }
        .into());
    }

    Ok(())
}

/// A `LOAN`-paid order must draw on an approved loan of the buyer.
pub fn check_loan_for_order(loan: &WholesaleLoan, buyer_id: i64) -> CoreResult<()> {
    if loan.wholesaler_id != buyer_id {
        return Err(ValidationError::Mismatch {
            field: "loan owner".to_string(),
            expected: buyer_id.to_string(),
            actual: loan.wholesaler_id.to_string(),
        }
        .into());
    }

    if loan.status != LoanStatus::Approved {
        return Err(CoreError::LoanNotApproved {
            loan_id: loan.id,
            status: format!("{:?}", loan.status),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
