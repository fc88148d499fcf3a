//! # Loan Repository
//!
//! Wholesale credit lines and their repayments.
//!
//! ## Loan Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create_loan() ──► PENDING ──set_status()──► APPROVED ──┐              │
//! │                       │                          ▲        │              │
//! │                       └──set_status()──► REJECTED│        │ repayments   │
//! │                                                  └────────┘ remaining > 0│
//! │                                                           │              │
//! │                                           remaining == 0  ▼              │
//! │                                                         PAID             │
//! │                                                                         │
//! │  Every repayment is a guarded UPDATE on (status, remaining_amount):    │
//! │  two repayments read against the same balance cannot both land.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use emporia_core::loan::{
    authorize_repayment, check_new_loan, check_repayment_source, check_status_change,
    plan_repayment,
};
use emporia_core::{
    Actor, CommissionStatus, CoreError, LoanRepayment, LoanStatus, Money, RepaymentType,
    ValidationError, WholesaleLoan,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::commission::{debit_commission, fetch_transaction};
use crate::repository::user::fetch_user;

macro_rules! select_loans {
    ($tail:literal) => {
        concat!(
            "SELECT id, wholesaler_id, amount, remaining_amount, status, paid_at, created_at, updated_at ",
            "FROM wholesale_loans ",
            $tail
        )
    };
}

macro_rules! select_repayments {
    ($tail:literal) => {
        concat!(
            "SELECT id, loan_id, amount, type, commission_transaction_id, created_at ",
            "FROM loan_repayments ",
            $tail
        )
    };
}

/// Repository for wholesale loan database operations.
#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: SqlitePool,
}

impl LoanRepository {
    /// Creates a new LoanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoanRepository { pool }
    }

    /// Opens a PENDING loan for an approved wholesaler.
    pub async fn create_loan(
        &self,
        wholesaler_id: i64,
        amount: Money,
        actor: &Actor,
    ) -> StoreResult<WholesaleLoan> {
        let mut tx = self.pool.begin().await?;
        let borrower = fetch_user(&mut tx, wholesaler_id).await?;
        check_new_loan(&borrower, amount, actor)?;

        let now = Utc::now();
        let loan_id = sqlx::query(
            r#"
            INSERT INTO wholesale_loans (wholesaler_id, amount, remaining_amount, status, created_at, updated_at)
            VALUES (?1, ?2, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(wholesaler_id)
        .bind(amount)
        .bind(LoanStatus::Pending)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let loan = fetch_loan(&mut tx, loan_id).await?;
        tx.commit().await?;

        info!(loan_id, wholesaler_id, amount = %amount, "Loan requested");
        Ok(loan)
    }

    /// Admin approval or rejection of a PENDING loan.
    pub async fn set_status(
        &self,
        loan_id: i64,
        status: LoanStatus,
        actor: &Actor,
    ) -> StoreResult<WholesaleLoan> {
        let mut tx = self.pool.begin().await?;
        let loan = fetch_loan(&mut tx, loan_id).await?;
        check_status_change(&loan, status, actor)?;

        let result = sqlx::query(
            r#"
            UPDATE wholesale_loans
            SET status = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(loan_id)
        .bind(loan.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(loan_id, "Loan status changed concurrently");
            return Err(CoreError::transition("Loan", loan_id, loan.status, status).into());
        }

        let loan = fetch_loan(&mut tx, loan_id).await?;
        tx.commit().await?;

        info!(loan_id, status = ?status, admin_id = actor.id, "Loan status updated");
        Ok(loan)
    }

    /// Pays down an APPROVED loan.
    ///
    /// ## Repayment Types
    /// - `DirectPayment` - money from outside the system
    /// - `ReferralEarnings` - consumes one PENDING commission transaction of
    ///   the borrower, whose amount must equal the repayment. The transaction
    ///   is settled and the borrower's unpaid balance drops with it.
    ///
    /// The loan flips to PAID, with `paid_at` stamped, when the balance
    /// reaches exactly zero.
    pub async fn apply_repayment(
        &self,
        loan_id: i64,
        amount: Money,
        repayment_type: RepaymentType,
        commission_transaction_id: Option<i64>,
        actor: &Actor,
    ) -> StoreResult<LoanRepayment> {
        let mut tx = self.pool.begin().await?;
        let loan = fetch_loan(&mut tx, loan_id).await?;
        authorize_repayment(&loan, actor)?;
        let plan = plan_repayment(&loan, amount)?;

        let source = match (repayment_type, commission_transaction_id) {
            (RepaymentType::ReferralEarnings, Some(txn_id)) => {
                let txn = fetch_transaction(&mut tx, txn_id).await?;
                check_repayment_source(&loan, &txn, amount)?;
                Some(txn)
            }
            (RepaymentType::ReferralEarnings, None) => {
                return Err(ValidationError::Required {
                    field: "commission_transaction_id".to_string(),
                }
                .into());
            }
            (RepaymentType::DirectPayment, Some(_)) => {
                return Err(ValidationError::NotAllowed {
                    field: "commission_transaction_id".to_string(),
                    allowed: vec!["REFERRAL_EARNINGS repayments".to_string()],
                }
                .into());
            }
            (RepaymentType::DirectPayment, None) => None,
        };

        let now = Utc::now();
        let (status, paid_at) = if plan.pays_off {
            (LoanStatus::Paid, Some(now))
        } else {
            (LoanStatus::Approved, None)
        };

        let result = sqlx::query(
            r#"
            UPDATE wholesale_loans
            SET remaining_amount = ?1, status = ?2, paid_at = ?3, updated_at = ?4
            WHERE id = ?5 AND status = 'APPROVED' AND remaining_amount = ?6
            "#,
        )
        .bind(plan.remaining_after)
        .bind(status)
        .bind(paid_at)
        .bind(now)
        .bind(loan_id)
        .bind(plan.remaining_before)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(loan_id, remaining = %plan.remaining_before, "Loan balance changed concurrently");
            return Err(CoreError::InvalidTransition {
                entity: "Loan",
                id: loan_id,
                from: format!("remaining {}", plan.remaining_before),
                to: format!("remaining {}", plan.remaining_after),
            }
            .into());
        }

        if let Some(txn) = &source {
            let settled = sqlx::query(
                r#"
                UPDATE commission_transactions
                SET status = 'PAID', updated_at = ?1
                WHERE id = ?2 AND status = 'PENDING'
                "#,
            )
            .bind(now)
            .bind(txn.id)
            .execute(&mut *tx)
            .await?;

            if settled.rows_affected() == 0 {
                warn!(txn_id = txn.id, "Commission transaction consumed concurrently");
                return Err(CoreError::transition(
                    "CommissionTransaction",
                    txn.id,
                    txn.status,
                    CommissionStatus::Paid,
                )
                .into());
            }

            sqlx::query("UPDATE orders SET commission_paid = 1, updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(txn.order_id)
                .execute(&mut *tx)
                .await?;

            debit_commission(&mut tx, txn.user_id, txn.amount).await?;
        }

        let repayment_id = sqlx::query(
            r#"
            INSERT INTO loan_repayments (loan_id, amount, type, commission_transaction_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(loan_id)
        .bind(amount)
        .bind(repayment_type)
        .bind(commission_transaction_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let repayment = sqlx::query_as::<_, LoanRepayment>(select_repayments!("WHERE id = ?1"))
            .bind(repayment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            loan_id,
            repayment_id,
            amount = %amount,
            remaining = %plan.remaining_after,
            paid_off = plan.pays_off,
            "Loan repayment applied"
        );
        Ok(repayment)
    }

    /// Gets a loan by ID, failing with `LoanNotFound`.
    pub async fn get_loan(&self, id: i64) -> StoreResult<WholesaleLoan> {
        let mut conn = self.pool.acquire().await?;
        fetch_loan(&mut conn, id).await
    }

    pub async fn list_repayments(&self, loan_id: i64) -> StoreResult<Vec<LoanRepayment>> {
        let repayments = sqlx::query_as::<_, LoanRepayment>(select_repayments!(
            "WHERE loan_id = ?1 ORDER BY id"
        ))
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(repayments)
    }

    pub async fn list_for_wholesaler(&self, wholesaler_id: i64) -> StoreResult<Vec<WholesaleLoan>> {
        let loans = sqlx::query_as::<_, WholesaleLoan>(select_loans!(
            "WHERE wholesaler_id = ?1 ORDER BY id DESC"
        ))
        .bind(wholesaler_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }
}

pub(crate) async fn fetch_loan(conn: &mut SqliteConnection, id: i64) -> StoreResult<WholesaleLoan> {
    sqlx::query_as::<_, WholesaleLoan>(select_loans!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::LoanNotFound(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{admin_actor, approved_wholesaler, db, retail_order, user};
    use emporia_core::cart::Cart;
    use emporia_core::order::CheckoutOptions;
    use emporia_core::{ErrorKind, PaymentMethod, Role};

    async fn approved_loan(db: &crate::Database, wholesaler: &emporia_core::User, cents: i64) -> WholesaleLoan {
        let loan = db
            .loans()
            .create_loan(wholesaler.id, Money::from_cents(cents), &wholesaler.actor())
            .await
            .unwrap();
        db.loans()
            .set_status(loan.id, LoanStatus::Approved, &admin_actor())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_repay_to_zero_then_over_repay() {
        let db = db().await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let loan = approved_loan(&db, &shop, 100_000).await;

        db.loans()
            .apply_repayment(loan.id, Money::from_cents(40_000), RepaymentType::DirectPayment, None, &shop.actor())
            .await
            .unwrap();
        let mid = db.loans().get_loan(loan.id).await.unwrap();
        assert_eq!(mid.remaining_amount, Money::from_cents(60_000));
        assert_eq!(mid.status, LoanStatus::Approved);

        db.loans()
            .apply_repayment(loan.id, Money::from_cents(60_000), RepaymentType::DirectPayment, None, &shop.actor())
            .await
            .unwrap();
        let done = db.loans().get_loan(loan.id).await.unwrap();
        assert_eq!(done.remaining_amount, Money::ZERO);
        assert_eq!(done.status, LoanStatus::Paid);
        assert!(done.paid_at.is_some());

        // Nothing left to repay
        let err = db
            .loans()
            .apply_repayment(loan.id, Money::from_cents(1), RepaymentType::DirectPayment, None, &admin_actor())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::OverRepayment { .. })));

        assert_eq!(db.loans().list_repayments(loan.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_over_repayment_leaves_balance() {
        let db = db().await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let loan = approved_loan(&db, &shop, 100_000).await;

        let err = db
            .loans()
            .apply_repayment(loan.id, Money::from_cents(100_001), RepaymentType::DirectPayment, None, &shop.actor())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::OverRepayment { .. })));

        let loan = db.loans().get_loan(loan.id).await.unwrap();
        assert_eq!(loan.remaining_amount, Money::from_cents(100_000));
        assert!(db.loans().list_repayments(loan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_loan_rejects_repayment_and_status_rules() {
        let db = db().await;
        let admin = admin_actor();
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let loan = db
            .loans()
            .create_loan(shop.id, Money::from_cents(5_000), &shop.actor())
            .await
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.remaining_amount, loan.amount);

        let err = db
            .loans()
            .apply_repayment(loan.id, Money::from_cents(100), RepaymentType::DirectPayment, None, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::LoanNotApproved { .. })));

        let err = db
            .loans()
            .set_status(loan.id, LoanStatus::Approved, &shop.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        db.loans().set_status(loan.id, LoanStatus::Rejected, &admin).await.unwrap();
        let err = db
            .loans()
            .set_status(loan.id, LoanStatus::Approved, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_only_approved_wholesalers_borrow() {
        let db = db().await;
        let pending = user(&db, "pending@example.com", Role::Wholesale).await;
        let other = approved_wholesaler(&db, "other@example.com").await;

        let err = db
            .loans()
            .create_loan(pending.id, Money::from_cents(5_000), &admin_actor())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::WholesaleNotApproved { .. })));

        let err = db
            .loans()
            .create_loan(pending.id, Money::from_cents(5_000), &other.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = db
            .loans()
            .create_loan(other.id, Money::ZERO, &other.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_repay_from_referral_earnings() {
        let db = db().await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let code = db.commissions().ensure_referral_code(shop.id).await.unwrap();
        let loan = approved_loan(&db, &shop, 100_000).await;

        let order = retail_order(&db, None, 20).await;
        let txn = db
            .commissions()
            .record_referral(order.id, &code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(db.users().get(shop.id).await.unwrap().commission, txn.amount);

        // Must consume the whole transaction
        let err = db
            .loans()
            .apply_repayment(loan.id, Money::from_cents(1), RepaymentType::ReferralEarnings, Some(txn.id), &shop.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let repayment = db
            .loans()
            .apply_repayment(loan.id, txn.amount, RepaymentType::ReferralEarnings, Some(txn.id), &shop.actor())
            .await
            .unwrap();
        assert_eq!(repayment.repayment_type, RepaymentType::ReferralEarnings);
        assert_eq!(repayment.commission_transaction_id, Some(txn.id));

        let txn = db.commissions().get_transaction(txn.id).await.unwrap();
        assert_eq!(txn.status, CommissionStatus::Paid);
        assert_eq!(db.users().get(shop.id).await.unwrap().commission, Money::ZERO);
        assert!(db.orders().get_order(order.id).await.unwrap().commission_paid);

        let loan = db.loans().get_loan(loan.id).await.unwrap();
        assert_eq!(loan.remaining_amount, Money::from_cents(100_000) - txn.amount);

        // Spent earnings cannot be spent again
        let err = db
            .loans()
            .apply_repayment(loan.id, txn.amount, RepaymentType::ReferralEarnings, Some(txn.id), &shop.actor())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_loan_paid_order() {
        let db = db().await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let other = approved_wholesaler(&db, "other@example.com").await;
        let loan = approved_loan(&db, &shop, 100_000).await;
        let mint = crate::repository::test_support::product(&db, "Mint").await;

        let mut cart = Cart::wholesale(db.commerce(), shop.custom_pricing.clone());
        cart.add_item(&mint, 100).unwrap();
        let options = CheckoutOptions {
            wholesale_loan_id: Some(loan.id),
            ..Default::default()
        };

        let order = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Loan, &options)
            .await
            .unwrap();
        assert_eq!(order.wholesale_loan_id, Some(loan.id));

        let err = db
            .orders()
            .create_order(&cart, Some(&other.actor()), PaymentMethod::Loan, &options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(db.loans().list_for_wholesaler(shop.id).await.unwrap().len(), 1);
    }
}
