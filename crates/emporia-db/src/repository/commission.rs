//! # Commission Repository
//!
//! The referral ledger: who referred which order, what they earned, and
//! how those earnings leave the system.
//!
//! ## Money Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Commission Transaction Lifecycle                     │
//! │                                                                         │
//! │  record_referral()                                                     │
//! │     └── PENDING ─────────┬──────────────┬───────────────────┐          │
//! │                          │              │                   │          │
//! │            create_payout()   apply_repayment(       fail_transaction() │
//! │                          │    REFERRAL_EARNINGS)            │          │
//! │                          ▼              │                   ▼          │
//! │                     PROCESSING          │                 FAILED       │
//! │                      │      │           │                              │
//! │     complete_payout  │      │ complete_payout                          │
//! │        (Succeeded)   │      │   (Failed)                               │
//! │                      ▼      └──► PENDING                               │
//! │                     PAID ◄──────────┘                                  │
//! │                                                                         │
//! │  users.commission mirrors Σ unpaid (PENDING + PROCESSING) and moves    │
//! │  in the same transaction as every ledger row above.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use emporia_core::commission::{
    check_payout_completion, check_referrer_link, check_transaction_transition,
    generate_referral_code, plan_referral, ReferralStats, SystemSummary,
};
use emporia_core::policy::{authorize, Operation};
use emporia_core::validation::{validate_payment_details, validate_referral_code};
use emporia_core::{
    Actor, CommerceConfig, CommissionPayout, CommissionStatus, CommissionTransaction, CoreError,
    Money, Order, PaymentOutcome, User,
};

use crate::error::{DbError, StoreError, StoreResult};
use crate::repository::order::fetch_order;
use crate::repository::user::{fetch_user, find_by_referral_code};

/// Attempts at drawing an unused referral code before giving up.
const MAX_CODE_ATTEMPTS: usize = 5;

macro_rules! select_transactions {
    ($tail:literal) => {
        concat!(
            "SELECT id, user_id, order_id, amount, type, status, payout_id, created_at, updated_at ",
            "FROM commission_transactions ",
            $tail
        )
    };
}

macro_rules! select_payouts {
    ($tail:literal) => {
        concat!(
            "SELECT id, user_id, amount, status, payment_details, processed_at, created_at ",
            "FROM commission_payouts ",
            $tail
        )
    };
}

/// Repository for the referral commission ledger.
#[derive(Debug, Clone)]
pub struct CommissionRepository {
    pool: SqlitePool,
    commerce: Arc<CommerceConfig>,
}

impl CommissionRepository {
    /// Creates a new CommissionRepository.
    pub fn new(pool: SqlitePool, commerce: Arc<CommerceConfig>) -> Self {
        CommissionRepository { pool, commerce }
    }

    // =========================================================================
    // Attribution
    // =========================================================================

    /// Credits the owner of `referral_code` for an existing order.
    ///
    /// Returns `Ok(None)` when no account holds the code. Otherwise the
    /// order, the new PENDING transaction and the referrer's counters are
    /// written in one transaction.
    pub async fn record_referral(
        &self,
        order_id: i64,
        referral_code: &str,
    ) -> StoreResult<Option<CommissionTransaction>> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;

        let txn = record_referral_in(&mut tx, &order, referral_code, &self.commerce).await?;

        tx.commit().await?;
        Ok(txn)
    }

    /// Returns the user's referral code, generating one on first use.
    pub async fn ensure_referral_code(&self, user_id: i64) -> StoreResult<String> {
        let mut conn = self.pool.acquire().await?;
        let user = fetch_user(&mut conn, user_id).await?;
        if let Some(code) = user.referral_code {
            return Ok(code);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_referral_code();

            let result = sqlx::query(
                "UPDATE users SET referral_code = ?1 WHERE id = ?2 AND referral_code IS NULL",
            )
            .bind(&code)
            .bind(user_id)
            .execute(&mut *conn)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 1 => {
                    info!(user_id, code = %code, "Referral code assigned");
                    return Ok(code);
                }
                // Someone else assigned one first
                Ok(_) => {
                    if let Some(code) = fetch_user(&mut conn, user_id).await?.referral_code {
                        return Ok(code);
                    }
                }
                Err(err) => match DbError::from(err) {
                    DbError::UniqueViolation { .. } => {
                        warn!(user_id, attempt, "Referral code collision, drawing again");
                    }
                    other => return Err(other.into()),
                },
            }
        }

        Err(DbError::Internal(format!(
            "no unused referral code after {MAX_CODE_ATTEMPTS} attempts"
        ))
        .into())
    }

    /// Links a new account to the owner of `referral_code`.
    ///
    /// Unknown codes leave the account untouched. An account keeps its
    /// first referrer.
    pub async fn set_referrer(&self, user_id: i64, referral_code: &str) -> StoreResult<User> {
        let code = validate_referral_code(referral_code)?;

        let mut tx = self.pool.begin().await?;
        let user = fetch_user(&mut tx, user_id).await?;

        let Some(referrer) = find_by_referral_code(&mut tx, &code).await? else {
            debug!(user_id, code = %code, "Unknown referral code, no referrer linked");
            return Ok(user);
        };
        check_referrer_link(&user, &referrer)?;

        let result = sqlx::query(
            "UPDATE users SET referrer_id = ?1 WHERE id = ?2 AND referrer_id IS NULL",
        )
        .bind(referrer.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(user_id, referrer_id = referrer.id, "User already has a referrer");
            return Err(
                CoreError::transition("User", user_id, user.referrer_id, Some(referrer.id)).into(),
            );
        }

        let user = fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(user_id, referrer_id = referrer.id, "Referrer linked");
        Ok(user)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Dashboard numbers for one referrer, computed from the ledger.
    pub async fn get_stats(&self, user_id: i64) -> StoreResult<ReferralStats> {
        let mut conn = self.pool.acquire().await?;
        let user = fetch_user(&mut conn, user_id).await?;

        let (paid, pending): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'PAID' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN status = 'PENDING' THEN amount END), 0)
            FROM commission_transactions
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        let last_referral_date: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM orders WHERE referrer_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(ReferralStats {
            total_referrals: user.total_referrals,
            total_earnings: Money::from_cents(paid),
            pending_earnings: Money::from_cents(pending),
            last_referral_date,
        })
    }

    /// System-wide commission totals.
    pub async fn get_system_summary(&self, actor: &Actor) -> StoreResult<SystemSummary> {
        authorize(Operation::ViewSystemSummary, actor)?;

        let (paid, pending): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'PAID' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN status = 'PENDING' THEN amount END), 0)
            FROM commission_transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let active_referrers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE total_referrals > 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(SystemSummary {
            total_commission_paid: Money::from_cents(paid),
            total_commission_pending: Money::from_cents(pending),
            active_referrers,
        })
    }

    pub async fn get_transaction(&self, id: i64) -> StoreResult<CommissionTransaction> {
        let mut conn = self.pool.acquire().await?;
        fetch_transaction(&mut conn, id).await
    }

    pub async fn list_transactions(&self, user_id: i64) -> StoreResult<Vec<CommissionTransaction>> {
        let txns = sqlx::query_as::<_, CommissionTransaction>(select_transactions!(
            "WHERE user_id = ?1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(txns)
    }

    pub async fn get_payout(&self, id: i64) -> StoreResult<CommissionPayout> {
        let mut conn = self.pool.acquire().await?;
        fetch_payout(&mut conn, id).await
    }

    pub async fn list_payouts(&self, user_id: i64) -> StoreResult<Vec<CommissionPayout>> {
        let payouts = sqlx::query_as::<_, CommissionPayout>(select_payouts!(
            "WHERE user_id = ?1 ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    // =========================================================================
    // Payouts
    // =========================================================================

    /// Batches every PENDING transaction of a user into one PROCESSING payout.
    pub async fn create_payout(
        &self,
        user_id: i64,
        payment_details: Option<&str>,
        actor: &Actor,
    ) -> StoreResult<CommissionPayout> {
        authorize(Operation::ManagePayouts, actor)?;
        if let Some(details) = payment_details {
            validate_payment_details(details)?;
        }

        let mut tx = self.pool.begin().await?;
        fetch_user(&mut tx, user_id).await?;

        let (count, total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(amount), 0)
            FROM commission_transactions
            WHERE user_id = ?1 AND status = 'PENDING'
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if count == 0 || total == 0 {
            return Err(CoreError::NothingToPayOut { user_id }.into());
        }

        let now = Utc::now();
        let payout_id = sqlx::query(
            r#"
            INSERT INTO commission_payouts (user_id, amount, status, payment_details, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(user_id)
        .bind(total)
        .bind(CommissionStatus::Processing)
        .bind(payment_details)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let claimed = sqlx::query(
            r#"
            UPDATE commission_transactions
            SET status = 'PROCESSING', payout_id = ?1, updated_at = ?2
            WHERE user_id = ?3 AND status = 'PENDING'
            "#,
        )
        .bind(payout_id)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed != count as u64 {
            warn!(user_id, expected = count, claimed, "Pending set changed while batching payout");
            return Err(CoreError::transition(
                "CommissionPayout",
                payout_id,
                CommissionStatus::Pending,
                CommissionStatus::Processing,
            )
            .into());
        }

        let payout = fetch_payout(&mut tx, payout_id).await?;
        tx.commit().await?;

        info!(
            payout_id,
            user_id,
            amount = %payout.amount,
            transactions = count,
            "Commission payout created"
        );
        Ok(payout)
    }

    /// Settles a payout with the processor's verdict.
    ///
    /// `Pending` leaves it PROCESSING. `Succeeded` pays it and its
    /// transactions and takes the amount off the user's unpaid balance.
    /// `Failed` releases the transactions back to PENDING.
    pub async fn complete_payout(
        &self,
        payout_id: i64,
        outcome: PaymentOutcome,
        actor: &Actor,
    ) -> StoreResult<CommissionPayout> {
        authorize(Operation::ManagePayouts, actor)?;

        let mut tx = self.pool.begin().await?;
        let payout = fetch_payout(&mut tx, payout_id).await?;

        let to = match outcome {
            PaymentOutcome::Succeeded => CommissionStatus::Paid,
            PaymentOutcome::Failed => CommissionStatus::Failed,
            PaymentOutcome::Pending => {
                debug!(payout_id, "Payout still pending at processor");
                return Ok(payout);
            }
        };
        check_payout_completion(payout.id, payout.status, to)?;

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE commission_payouts
            SET status = ?1, processed_at = ?2
            WHERE id = ?3 AND status = 'PROCESSING'
            "#,
        )
        .bind(to)
        .bind(now)
        .bind(payout_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(payout_id, "Payout settled concurrently");
            return Err(CoreError::transition("CommissionPayout", payout_id, payout.status, to).into());
        }

        if to == CommissionStatus::Paid {
            sqlx::query(
                r#"
                UPDATE commission_transactions
                SET status = 'PAID', updated_at = ?1
                WHERE payout_id = ?2 AND status = 'PROCESSING'
                "#,
            )
            .bind(now)
            .bind(payout_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE orders
                SET commission_paid = 1, updated_at = ?1
                WHERE id IN (SELECT order_id FROM commission_transactions WHERE payout_id = ?2)
                "#,
            )
            .bind(now)
            .bind(payout_id)
            .execute(&mut *tx)
            .await?;

            debit_commission(&mut tx, payout.user_id, payout.amount).await?;
        } else {
            sqlx::query(
                r#"
                UPDATE commission_transactions
                SET status = 'PENDING', payout_id = NULL, updated_at = ?1
                WHERE payout_id = ?2 AND status = 'PROCESSING'
                "#,
            )
            .bind(now)
            .bind(payout_id)
            .execute(&mut *tx)
            .await?;
        }

        let payout = fetch_payout(&mut tx, payout_id).await?;
        tx.commit().await?;

        info!(
            payout_id,
            user_id = payout.user_id,
            status = ?payout.status,
            amount = %payout.amount,
            "Commission payout settled"
        );
        Ok(payout)
    }

    /// Voids a PENDING transaction (chargeback, fraud).
    pub async fn fail_transaction(
        &self,
        txn_id: i64,
        actor: &Actor,
    ) -> StoreResult<CommissionTransaction> {
        authorize(Operation::FailCommission, actor)?;

        let mut tx = self.pool.begin().await?;
        let txn = fetch_transaction(&mut tx, txn_id).await?;
        check_transaction_transition(txn.id, txn.status, CommissionStatus::Failed)?;

        let result = sqlx::query(
            r#"
            UPDATE commission_transactions
            SET status = 'FAILED', updated_at = ?1
            WHERE id = ?2 AND status = 'PENDING'
            "#,
        )
        .bind(Utc::now())
        .bind(txn_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(txn_id, "Commission transaction changed concurrently");
            return Err(CoreError::transition(
                "CommissionTransaction",
                txn_id,
                txn.status,
                CommissionStatus::Failed,
            )
            .into());
        }

        debit_commission(&mut tx, txn.user_id, txn.amount).await?;

        let txn = fetch_transaction(&mut tx, txn_id).await?;
        tx.commit().await?;

        info!(txn_id, user_id = txn.user_id, amount = %txn.amount, "Commission transaction failed");
        Ok(txn)
    }
}

// =============================================================================
// Connection-level helpers (usable inside a transaction)
// =============================================================================

/// Attributes `order` to the owner of `referral_code` on an open connection.
///
/// Shared by [`CommissionRepository::record_referral`] and checkout, so the
/// referral commits or rolls back together with the order.
pub(crate) async fn record_referral_in(
    conn: &mut SqliteConnection,
    order: &Order,
    referral_code: &str,
    commerce: &CommerceConfig,
) -> StoreResult<Option<CommissionTransaction>> {
    let code = validate_referral_code(referral_code)?;

    let Some(referrer) = find_by_referral_code(conn, &code).await? else {
        debug!(order_id = order.id, code = %code, "Unknown referral code, nothing recorded");
        return Ok(None);
    };

    let plan = plan_referral(order, &referrer, &code, commerce.referral_commission_bps)?;
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET referrer_id = ?1, referral_code = ?2, commission_amount = ?3,
            commission_type = ?4, updated_at = ?5
        WHERE id = ?6 AND referrer_id IS NULL
        "#,
    )
    .bind(plan.referrer_id)
    .bind(&plan.referral_code)
    .bind(plan.amount)
    .bind(plan.commission_type)
    .bind(now)
    .bind(plan.order_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(order_id = order.id, "Order attributed concurrently");
        return Err(CoreError::AlreadyReferred { order_id: order.id }.into());
    }

    let txn_id = sqlx::query(
        r#"
        INSERT INTO commission_transactions (user_id, order_id, amount, type, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(plan.referrer_id)
    .bind(plan.order_id)
    .bind(plan.amount)
    .bind(plan.commission_type)
    .bind(CommissionStatus::Pending)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let result = sqlx::query(
        r#"
        UPDATE users
        SET total_referrals = ?1, commission = commission + ?2, commission_tier = ?3
        WHERE id = ?4 AND total_referrals = ?5
        "#,
    )
    .bind(plan.total_referrals)
    .bind(plan.amount)
    .bind(plan.commission_tier)
    .bind(plan.referrer_id)
    .bind(referrer.total_referrals)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(referrer_id = referrer.id, "Referrer counters changed concurrently");
        return Err(CoreError::transition(
            "User",
            referrer.id,
            referrer.total_referrals,
            plan.total_referrals,
        )
        .into());
    }

    info!(
        order_id = plan.order_id,
        referrer_id = plan.referrer_id,
        txn_id,
        amount = %plan.amount,
        tier = ?plan.commission_tier,
        "Referral recorded"
    );

    fetch_transaction(conn, txn_id).await.map(Some)
}

/// Takes settled earnings off a user's unpaid balance.
pub(crate) async fn debit_commission(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Money,
) -> StoreResult<()> {
    sqlx::query("UPDATE users SET commission = commission - ?1 WHERE id = ?2")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub(crate) async fn fetch_transaction(
    conn: &mut SqliteConnection,
    id: i64,
) -> StoreResult<CommissionTransaction> {
    sqlx::query_as::<_, CommissionTransaction>(select_transactions!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::TransactionNotFound(id)))
}

async fn fetch_payout(conn: &mut SqliteConnection, id: i64) -> StoreResult<CommissionPayout> {
    sqlx::query_as::<_, CommissionPayout>(select_payouts!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::PayoutNotFound(id)))
}
