//! # Commission Rules
//!
//! Referral commission math, attribution checks and the transaction /
//! payout state machines. The ledger itself lives in the database crate.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout with code ──► plan_referral() ──► ReferralPlan                │
//! │                          │                   amount = 5% of subtotal   │
//! │                          ├── self?     → SelfReferralNotAllowed        │
//! │                          └── attached? → AlreadyReferred               │
//! │                                                                         │
//! │  CommissionTransaction                                                  │
//! │    PENDING ──► PROCESSING ──► PAID        (batched into a payout)      │
//! │       │            │                                                    │
//! │       │            └──► PENDING           (payout failed, released)    │
//! │       ├──► PAID                           (settles a loan repayment)   │
//! │       └──► FAILED                         (admin write-off)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tiers Are Nominal
//! Users carry a [`CommissionTier`] that rises with their referral count and
//! has a published rate, but every commission is computed at the single
//! configured rate. The tier is display data until pricing of referrals is
//! reworked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CommissionStatus, CommissionTier, CommissionType, Order, User};

/// Length of generated referral codes.
pub const REFERRAL_CODE_LEN: usize = 8;

// =============================================================================
// Commission Math
// =============================================================================

/// Commission on a referred order's subtotal, half-up to the cent.
///
/// Retail and wholesale referrals earn the same rate today; the flag only
/// decides the [`CommissionType`] recorded next to the amount.
///
/// ```rust
/// use emporia_core::commission::compute_commission;
/// use emporia_core::money::Money;
///
/// let amount = compute_commission(Money::from_cents(500_000), true, 500);
/// assert_eq!(amount.to_decimal_string(), "250.00");
/// ```
pub fn compute_commission(subtotal: Money, _is_wholesale: bool, rate_bps: u32) -> Money {
    subtotal.percentage(rate_bps)
}

pub fn commission_type_for(is_wholesale: bool) -> CommissionType {
    if is_wholesale {
        CommissionType::WholesaleReferral
    } else {
        CommissionType::RetailReferral
    }
}

impl CommissionTier {
    /// Referral count at which the tier starts.
    pub const fn min_referrals(&self) -> i64 {
        match self {
            CommissionTier::Standard => 0,
            CommissionTier::Silver => 10,
            CommissionTier::Gold => 50,
            CommissionTier::Platinum => 100,
        }
    }

    /// Published rate for the tier. Not used in [`compute_commission`].
    pub const fn nominal_rate_bps(&self) -> u32 {
        match self {
            CommissionTier::Standard => 500,
            CommissionTier::Silver => 700,
            CommissionTier::Gold => 1_000,
            CommissionTier::Platinum => 1_200,
        }
    }

    pub fn for_referral_count(total_referrals: i64) -> Self {
        [
            CommissionTier::Platinum,
            CommissionTier::Gold,
            CommissionTier::Silver,
        ]
        .into_iter()
        .find(|tier| total_referrals >= tier.min_referrals())
        .unwrap_or(CommissionTier::Standard)
    }
}

// =============================================================================
// Attribution
// =============================================================================

/// What recording a referral will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralPlan {
    pub order_id: i64,
    pub referrer_id: i64,
    pub referral_code: String,
    pub amount: Money,
    pub commission_type: CommissionType,
    /// Referrer's count and tier after this referral.
    pub total_referrals: i64,
    pub commission_tier: CommissionTier,
}

/// Checks that `referrer` may be credited for `order` and prices it.
pub fn plan_referral(
    order: &Order,
    referrer: &User,
    referral_code: &str,
    rate_bps: u32,
) -> CoreResult<ReferralPlan> {
    if order.user_id == Some(referrer.id) {
        return Err(CoreError::SelfReferralNotAllowed);
    }
    if order.referrer_id.is_some() {
        return Err(CoreError::AlreadyReferred { order_id: order.id });
    }

    let total_referrals = referrer.total_referrals + 1;

    Ok(ReferralPlan {
        order_id: order.id,
        referrer_id: referrer.id,
        referral_code: referral_code.to_string(),
        amount: compute_commission(order.subtotal, order.is_wholesale(), rate_bps),
        commission_type: commission_type_for(order.is_wholesale()),
        total_referrals,
        commission_tier: CommissionTier::for_referral_count(total_referrals),
    })
}

/// Registration-time referrer link.
pub fn check_referrer_link(user: &User, referrer: &User) -> CoreResult<()> {
    if user.id == referrer.id {
        return Err(CoreError::SelfReferralNotAllowed);
    }
    Ok(())
}

/// A fresh 8-character uppercase code. Uniqueness is the store's job.
pub fn generate_referral_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(REFERRAL_CODE_LEN)
        .collect::<String>()
        .to_ascii_uppercase()
}

// =============================================================================
// State Machines
// =============================================================================

/// Allowed moves for a commission transaction.
pub fn can_transition_transaction(from: CommissionStatus, to: CommissionStatus) -> bool {
    use CommissionStatus::*;

    matches!(
        (from, to),
        (Pending, Processing) | (Pending, Paid) | (Pending, Failed) | (Processing, Paid) | (Processing, Pending)
    )
}

pub fn check_transaction_transition(
    id: i64,
    from: CommissionStatus,
    to: CommissionStatus,
) -> CoreResult<()> {
    if can_transition_transaction(from, to) {
        Ok(())
    } else {
        Err(CoreError::transition("CommissionTransaction", id, from, to))
    }
}

/// A payout is created PROCESSING and settles exactly once.
pub fn check_payout_completion(
    id: i64,
    from: CommissionStatus,
    to: CommissionStatus,
) -> CoreResult<()> {
    match (from, to) {
        (CommissionStatus::Processing, CommissionStatus::Paid)
        | (CommissionStatus::Processing, CommissionStatus::Failed) => Ok(()),
        _ => Err(CoreError::transition("CommissionPayout", id, from, to)),
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Per-user referral dashboard numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_referrals: i64,
    /// Σ PAID transactions.
    #[ts(as = "String")]
    pub total_earnings: Money,
    /// Σ PENDING transactions.
    #[ts(as = "String")]
    pub pending_earnings: Money,
    #[ts(as = "Option<String>")]
    pub last_referral_date: Option<DateTime<Utc>>,
}

/// Admin-wide commission summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SystemSummary {
    #[ts(as = "String")]
    pub total_commission_paid: Money,
    #[ts(as = "String")]
    pub total_commission_pending: Money,
    /// Users with at least one referral.
    pub active_referrers: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::CustomPricing;
    use crate::types::{OrderStatus, OrderType, PaymentMethod, Role};

    fn user(id: i64, code: &str) -> User {
        User {
            id,
            email: format!("u{id}@emporia.test"),
            name: format!("User {id}"),
            role: Role::Retail,
            wholesale_status: None,
            custom_pricing: CustomPricing::new(),
            commission: Money::ZERO,
            commission_tier: CommissionTier::Standard,
            total_referrals: 0,
            referral_code: Some(code.to_string()),
            referrer_id: None,
            created_at: Utc::now(),
        }
    }

    fn order(id: i64, user_id: Option<i64>, subtotal: i64, order_type: OrderType) -> Order {
        Order {
            id,
            user_id,
            distributor_id: None,
            order_type,
            status: OrderStatus::Pending,
            subtotal: Money::from_cents(subtotal),
            shipping_cost: Money::ZERO,
            total: Money::from_cents(subtotal),
            payment_method: PaymentMethod::Invoice,
            referrer_id: None,
            referral_code: None,
            commission_amount: None,
            commission_type: None,
            commission_paid: false,
            wholesale_loan_id: None,
            is_consignment: false,
            consignment_status: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_compute_commission_flat_rate() {
        assert_eq!(
            compute_commission(Money::from_cents(500_000), true, 500),
            Money::from_cents(25_000)
        );
        assert_eq!(
            compute_commission(Money::from_cents(500_000), false, 500),
            Money::from_cents(25_000)
        );
        // 5% of $4.99 = 24.95 cents → 25
        assert_eq!(compute_commission(Money::from_cents(499), false, 500).cents(), 25);
    }

    #[test]
    fn test_plan_referral() {
        let referrer = user(7, "ABC123");
        let order = order(1, Some(2), 500_000, OrderType::Wholesale);

        let plan = plan_referral(&order, &referrer, "ABC123", 500).unwrap();
        assert_eq!(plan.amount, Money::from_cents(25_000));
        assert_eq!(plan.commission_type, CommissionType::WholesaleReferral);
        assert_eq!(plan.total_referrals, 1);
        assert_eq!(plan.referral_code, "ABC123");
    }

    #[test]
    fn test_self_referral_rejected() {
        let referrer = user(2, "SELF0001");
        let order = order(1, Some(2), 10_000, OrderType::Retail);
        assert!(matches!(
            plan_referral(&order, &referrer, "ABC123", 500),
            Err(CoreError::SelfReferralNotAllowed)
        ));
    }

    #[test]
    fn test_second_attribution_rejected() {
        let referrer = user(7, "ABC123");
        let mut order = order(1, None, 10_000, OrderType::Retail);
        order.referrer_id = Some(8);
        assert!(matches!(
            plan_referral(&order, &referrer, "ABC123", 500),
            Err(CoreError::AlreadyReferred { order_id: 1 })
        ));
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(CommissionTier::for_referral_count(0), CommissionTier::Standard);
        assert_eq!(CommissionTier::for_referral_count(9), CommissionTier::Standard);
        assert_eq!(CommissionTier::for_referral_count(10), CommissionTier::Silver);
        assert_eq!(CommissionTier::for_referral_count(50), CommissionTier::Gold);
        assert_eq!(CommissionTier::for_referral_count(250), CommissionTier::Platinum);
    }

    #[test]
    fn test_generated_codes() {
        let a = generate_referral_code();
        let b = generate_referral_code();
        assert_eq!(a.len(), REFERRAL_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_transaction_transitions() {
        use CommissionStatus::*;

        assert!(check_transaction_transition(1, Pending, Processing).is_ok());
        assert!(check_transaction_transition(1, Processing, Pending).is_ok());
        assert!(check_transaction_transition(1, Paid, Pending).is_err());
        assert!(check_transaction_transition(1, Failed, Paid).is_err());

        assert!(check_payout_completion(3, Processing, Paid).is_ok());
        assert!(check_payout_completion(3, Paid, Failed).is_err());
    }
}
