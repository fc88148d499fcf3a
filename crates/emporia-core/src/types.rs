//! # Domain Types
//!
//! Core domain types used throughout Emporia.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │      User       │   │      Order      │   │ CommissionTransaction│  │
//! │  │  role           │◄──│  user_id        │◄──│  order_id (unique)  │   │
//! │  │  referral_code  │   │  distributor_id │   │  user_id (earner)   │   │
//! │  │  commission     │   │  status         │   │  amount, status     │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │          ▲                      ▲                                       │
//! │          │                      │                                       │
//! │  ┌───────┴─────────┐   ┌────────┴────────────┐   ┌─────────────────┐   │
//! │  │ WholesaleLoan   │   │DistributorCommission│   │DistributorInv.  │   │
//! │  │  amount         │   │  5% of order total  │   │  quantity >= 0  │   │
//! │  │  remaining      │   └─────────────────────┘   └─────────────────┘   │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every stored entity has an `i64` row id assigned by the database. Orders
//! are never deleted; the audit trail survives the owning account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::pricing::CustomPricing;

// =============================================================================
// Roles & Accounts
// =============================================================================

/// What kind of account a user holds. Closed set: every permission check
/// dispatches on this through [`crate::policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Retail,
    Wholesale,
    Distributor,
}

/// Approval state of a wholesale account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WholesaleStatus {
    Pending,
    Approved,
    Rejected,
    Blocked,
}

/// Nominal referral tier attached to a user.
///
/// See [`crate::commission`] for why the tier does not change the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionTier {
    Standard,
    Silver,
    Gold,
    Platinum,
}

impl Default for CommissionTier {
    fn default() -> Self {
        CommissionTier::Standard
    }
}

/// The authenticated caller, as handed over by the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub wholesale_status: Option<WholesaleStatus>,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Actor {
            id,
            role,
            wholesale_status: None,
        }
    }

    /// An approved wholesale buyer.
    pub fn wholesaler(id: i64) -> Self {
        Actor {
            id,
            role: Role::Wholesale,
            wholesale_status: Some(WholesaleStatus::Approved),
        }
    }

    pub fn is_approved_wholesaler(&self) -> bool {
        self.role == Role::Wholesale && self.wholesale_status == Some(WholesaleStatus::Approved)
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub wholesale_status: Option<WholesaleStatus>,
    /// Per-(flavor, strength, tier) price overrides. Stored as JSON.
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub custom_pricing: CustomPricing,
    /// Unpaid referral earnings. Mirrors the PENDING/PROCESSING ledger rows.
    #[ts(as = "String")]
    pub commission: Money,
    pub commission_tier: CommissionTier,
    pub total_referrals: i64,
    pub referral_code: Option<String>,
    pub referrer_id: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The session view of this user.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
            wholesale_status: self.wholesale_status,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A sellable product. Only the fields pricing and inventory need.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub flavor: String,
    pub strength: String,
    /// Flat per-unit price for retail orders.
    #[ts(as = "String")]
    pub retail_price: Money,
    pub is_active: bool,
}

// =============================================================================
// Orders
// =============================================================================

/// Which storefront an order came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Retail,
    Wholesale,
}

/// Main order status. See [`crate::order`] for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Crypto,
    BankTransfer,
    Cod,
    Invoice,
    Loan,
}

impl PaymentMethod {
    /// Methods offered to each storefront.
    pub fn allowed_for(order_type: OrderType) -> &'static [PaymentMethod] {
        match order_type {
            OrderType::Retail => &[
                PaymentMethod::Card,
                PaymentMethod::Crypto,
                PaymentMethod::BankTransfer,
                PaymentMethod::Cod,
            ],
            OrderType::Wholesale => &[PaymentMethod::Invoice, PaymentMethod::Loan],
        }
    }
}

/// Admin approval state of a consignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsignmentStatus {
    PendingApproval,
    Approved,
    Rejected,
}

/// What the payment processor reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Succeeded,
    Pending,
    Failed,
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    /// None for guest checkout.
    pub user_id: Option<i64>,
    pub distributor_id: Option<i64>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    #[ts(as = "String")]
    pub subtotal: Money,
    #[ts(as = "String")]
    pub shipping_cost: Money,
    /// Always `subtotal + shipping_cost`.
    #[ts(as = "String")]
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub referrer_id: Option<i64>,
    pub referral_code: Option<String>,
    /// Fixed at attribution time; never recomputed.
    #[ts(as = "Option<String>")]
    pub commission_amount: Option<Money>,
    pub commission_type: Option<CommissionType>,
    pub commission_paid: bool,
    pub wholesale_loan_id: Option<i64>,
    pub is_consignment: bool,
    pub consignment_status: Option<ConsignmentStatus>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_wholesale(&self) -> bool {
        self.order_type == OrderType::Wholesale
    }

    pub fn has_referral(&self) -> bool {
        self.referrer_id.is_some()
    }
}

/// A line item frozen at checkout (snapshot pattern).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub flavor: String,
    pub strength: String,
    pub quantity: i64,
    #[ts(as = "String")]
    pub unit_price: Money,
    #[ts(as = "String")]
    pub line_total: Money,
}

// =============================================================================
// Commission Ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionType {
    RetailReferral,
    WholesaleReferral,
}

/// Status shared by commission transactions and payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

/// Commission earned on one referred order. Amount is immutable.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTransaction {
    pub id: i64,
    pub user_id: i64,
    pub order_id: i64,
    #[ts(as = "String")]
    pub amount: Money,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    pub commission_type: CommissionType,
    pub status: CommissionStatus,
    pub payout_id: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A batch payment of earned commission.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPayout {
    pub id: i64,
    pub user_id: i64,
    #[ts(as = "String")]
    pub amount: Money,
    pub status: CommissionStatus,
    pub payment_details: Option<String>,
    #[ts(as = "Option<String>")]
    pub processed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Distributors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributorCommissionStatus {
    Pending,
    Paid,
}

/// Fulfillment fee owed to the distributor of a delivered order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DistributorCommission {
    pub id: i64,
    pub distributor_id: i64,
    pub order_id: i64,
    #[ts(as = "String")]
    pub amount: Money,
    pub status: DistributorCommissionStatus,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Stock held by a distributor.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DistributorInventory {
    pub distributor_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Wholesale Loans
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepaymentType {
    ReferralEarnings,
    DirectPayment,
}

/// Credit extended to a wholesale buyer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WholesaleLoan {
    pub id: i64,
    pub wholesaler_id: i64,
    /// Original principal.
    #[ts(as = "String")]
    pub amount: Money,
    /// `0 <= remaining_amount <= amount`.
    #[ts(as = "String")]
    pub remaining_amount: Money,
    pub status: LoanStatus,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One payment applied to a loan.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LoanRepayment {
    pub id: i64,
    pub loan_id: i64,
    #[ts(as = "String")]
    pub amount: Money,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    pub repayment_type: RepaymentType,
    pub commission_transaction_id: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
