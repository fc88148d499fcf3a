//! # Order Lifecycle
//!
//! Checkout planning and every rule that decides whether an order may move.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   PENDING ──► PAID ──► PROCESSING ──► SHIPPED ──► DELIVERED             │
//! │      │          │          │             │                              │
//! │      └──────────┴──────────┴─────────────┴──────► CANCELLED             │
//! │                                                                         │
//! │   Consignment orders: PENDING ──► PAID only once consignment is        │
//! │   APPROVED (PENDING_APPROVAL ──► APPROVED | REJECTED, admin only).     │
//! │                                                                         │
//! │   DELIVERED + distributor assigned ──► DistributorCommission (once)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check here is pure; the database crate re-reads the order inside
//! its transaction, runs the check, then writes with a status guard.

use crate::cart::{CheckoutQuote, PricedLine};
use crate::config::CommerceConfig;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::policy::{authorize, Operation};
use crate::pricing::PromoDiscount;
use crate::types::{
    Actor, ConsignmentStatus, Order, OrderStatus, OrderType, PaymentMethod, PaymentOutcome, Role,
    User,
};

// =============================================================================
// Transitions
// =============================================================================

/// Pure transition table, ignoring consignment and roles.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match (from, to) {
        (Pending, Paid) | (Paid, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
        (Delivered, Cancelled) | (Cancelled, Cancelled) => false,
        (_, Cancelled) => true,
        _ => false,
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Delivered | OrderStatus::Cancelled)
}

/// Full transition check for one order, including the consignment gate.
pub fn check_transition(order: &Order, to: OrderStatus) -> CoreResult<()> {
    if !can_transition(order.status, to) {
        return Err(CoreError::transition("Order", order.id, order.status, to));
    }

    if to == OrderStatus::Paid
        && order.is_consignment
        && order.consignment_status != Some(ConsignmentStatus::Approved)
    {
        return Err(CoreError::transition("Order", order.id, order.status, to));
    }

    Ok(())
}

/// Transition check for fulfillment updates.
///
/// `PAID` is reached only through payment confirmation, never through a
/// fulfillment update.
pub fn check_status_update(order: &Order, to: OrderStatus) -> CoreResult<()> {
    if to == OrderStatus::Paid {
        return Err(CoreError::transition("Order", order.id, order.status, to));
    }

    check_transition(order, to)
}

/// Who may push an order through fulfillment.
pub fn authorize_status_update(order: &Order, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::UpdateOrderStatus, actor)?;

    if actor.role == Role::Distributor && order.distributor_id != Some(actor.id) {
        return Err(CoreError::Forbidden {
            operation: Operation::UpdateOrderStatus,
            role: actor.role,
        });
    }

    Ok(())
}

/// Admin confirmation of an offline payment.
pub fn check_verify_payment(order: &Order, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::VerifyPayment, actor)?;
    check_transition(order, OrderStatus::Paid)
}

/// Maps a processor callback to the status the order should take.
///
/// `Ok(None)` means the payment is still in flight and nothing changes.
pub fn payment_transition(
    order: &Order,
    outcome: PaymentOutcome,
    amount: Money,
) -> CoreResult<Option<OrderStatus>> {
    match outcome {
        PaymentOutcome::Pending => Ok(None),
        PaymentOutcome::Failed => {
            check_transition(order, OrderStatus::Cancelled)?;
            Ok(Some(OrderStatus::Cancelled))
        }
        PaymentOutcome::Succeeded => {
            if amount != order.total {
                return Err(ValidationError::Mismatch {
                    field: "payment amount".to_string(),
                    expected: order.total.to_decimal_string(),
                    actual: amount.to_decimal_string(),
                }
                .into());
            }
            check_transition(order, OrderStatus::Paid)?;
            Ok(Some(OrderStatus::Paid))
        }
    }
}

// =============================================================================
// Consignment & Assignment
// =============================================================================

/// Admin decision on a consignment order. Leaves the main status alone.
pub fn check_consignment_update(
    order: &Order,
    to: ConsignmentStatus,
    actor: &Actor,
) -> CoreResult<()> {
    authorize(Operation::SetConsignmentStatus, actor)?;

    let from = order.consignment_status;
    let allowed = order.is_consignment
        && from == Some(ConsignmentStatus::PendingApproval)
        && matches!(to, ConsignmentStatus::Approved | ConsignmentStatus::Rejected);

    if !allowed {
        return Err(CoreError::transition("Consignment", order.id, from, to));
    }

    Ok(())
}

/// Statuses in which an order may still be handed to a distributor.
pub const ASSIGNABLE_STATUSES: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Paid];

pub fn check_assignment(order: &Order, distributor: &User, actor: &Actor) -> CoreResult<()> {
    authorize(Operation::AssignDistributor, actor)?;

    if distributor.role != Role::Distributor {
        return Err(ValidationError::NotAllowed {
            field: "distributor_id".to_string(),
            allowed: vec!["a DISTRIBUTOR account".to_string()],
        }
        .into());
    }

    if !ASSIGNABLE_STATUSES.contains(&order.status) {
        return Err(CoreError::InvalidTransition {
            entity: "Order",
            id: order.id,
            from: format!("{:?}", order.status),
            to: format!("assigned to distributor {}", distributor.id),
        });
    }

    Ok(())
}

/// Fulfillment fee owed when this transition completes, if any.
pub fn distributor_commission_for(order: &Order, to: OrderStatus, rate_bps: u32) -> Option<Money> {
    match (to, order.distributor_id) {
        (OrderStatus::Delivered, Some(_)) => Some(order.total.percentage(rate_bps)),
        _ => None,
    }
}

// =============================================================================
// Checkout Planning
// =============================================================================

/// Extras a buyer can attach at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    pub referral_code: Option<String>,
    /// Retail promotion, as resolved by the storefront from its own records.
    pub promo: Option<PromoDiscount>,
    pub wholesale_loan_id: Option<i64>,
    pub is_consignment: bool,
}

/// Everything needed to insert an order, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: Option<i64>,
    pub order_type: OrderType,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub wholesale_loan_id: Option<i64>,
    pub is_consignment: bool,
    pub consignment_status: Option<ConsignmentStatus>,
    pub lines: Vec<PricedLine>,
}

/// Turns a checked-out cart into an order draft.
///
/// ## Rules
/// - Guests may only place retail orders
/// - Wholesale orders need an APPROVED wholesale account
/// - The payment method must belong to the storefront
/// - `LOAN` payments name the loan; nothing else may
/// - Consignment is a wholesale arrangement
pub fn plan_order(
    quote: CheckoutQuote,
    buyer: Option<&Actor>,
    payment_method: PaymentMethod,
    options: &CheckoutOptions,
    config: &CommerceConfig,
) -> CoreResult<OrderDraft> {
    let order_type = quote.order_type;

    match (order_type, buyer) {
        (OrderType::Wholesale, None) => {
            return Err(ValidationError::Required {
                field: "user".to_string(),
            }
            .into());
        }
        (OrderType::Wholesale, Some(actor)) => {
            authorize(Operation::PlaceWholesaleOrder, actor)?;
            if !actor.is_approved_wholesaler() {
                return Err(CoreError::WholesaleNotApproved { user_id: actor.id });
            }
        }
        (OrderType::Retail, Some(actor)) => authorize(Operation::PlaceRetailOrder, actor)?,
        (OrderType::Retail, None) => {}
    }

    if !PaymentMethod::allowed_for(order_type).contains(&payment_method) {
        return Err(CoreError::PaymentMethodNotAllowed {
            method: format!("{:?}", payment_method),
            order_type: format!("{:?}", order_type),
        });
    }

    match (payment_method, options.wholesale_loan_id) {
        (PaymentMethod::Loan, None) => {
            return Err(ValidationError::Required {
                field: "wholesale_loan_id".to_string(),
            }
            .into());
        }
        (method, Some(_)) if method != PaymentMethod::Loan => {
            return Err(ValidationError::NotAllowed {
                field: "wholesale_loan_id".to_string(),
                allowed: vec!["LOAN payments".to_string()],
            }
            .into());
        }
        _ => {}
    }

    if options.is_consignment && order_type != OrderType::Wholesale {
        return Err(ValidationError::NotAllowed {
            field: "is_consignment".to_string(),
            allowed: vec!["WHOLESALE orders".to_string()],
        }
        .into());
    }

    let shipping_cost = config.shipping_for(order_type);

    Ok(OrderDraft {
        user_id: buyer.map(|a| a.id),
        order_type,
        subtotal: quote.subtotal,
        shipping_cost,
        total: quote.subtotal + shipping_cost,
        payment_method,
        wholesale_loan_id: options.wholesale_loan_id,
        is_consignment: options.is_consignment,
        consignment_status: options
            .is_consignment
            .then_some(ConsignmentStatus::PendingApproval),
        lines: quote.lines,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
