//! # Order Repository
//!
//! Checkout and the order lifecycle.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CHECKOUT                                                           │
//! │     └── create_order() → Order { status: Pending }                     │
//! │         (order + items + referral commission in one transaction)       │
//! │                                                                         │
//! │  2. PAYMENT                                                            │
//! │     └── verify_payment()   admin confirms an offline payment           │
//! │     └── confirm_payment()  processor callback                          │
//! │         → Paid (consignment orders need APPROVED first)                │
//! │                                                                         │
//! │  3. FULFILLMENT                                                        │
//! │     └── assign_to_distributor()   while Pending | Paid                 │
//! │     └── update_status() → Processing → Shipped → Delivered             │
//! │         (Delivered + distributor → DistributorCommission, once)        │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                  │
//! │     └── update_status(Cancelled) from any non-terminal status          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use emporia_core::cart::Cart;
use emporia_core::loan::check_loan_for_order;
use emporia_core::pricing::CustomPricing;
use emporia_core::order::{
    authorize_status_update, check_assignment, check_consignment_update, check_status_update,
    check_verify_payment, distributor_commission_for, payment_transition, plan_order,
    CheckoutOptions,
};
use emporia_core::{
    Actor, CommerceConfig, ConsignmentStatus, CoreError, DistributorCommissionStatus, Money,
    Order, OrderItem, OrderStatus, PaymentMethod, PaymentOutcome,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::commission::record_referral_in;
use crate::repository::loan::fetch_loan;
use crate::repository::product::fetch_active_product;
use crate::repository::user::fetch_user;

macro_rules! select_orders {
    ($tail:literal) => {
        concat!(
            "SELECT id, user_id, distributor_id, order_type, status, subtotal, shipping_cost, total, ",
            "payment_method, referrer_id, referral_code, commission_amount, commission_type, ",
            "commission_paid, wholesale_loan_id, is_consignment, consignment_status, ",
            "created_at, updated_at ",
            "FROM orders ",
            $tail
        )
    };
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    commerce: Arc<CommerceConfig>,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, commerce: Arc<CommerceConfig>) -> Self {
        OrderRepository { pool, commerce }
    }

    /// Places an order from a cart.
    ///
    /// ## What This Does
    /// 1. Re-reads the buyer so role, approval and overrides come from the store
    /// 2. Re-prices the cart from the stored catalog (minimum enforced here)
    /// 3. Checks storefront, payment method, loan link and consignment
    /// 4. Inserts the order and its item snapshot
    /// 5. Records the referral, if a code was given
    ///
    /// Only product ids and quantities are taken from the cart. All steps
    /// share one transaction; any failure leaves no trace.
    pub async fn create_order(
        &self,
        cart: &Cart,
        buyer: Option<&Actor>,
        payment_method: PaymentMethod,
        options: &CheckoutOptions,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;

        let buyer = match buyer {
            Some(actor) => Some(fetch_user(&mut tx, actor.id).await?),
            None => None,
        };

        let mut catalog = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            catalog.push(fetch_active_product(&mut tx, line.product_id).await?);
        }

        let no_overrides = CustomPricing::new();
        let custom_pricing = buyer.as_ref().map_or(&no_overrides, |u| &u.custom_pricing);
        let quote = cart.checkout_against(
            &catalog,
            custom_pricing,
            options.promo.as_ref(),
            &self.commerce,
        )?;

        let buyer = buyer.map(|u| u.actor());
        let draft = plan_order(quote, buyer.as_ref(), payment_method, options, &self.commerce)?;

        if let (Some(loan_id), Some(buyer_id)) = (draft.wholesale_loan_id, draft.user_id) {
            let loan = fetch_loan(&mut tx, loan_id).await?;
            check_loan_for_order(&loan, buyer_id)?;
        }

        let now = Utc::now();
        let order_id = sqlx::query(
            r#"
            INSERT INTO orders (
                user_id, order_type, status, subtotal, shipping_cost, total,
                payment_method, wholesale_loan_id, is_consignment, consignment_status,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?11
            )
            "#,
        )
        .bind(draft.user_id)
        .bind(draft.order_type)
        .bind(OrderStatus::Pending)
        .bind(draft.subtotal)
        .bind(draft.shipping_cost)
        .bind(draft.total)
        .bind(draft.payment_method)
        .bind(draft.wholesale_loan_id)
        .bind(draft.is_consignment)
        .bind(draft.consignment_status)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // Snapshot: later catalog edits never rewrite a placed order
        for line in &draft.lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, product_id, flavor, strength, quantity, unit_price, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.flavor)
            .bind(&line.strength)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.line_total)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(code) = options.referral_code.as_deref().filter(|c| !c.trim().is_empty()) {
            let order = fetch_order(&mut tx, order_id).await?;
            record_referral_in(&mut tx, &order, code, &self.commerce).await?;
        }

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(
            order_id,
            user_id = ?order.user_id,
            order_type = ?order.order_type,
            total = %order.total,
            items = draft.lines.len(),
            "Order placed"
        );
        Ok(order)
    }

    /// Admin confirmation of an offline payment: `PENDING → PAID`.
    pub async fn verify_payment(&self, order_id: i64, actor: &Actor) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;
        check_verify_payment(&order, actor)?;

        write_status(&mut tx, &order, OrderStatus::Paid, Utc::now()).await?;

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, admin_id = actor.id, "Payment verified");
        Ok(order)
    }

    /// Applies a payment processor callback.
    ///
    /// ## Outcomes
    /// - `Succeeded` with the exact total → `PAID`
    /// - `Pending` → unchanged
    /// - `Failed` → `CANCELLED`
    pub async fn confirm_payment(
        &self,
        order_id: i64,
        outcome: PaymentOutcome,
        amount: Money,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;

        let Some(to) = payment_transition(&order, outcome, amount)? else {
            debug!(order_id, "Payment still pending");
            return Ok(order);
        };

        write_status(&mut tx, &order, to, Utc::now()).await?;

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, outcome = ?outcome, status = ?order.status, "Payment callback applied");
        Ok(order)
    }

    /// Moves an order through fulfillment or cancels it.
    ///
    /// Reaching `DELIVERED` on an order with a distributor records the
    /// distributor's fee in the same transaction. The fee row is unique per
    /// order, so it is never written twice.
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        actor: &Actor,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;

        authorize_status_update(&order, actor)?;
        check_status_update(&order, new_status)?;

        let now = Utc::now();
        write_status(&mut tx, &order, new_status, now).await?;

        let fee = distributor_commission_for(&order, new_status, self.commerce.distributor_commission_bps);
        if let (Some(amount), Some(distributor_id)) = (fee, order.distributor_id) {
            let inserted = sqlx::query(
                r#"
                INSERT INTO distributor_commissions (distributor_id, order_id, amount, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(order_id) DO NOTHING
                "#,
            )
            .bind(distributor_id)
            .bind(order_id)
            .bind(amount)
            .bind(DistributorCommissionStatus::Pending)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                info!(order_id, distributor_id, amount = %amount, "Distributor commission recorded");
            }
        }

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, status = ?new_status, actor_id = actor.id, "Order status updated");
        Ok(order)
    }

    /// Admin decision on a consignment order. The main status is untouched.
    pub async fn set_consignment_status(
        &self,
        order_id: i64,
        status: ConsignmentStatus,
        actor: &Actor,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;
        check_consignment_update(&order, status, actor)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET consignment_status = ?1, updated_at = ?2
            WHERE id = ?3 AND consignment_status = 'PENDING_APPROVAL'
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(order_id, "Consignment decided concurrently");
            return Err(
                CoreError::transition("Consignment", order_id, order.consignment_status, status).into(),
            );
        }

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, consignment_status = ?status, "Consignment status updated");
        Ok(order)
    }

    /// Hands an order to a distributor while it is `PENDING` or `PAID`.
    pub async fn assign_to_distributor(
        &self,
        order_id: i64,
        distributor_id: i64,
        actor: &Actor,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = fetch_order(&mut tx, order_id).await?;
        let distributor = fetch_user(&mut tx, distributor_id).await?;
        check_assignment(&order, &distributor, actor)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET distributor_id = ?1, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
        )
        .bind(distributor_id)
        .bind(Utc::now())
        .bind(order_id)
        .bind(order.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(order_id, distributor_id, "Order moved before assignment");
            return Err(CoreError::InvalidTransition {
                entity: "Order",
                id: order_id,
                from: format!("{:?}", order.status),
                to: format!("assigned to distributor {distributor_id}"),
            }
            .into());
        }

        let order = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id, distributor_id, "Order assigned to distributor");
        Ok(order)
    }

    /// Gets an order by ID, failing with `OrderNotFound`.
    pub async fn get_order(&self, id: i64) -> StoreResult<Order> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    /// Gets the item snapshot of an order.
    pub async fn get_items(&self, order_id: i64) -> StoreResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, flavor, strength, quantity, unit_price, line_total
            FROM order_items
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Orders placed by a user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(select_orders!(
            "WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders assigned to a distributor, newest first.
    pub async fn list_for_distributor(&self, distributor_id: i64) -> StoreResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(select_orders!(
            "WHERE distributor_id = ?1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(distributor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Connection-level helpers (usable inside a transaction)
// =============================================================================

pub(crate) async fn fetch_order(conn: &mut SqliteConnection, id: i64) -> StoreResult<Order> {
    sqlx::query_as::<_, Order>(select_orders!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::OrderNotFound(id)))
}

/// Guarded status write: succeeds only if the order is still in the status
/// it was read with.
async fn write_status(
    conn: &mut SqliteConnection,
    order: &Order,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = ?1, updated_at = ?2
        WHERE id = ?3 AND status = ?4
        "#,
    )
    .bind(to)
    .bind(now)
    .bind(order.id)
    .bind(order.status)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(order_id = order.id, from = ?order.status, to = ?to, "Stale order status");
        return Err(CoreError::transition("Order", order.id, order.status, to).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{
        admin_actor, approved_wholesaler, db, product, retail_order, user,
    };
    use emporia_core::pricing::PromoDiscount;
    use emporia_core::{CommissionStatus, ErrorKind, OrderType, Role};

    #[tokio::test]
    async fn test_guest_retail_checkout() {
        let db = db().await;
        let order = retail_order(&db, None, 5).await;

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.order_type, OrderType::Retail);
        assert_eq!(order.user_id, None);
        assert_eq!(order.subtotal, Money::from_cents(2495));
        assert_eq!(order.shipping_cost, Money::from_cents(500));
        assert_eq!(order.total, Money::from_cents(2995));

        let items = db.orders().get_items(order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
        assert_eq!(items[0].line_total, Money::from_cents(2495));
    }

    #[tokio::test]
    async fn test_wholesale_checkout_at_first_band() {
        let db = db().await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let mint = product(&db, "Mint").await;

        let mut cart = Cart::wholesale(db.commerce(), shop.custom_pricing.clone());
        cart.add_item(&mint, 100).unwrap();

        let order = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Invoice, &CheckoutOptions::default())
            .await
            .unwrap();

        assert_eq!(order.order_type, OrderType::Wholesale);
        assert_eq!(order.subtotal, Money::from_cents(80_000));
        assert_eq!(order.total, Money::from_cents(80_000));

        let items = db.orders().get_items(order.id).await.unwrap();
        assert_eq!(items[0].unit_price, Money::from_cents(800));
        assert_eq!(db.orders().list_for_user(shop.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wholesale_needs_approval_and_a_wholesale_method() {
        let db = db().await;
        let pending = user(&db, "pending@example.com", Role::Wholesale).await;
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let mint = product(&db, "Mint").await;

        let mut cart = Cart::wholesale(db.commerce(), Default::default());
        cart.add_item(&mint, 100).unwrap();

        // The stored account decides, not the caller's claim
        let err = db
            .orders()
            .create_order(&cart, Some(&Actor::wholesaler(pending.id)), PaymentMethod::Invoice, &CheckoutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::WholesaleNotApproved { .. })));

        let err = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Card, &CheckoutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::PaymentMethodNotAllowed { .. })));

        assert!(db.orders().list_for_user(shop.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_below_minimum_is_rejected() {
        let db = db().await;
        let mint = product(&db, "Mint").await;
        let mut cart = Cart::retail(db.commerce(), None);
        cart.add_item(&mint, 4).unwrap();

        let err = db
            .orders()
            .create_order(&cart, None, PaymentMethod::Card, &CheckoutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::BelowMinimumOrder { total: 4, minimum: 5 })
        ));
    }

    #[tokio::test]
    async fn test_checkout_prices_from_stored_data() {
        let db = db().await;
        let admin = admin_actor();
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let mint = product(&db, "Mint").await;

        // An override the account does not hold is ignored
        let mut invented = CustomPricing::new();
        invented.set("Mint", "6mg", 100, Money::from_cents(1));
        let mut cart = Cart::wholesale(db.commerce(), invented);
        cart.add_item(&mint, 100).unwrap();
        let order = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Invoice, &CheckoutOptions::default())
            .await
            .unwrap();
        assert_eq!(order.subtotal, Money::from_cents(80_000));

        // A stored override applies even when the cart was built without it
        db.users()
            .set_custom_price(shop.id, "Mint", "6mg", 100, Money::from_cents(720), &admin)
            .await
            .unwrap();
        let mut cart = Cart::wholesale(db.commerce(), CustomPricing::new());
        cart.add_item(&mint, 100).unwrap();
        let order = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Invoice, &CheckoutOptions::default())
            .await
            .unwrap();
        assert_eq!(order.subtotal, Money::from_cents(72_000));
    }

    #[tokio::test]
    async fn test_client_returned_retail_cart_is_repriced() {
        let db = db().await;
        let mint = product(&db, "Mint").await;

        let mut cart = Cart::retail(db.commerce(), None);
        cart.add_item(&mint, 5).unwrap();
        let mut json = serde_json::to_value(&cart).unwrap();
        json["lines"][0]["listPrice"] = "0.01".into();
        json["promo"] = serde_json::json!({ "code": "FREE", "discountBps": 10_000 });
        let tampered: Cart = serde_json::from_value(json).unwrap();

        let order = db
            .orders()
            .create_order(&tampered, None, PaymentMethod::Card, &CheckoutOptions::default())
            .await
            .unwrap();
        assert_eq!(order.subtotal, Money::from_cents(2_495));

        let mut json = serde_json::to_value(&tampered).unwrap();
        json["minQuantity"] = 1.into();
        json["lines"][0]["quantity"] = 1.into();
        let tampered: Cart = serde_json::from_value(json).unwrap();
        let err = db
            .orders()
            .create_order(&tampered, None, PaymentMethod::Card, &CheckoutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::BelowMinimumOrder { total: 1, minimum: 5 })
        ));

        // Promotions come from the checkout options
        let options = CheckoutOptions {
            promo: Some(PromoDiscount {
                code: "WELCOME".to_string(),
                discount_bps: 1_000,
            }),
            ..Default::default()
        };
        let order = db
            .orders()
            .create_order(&cart, None, PaymentMethod::Card, &options)
            .await
            .unwrap();
        assert_eq!(order.subtotal, Money::from_cents(5 * 449));
    }

    #[tokio::test]
    async fn test_checkout_records_referral_atomically() {
        let db = db().await;
        let referrer = user(&db, "ref@example.com", Role::Retail).await;
        let code = db.commissions().ensure_referral_code(referrer.id).await.unwrap();
        let buyer = user(&db, "buyer@example.com", Role::Retail).await;
        let mint = product(&db, "Mint").await;

        let mut cart = Cart::retail(db.commerce(), None);
        cart.add_item(&mint, 20).unwrap();
        let options = CheckoutOptions {
            referral_code: Some(code.to_lowercase()),
            ..Default::default()
        };

        let order = db
            .orders()
            .create_order(&cart, Some(&buyer.actor()), PaymentMethod::Card, &options)
            .await
            .unwrap();
        assert_eq!(order.referrer_id, Some(referrer.id));
        assert_eq!(order.commission_amount, Some(Money::from_cents(499)));

        let txns = db.commissions().list_transactions(referrer.id).await.unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].status, CommissionStatus::Pending);

        // Using your own code aborts the whole checkout
        let own = db.commissions().ensure_referral_code(buyer.id).await.unwrap();
        let options = CheckoutOptions {
            referral_code: Some(own),
            ..Default::default()
        };
        let err = db
            .orders()
            .create_order(&cart, Some(&buyer.actor()), PaymentMethod::Card, &options)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::SelfReferralNotAllowed)));
        assert_eq!(db.orders().list_for_user(buyer.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_and_distributor_fee() {
        let db = db().await;
        let admin = admin_actor();
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let order = retail_order(&db, None, 10).await;

        db.orders().verify_payment(order.id, &admin).await.unwrap();
        db.orders()
            .assign_to_distributor(order.id, courier.id, &admin)
            .await
            .unwrap();

        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            db.orders()
                .update_status(order.id, status, &courier.actor())
                .await
                .unwrap();
        }

        let err = db
            .orders()
            .update_status(order.id, OrderStatus::Processing, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));

        // 10 x 4.99 + 5.00 = 54.90, 5% = 2.75 (half-up)
        let fees = db.distributors().list_commissions(courier.id).await.unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].amount, Money::from_cents(275));
        assert_eq!(db.orders().list_for_distributor(courier.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_distributor_only_moves_own_orders() {
        let db = db().await;
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let order = retail_order(&db, None, 5).await;
        db.orders().verify_payment(order.id, &admin_actor()).await.unwrap();

        let err = db
            .orders()
            .update_status(order.id, OrderStatus::Processing, &courier.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_status_update_cannot_mark_paid() {
        let db = db().await;
        let admin = admin_actor();
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let order = retail_order(&db, None, 5).await;
        db.orders().assign_to_distributor(order.id, courier.id, &admin).await.unwrap();

        for actor in [courier.actor(), admin] {
            let err = db
                .orders()
                .update_status(order.id, OrderStatus::Paid, &actor)
                .await
                .unwrap_err();
            assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
        }
        assert_eq!(db.orders().get_order(order.id).await.unwrap().status, OrderStatus::Pending);

        let order = db.orders().verify_payment(order.id, &admin).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_assignment_rules() {
        let db = db().await;
        let admin = admin_actor();
        let buyer = user(&db, "buyer@example.com", Role::Retail).await;
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let order = retail_order(&db, None, 5).await;

        let err = db
            .orders()
            .assign_to_distributor(order.id, buyer.id, &admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        db.orders().update_status(order.id, OrderStatus::Cancelled, &admin).await.unwrap();
        let err = db
            .orders()
            .assign_to_distributor(order.id, courier.id, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_consignment_gates_payment() {
        let db = db().await;
        let admin = admin_actor();
        let shop = approved_wholesaler(&db, "shop@example.com").await;
        let mint = product(&db, "Mint").await;

        let mut cart = Cart::wholesale(db.commerce(), Default::default());
        cart.add_item(&mint, 100).unwrap();
        let options = CheckoutOptions {
            is_consignment: true,
            ..Default::default()
        };
        let order = db
            .orders()
            .create_order(&cart, Some(&shop.actor()), PaymentMethod::Invoice, &options)
            .await
            .unwrap();
        assert_eq!(order.consignment_status, Some(ConsignmentStatus::PendingApproval));

        let err = db.orders().verify_payment(order.id, &admin).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));

        let order = db
            .orders()
            .set_consignment_status(order.id, ConsignmentStatus::Approved, &admin)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        let order = db.orders().verify_payment(order.id, &admin).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);

        let err = db
            .orders()
            .set_consignment_status(order.id, ConsignmentStatus::Rejected, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_payment_callbacks() {
        let db = db().await;
        let order = retail_order(&db, None, 5).await;

        let err = db
            .orders()
            .confirm_payment(order.id, PaymentOutcome::Succeeded, Money::from_cents(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let same = db
            .orders()
            .confirm_payment(order.id, PaymentOutcome::Pending, order.total)
            .await
            .unwrap();
        assert_eq!(same.status, OrderStatus::Pending);

        let paid = db
            .orders()
            .confirm_payment(order.id, PaymentOutcome::Succeeded, order.total)
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);

        let other = retail_order(&db, None, 5).await;
        let cancelled = db
            .orders()
            .confirm_payment(other.id, PaymentOutcome::Failed, Money::ZERO)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_stale_status_write_loses() {
        let db = db().await;
        let order = retail_order(&db, None, 5).await;
        let stale = db.orders().get_order(order.id).await.unwrap();

        db.orders().verify_payment(order.id, &admin_actor()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = write_status(&mut conn, &stale, OrderStatus::Paid, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_missing_order() {
        let db = db().await;
        let err = db.orders().get_order(404).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
