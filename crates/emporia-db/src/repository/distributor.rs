//! # Distributor Repository
//!
//! Fulfillment fees owed to distributors and the stock they hold.
//!
//! Fees are written by [`super::order::OrderRepository::update_status`]
//! when an assigned order is delivered. This module reads and settles them.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use emporia_core::policy::{authorize, Operation};
use emporia_core::{
    Actor, CoreError, DistributorCommission, DistributorCommissionStatus, DistributorInventory,
    Role, ValidationError,
};

use crate::error::{StoreError, StoreResult};
use crate::repository::product::fetch_active_product;
use crate::repository::user::fetch_user;

macro_rules! select_commissions {
    ($tail:literal) => {
        concat!(
            "SELECT id, distributor_id, order_id, amount, status, paid_at, created_at ",
            "FROM distributor_commissions ",
            $tail
        )
    };
}

/// Repository for distributor fees and inventory.
#[derive(Debug, Clone)]
pub struct DistributorRepository {
    pool: SqlitePool,
}

impl DistributorRepository {
    /// Creates a new DistributorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DistributorRepository { pool }
    }

    /// Fees earned by a distributor, newest first.
    pub async fn list_commissions(
        &self,
        distributor_id: i64,
    ) -> StoreResult<Vec<DistributorCommission>> {
        let fees = sqlx::query_as::<_, DistributorCommission>(select_commissions!(
            "WHERE distributor_id = ?1 ORDER BY id DESC"
        ))
        .bind(distributor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fees)
    }

    /// Marks a fee as paid out.
    pub async fn mark_commission_paid(
        &self,
        id: i64,
        actor: &Actor,
    ) -> StoreResult<DistributorCommission> {
        authorize(Operation::PayDistributorCommission, actor)?;

        let mut tx = self.pool.begin().await?;
        let fee = fetch_commission(&mut tx, id).await?;

        let result = sqlx::query(
            r#"
            UPDATE distributor_commissions
            SET status = 'PAID', paid_at = ?1
            WHERE id = ?2 AND status = 'PENDING'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!(commission_id = id, status = ?fee.status, "Distributor commission not pending");
            return Err(CoreError::transition(
                "DistributorCommission",
                id,
                fee.status,
                DistributorCommissionStatus::Paid,
            )
            .into());
        }

        let fee = fetch_commission(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            commission_id = id,
            distributor_id = fee.distributor_id,
            amount = %fee.amount,
            "Distributor commission paid"
        );
        Ok(fee)
    }

    /// Sets the absolute stock a distributor holds of one product.
    pub async fn set_inventory(
        &self,
        distributor_id: i64,
        product_id: i64,
        quantity: i64,
        actor: &Actor,
    ) -> StoreResult<DistributorInventory> {
        authorize(Operation::ManageInventory, actor)?;
        if quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        check_stock_holder(&mut tx, distributor_id, product_id).await?;

        write_stock(&mut tx, distributor_id, product_id, quantity).await?;
        let row = fetch_stock(&mut tx, distributor_id, product_id).await?;
        tx.commit().await?;

        debug!(distributor_id, product_id, quantity, "Inventory set");
        Ok(row)
    }

    /// Adds `delta` (which may be negative) to a distributor's stock.
    ///
    /// Fails `InsufficientStock` when the result would go below zero.
    pub async fn adjust_inventory(
        &self,
        distributor_id: i64,
        product_id: i64,
        delta: i64,
        actor: &Actor,
    ) -> StoreResult<DistributorInventory> {
        authorize(Operation::ManageInventory, actor)?;

        let mut tx = self.pool.begin().await?;
        check_stock_holder(&mut tx, distributor_id, product_id).await?;

        let available: i64 = sqlx::query_scalar(
            "SELECT quantity FROM distributor_inventory WHERE distributor_id = ?1 AND product_id = ?2",
        )
        .bind(distributor_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        let quantity = available.checked_add(delta).ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
        if quantity < 0 {
            return Err(CoreError::InsufficientStock {
                product_id,
                available,
                requested: -delta,
            }
            .into());
        }

        write_stock(&mut tx, distributor_id, product_id, quantity).await?;
        let row = fetch_stock(&mut tx, distributor_id, product_id).await?;
        tx.commit().await?;

        info!(distributor_id, product_id, delta, quantity, "Inventory adjusted");
        Ok(row)
    }

    /// Everything a distributor holds.
    pub async fn get_inventory(&self, distributor_id: i64) -> StoreResult<Vec<DistributorInventory>> {
        let rows = sqlx::query_as::<_, DistributorInventory>(
            r#"
            SELECT distributor_id, product_id, quantity, updated_at
            FROM distributor_inventory
            WHERE distributor_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(distributor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

async fn fetch_commission(
    conn: &mut SqliteConnection,
    id: i64,
) -> StoreResult<DistributorCommission> {
    sqlx::query_as::<_, DistributorCommission>(select_commissions!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::DistributorCommissionNotFound(id)))
}

/// Stock rows belong to a DISTRIBUTOR account and a sellable product.
async fn check_stock_holder(
    conn: &mut SqliteConnection,
    distributor_id: i64,
    product_id: i64,
) -> StoreResult<()> {
    let distributor = fetch_user(conn, distributor_id).await?;
    if distributor.role != Role::Distributor {
        return Err(ValidationError::NotAllowed {
            field: "distributor_id".to_string(),
            allowed: vec!["a DISTRIBUTOR account".to_string()],
        }
        .into());
    }

    fetch_active_product(conn, product_id).await?;
    Ok(())
}

async fn write_stock(
    conn: &mut SqliteConnection,
    distributor_id: i64,
    product_id: i64,
    quantity: i64,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO distributor_inventory (distributor_id, product_id, quantity, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(distributor_id, product_id)
        DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
        "#,
    )
    .bind(distributor_id)
    .bind(product_id)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn fetch_stock(
    conn: &mut SqliteConnection,
    distributor_id: i64,
    product_id: i64,
) -> StoreResult<DistributorInventory> {
    let row = sqlx::query_as::<_, DistributorInventory>(
        r#"
        SELECT distributor_id, product_id, quantity, updated_at
        FROM distributor_inventory
        WHERE distributor_id = ?1 AND product_id = ?2
        "#,
    )
    .bind(distributor_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{admin_actor, db, product, retail_order, user};
    use emporia_core::{ErrorKind, Money, OrderStatus};

    #[tokio::test]
    async fn test_inventory_set_and_adjust() {
        let db = db().await;
        let admin = admin_actor();
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let mint = product(&db, "Mint").await;

        let row = db.distributors().set_inventory(courier.id, mint.id, 40, &admin).await.unwrap();
        assert_eq!(row.quantity, 40);

        let row = db.distributors().adjust_inventory(courier.id, mint.id, -15, &admin).await.unwrap();
        assert_eq!(row.quantity, 25);

        let err = db
            .distributors()
            .adjust_inventory(courier.id, mint.id, -26, &admin)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { available: 25, requested: 26, .. })
        ));

        let stock = db.distributors().get_inventory(courier.id).await.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].quantity, 25);
    }

    #[tokio::test]
    async fn test_inventory_rules() {
        let db = db().await;
        let admin = admin_actor();
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let buyer = user(&db, "buyer@example.com", Role::Retail).await;
        let mint = product(&db, "Mint").await;

        let err = db.distributors().set_inventory(courier.id, mint.id, -1, &admin).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db.distributors().set_inventory(buyer.id, mint.id, 5, &admin).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db
            .distributors()
            .set_inventory(courier.id, mint.id, 5, &courier.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        // Adjusting an empty slot upward creates it
        let row = db.distributors().adjust_inventory(courier.id, mint.id, 3, &admin).await.unwrap();
        assert_eq!(row.quantity, 3);

        let err = db
            .distributors()
            .adjust_inventory(courier.id, mint.id, i64::MAX, &admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(db.distributors().get_inventory(courier.id).await.unwrap()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_mark_commission_paid_once() {
        let db = db().await;
        let admin = admin_actor();
        let courier = user(&db, "courier@example.com", Role::Distributor).await;
        let order = retail_order(&db, None, 5).await;

        db.orders().verify_payment(order.id, &admin).await.unwrap();
        db.orders().assign_to_distributor(order.id, courier.id, &admin).await.unwrap();
        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            db.orders().update_status(order.id, status, &admin).await.unwrap();
        }

        let fees = db.distributors().list_commissions(courier.id).await.unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].status, DistributorCommissionStatus::Pending);
        assert!(fees[0].amount > Money::ZERO);

        let paid = db.distributors().mark_commission_paid(fees[0].id, &admin).await.unwrap();
        assert_eq!(paid.status, DistributorCommissionStatus::Paid);
        assert!(paid.paid_at.is_some());

        let err = db
            .distributors()
            .mark_commission_paid(fees[0].id, &admin)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InvalidTransition { .. })));

        let err = db.distributors().mark_commission_paid(999, &admin).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
