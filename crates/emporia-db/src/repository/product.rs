//! # Product Repository
//!
//! The catalog is deliberately small: pricing needs a flavor, a strength
//! and a retail list price, and nothing else.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use emporia_core::validation::{validate_name, validate_price, validate_variant_label};
use emporia_core::{CoreError, Money, Product};

use crate::error::{StoreError, StoreResult};

/// Fields a caller supplies when adding a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub flavor: String,
    pub strength: String,
    pub retail_price: Money,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.get_by_id(7).await?;
/// let catalog = repo.list_active().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product and returns it with its generated ID.
    pub async fn insert(&self, product: &NewProduct) -> StoreResult<Product> {
        validate_name(&product.name)?;
        validate_variant_label("flavor", &product.flavor)?;
        validate_variant_label("strength", &product.strength)?;
        validate_price("retail_price", product.retail_price)?;

        debug!(name = %product.name, flavor = %product.flavor, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (name, flavor, strength, retail_price, is_active)
            VALUES (?1, ?2, ?3, ?4, 1)
            "#,
        )
        .bind(&product.name)
        .bind(&product.flavor)
        .bind(&product.strength)
        .bind(product.retail_price)
        .execute(&self.pool)
        .await?;

        Ok(Product {
            id: result.last_insert_rowid(),
            name: product.name.clone(),
            flavor: product.flavor.clone(),
            strength: product.strength.clone(),
            retail_price: product.retail_price,
            is_active: true,
        })
    }

    /// Gets a product by ID, active or not.
    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, flavor, strength, retail_price, is_active FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products that can be added to a cart.
    pub async fn list_active(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, flavor, strength, retail_price, is_active
            FROM products
            WHERE is_active = 1
            ORDER BY name, flavor, strength
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Hides or restores a product. Existing orders keep their snapshot.
    pub async fn set_active(&self, id: i64, is_active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?1 WHERE id = ?2")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(id).into());
        }

        debug!(product_id = id, is_active, "Product visibility changed");
        Ok(())
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Loads a product that can still be sold.
pub(crate) async fn fetch_active_product(
    conn: &mut SqliteConnection,
    id: i64,
) -> StoreResult<Product> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, flavor, strength, retail_price, is_active FROM products WHERE id = ?1 AND is_active = 1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::Domain(CoreError::ProductNotFound(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, product};

    #[tokio::test]
    async fn test_insert_and_list() {
        let db = db().await;
        let mint = product(&db, "Mint").await;
        let berry = product(&db, "Berry").await;

        assert_eq!(db.products().count().await.unwrap(), 2);

        let fetched = db.products().get_by_id(mint.id).await.unwrap().unwrap();
        assert_eq!(fetched.flavor, "Mint");
        assert_eq!(fetched.retail_price, Money::from_cents(499));

        db.products().set_active(berry.id, false).await.unwrap();
        let active = db.products().list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, mint.id);
    }

    #[tokio::test]
    async fn test_inactive_product_is_not_sellable() {
        let db = db().await;
        let mint = product(&db, "Mint").await;
        db.products().set_active(mint.id, false).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = fetch_active_product(&mut conn, mint.id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_set_active_unknown_product() {
        let db = db().await;
        let err = db.products().set_active(42, false).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::ProductNotFound(42))));
    }
}
