//! # User Repository
//!
//! Accounts, wholesale approval and negotiated prices.
//!
//! Referral codes and referrer links live with the commission ledger in
//! [`super::commission`], since that is where they are consumed.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use emporia_core::policy::{authorize, Operation};
use emporia_core::pricing::PRICING_TIERS;
use emporia_core::validation::{validate_email, validate_name, validate_price, validate_variant_label};
use emporia_core::{Actor, CoreError, Money, Role, User, ValidationError, WholesaleStatus};

use crate::error::{DbError, StoreError, StoreResult};

macro_rules! select_users {
    ($tail:literal) => {
        concat!(
            "SELECT id, email, name, role, wholesale_status, custom_pricing, commission, ",
            "commission_tier, total_referrals, referral_code, referrer_id, created_at ",
            "FROM users ",
            $tail
        )
    };
}

/// Fields a caller supplies when registering an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Registers an account.
    ///
    /// Wholesale accounts start `PENDING` and cannot place wholesale orders
    /// until an admin approves them.
    pub async fn register(&self, new_user: &NewUser) -> StoreResult<User> {
        let email = new_user.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_name(&new_user.name)?;

        let wholesale_status = match new_user.role {
            Role::Wholesale => Some(WholesaleStatus::Pending),
            _ => None,
        };

        debug!(email = %email, role = ?new_user.role, "Registering user");

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, name, role, wholesale_status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&email)
        .bind(new_user.name.trim())
        .bind(new_user.role)
        .bind(wholesale_status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("email", email.clone()),
            other => other,
        })?;

        let mut conn = self.pool.acquire().await?;
        let user = fetch_user(&mut conn, result.last_insert_rowid()).await?;

        info!(user_id = user.id, role = ?user.role, "User registered");
        Ok(user)
    }

    /// Gets a user by ID.
    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(select_users!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Gets a user by ID, failing with `UserNotFound`.
    pub async fn get(&self, id: i64) -> StoreResult<User> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }

    /// Resolves a referral code (case-insensitive).
    pub async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        find_by_referral_code(&mut conn, code).await
    }

    pub async fn list_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(select_users!("WHERE role = ?1 ORDER BY id"))
            .bind(role)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    /// Approves, rejects or blocks a wholesale account.
    pub async fn set_wholesale_status(
        &self,
        user_id: i64,
        status: WholesaleStatus,
        actor: &Actor,
    ) -> StoreResult<User> {
        authorize(Operation::ManageAccounts, actor)?;

        let mut tx = self.pool.begin().await?;
        let user = fetch_user(&mut tx, user_id).await?;

        if user.role != Role::Wholesale {
            return Err(ValidationError::Mismatch {
                field: "role".to_string(),
                expected: "WHOLESALE".to_string(),
                actual: format!("{:?}", user.role).to_uppercase(),
            }
            .into());
        }

        sqlx::query("UPDATE users SET wholesale_status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let user = fetch_user(&mut tx, user_id).await?;
        tx.commit().await?;

        info!(user_id, status = ?status, admin_id = actor.id, "Wholesale status changed");
        Ok(user)
    }

    /// Sets the negotiated unit price for one (flavor, strength, band).
    ///
    /// `tier_min` must be the lower bound of one of the quantity bands.
    pub async fn set_custom_price(
        &self,
        user_id: i64,
        flavor: &str,
        strength: &str,
        tier_min: i64,
        price: Money,
        actor: &Actor,
    ) -> StoreResult<User> {
        authorize(Operation::ManageAccounts, actor)?;
        validate_variant_label("flavor", flavor)?;
        validate_variant_label("strength", strength)?;
        validate_price("price", price)?;

        if !PRICING_TIERS.iter().any(|t| t.min == tier_min) {
            return Err(ValidationError::NotAllowed {
                field: "tier_min".to_string(),
                allowed: PRICING_TIERS.iter().map(|t| t.min.to_string()).collect(),
            }
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let mut user = fetch_user(&mut tx, user_id).await?;
        user.custom_pricing.set(flavor, strength, tier_min, price);

        sqlx::query("UPDATE users SET custom_pricing = ?1 WHERE id = ?2")
            .bind(Json(&user.custom_pricing))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(user_id, flavor, strength, tier_min, price = %price, "Custom price set");
        Ok(user)
    }
}

// =============================================================================
// Connection-level helpers (usable inside a transaction)
// =============================================================================

pub(crate) async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> StoreResult<User> {
    sqlx::query_as::<_, User>(select_users!("WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::Domain(CoreError::UserNotFound(id)))
}

pub(crate) async fn find_by_referral_code(
    conn: &mut SqliteConnection,
    code: &str,
) -> StoreResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(select_users!("WHERE referral_code = ?1"))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{admin_actor, db, user};
    use emporia_core::ErrorKind;

    #[tokio::test]
    async fn test_register_and_get() {
        let db = db().await;
        let created = user(&db, "Ana@Example.com", Role::Retail).await;

        assert_eq!(created.email, "ana@example.com");
        assert_eq!(created.commission, Money::ZERO);
        assert_eq!(created.wholesale_status, None);
        assert!(created.custom_pricing.is_empty());

        let fetched = db.users().get(created.id).await.unwrap();
        assert_eq!(fetched.email, created.email);
        assert!(db.users().get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let db = db().await;
        user(&db, "dup@example.com", Role::Retail).await;

        let err = db
            .users()
            .register(&NewUser {
                email: "dup@example.com".to_string(),
                name: "Again".to_string(),
                role: Role::Retail,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::Db(DbError::UniqueViolation { ref field, .. }) if field == "email"
        ));
    }

    #[tokio::test]
    async fn test_wholesale_starts_pending_then_approved() {
        let db = db().await;
        let shop = user(&db, "shop@example.com", Role::Wholesale).await;
        assert_eq!(shop.wholesale_status, Some(WholesaleStatus::Pending));
        assert!(!shop.actor().is_approved_wholesaler());

        let approved = db
            .users()
            .set_wholesale_status(shop.id, WholesaleStatus::Approved, &admin_actor())
            .await
            .unwrap();
        assert!(approved.actor().is_approved_wholesaler());
    }

    #[tokio::test]
    async fn test_wholesale_status_needs_admin_and_wholesale_role() {
        let db = db().await;
        let shop = user(&db, "shop@example.com", Role::Wholesale).await;
        let buyer = user(&db, "buyer@example.com", Role::Retail).await;

        let err = db
            .users()
            .set_wholesale_status(shop.id, WholesaleStatus::Approved, &buyer.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = db
            .users()
            .set_wholesale_status(buyer.id, WholesaleStatus::Approved, &admin_actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_custom_price_round_trips_through_json_column() {
        let db = db().await;
        let shop = user(&db, "shop@example.com", Role::Wholesale).await;

        db.users()
            .set_custom_price(shop.id, "Mint", "6mg", 100, Money::from_cents(750), &admin_actor())
            .await
            .unwrap();

        let stored = db.users().get(shop.id).await.unwrap();
        assert_eq!(
            stored.custom_pricing.lookup("mint", "6MG", 100),
            Some(Money::from_cents(750))
        );

        let err = db
            .users()
            .set_custom_price(shop.id, "Mint", "6mg", 150, Money::from_cents(750), &admin_actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
