//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Rule check (emporia-core)         │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (infrastructure)            CoreError (domain)                │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │                 StoreError ← what every repository method returns       │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │            StoreError::kind() → caller picks a response                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use emporia_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Registering an email twice
    /// - Referral code collision
    /// - A second commission row for the same order
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Order item referencing a product that doesn't exist
    /// - Inventory row for an unknown distributor
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (the schema's last line of defense on
    /// money and quantity invariants).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored data could not be decoded (bad enum text, malformed JSON).
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::ColumnDecode   → DbError::Decode
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
/// `RowNotFound` never reaches here in practice: repositories use
/// `fetch_optional` and raise the entity's own not-found error.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error messages for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                // CHECK constraint: "CHECK constraint failed: <expr>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::Decode(err.to_string())
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Store Error
// =============================================================================

/// What repository operations return: a broken business rule or a
/// broken database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl StoreError {
    /// Classifies the error so callers can branch without matching
    /// every variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Domain(err) => err.kind(),
            StoreError::Db(_) => ErrorKind::Infrastructure,
        }
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            StoreError::Domain(err) => Some(err),
            StoreError::Db(_) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Db(err.into())
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Domain(err.into())
    }
}

/// Result type for repository operations.
pub type StoreResult<T> = Result<T, StoreError>;
