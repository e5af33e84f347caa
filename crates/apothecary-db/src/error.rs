//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── is_transient()? ──► SaleEngine retries the whole unit        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError::Storage ← Surfaced to the HTTP layer as a 5xx            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - Update/delete matched nothing
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting duplicate SKU
    /// - Duplicate username or category name
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing a non-existent category
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Input rejected by business-rule validation before reaching SQL.
    #[error("Invalid input: {0}")]
    Invalid(#[from] apothecary_core::ValidationError),

    /// CHECK constraint violation (e.g. stock would go negative).
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// The database is locked or busy with another writer.
    ///
    /// ## When This Occurs
    /// - Another connection holds the write lock past the busy timeout
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether retrying the same unit of work may succeed.
    ///
    /// Only contention is transient. Constraint and query errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze code/message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let busy = db_err.code().map_or(false, |c| is_busy_code(&c));

                // SQLite error messages for constraints:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                if busy || msg.contains("database is locked") || msg.contains("database table is locked") {
                    DbError::Busy(msg.to_string())
                } else if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Busy("database is locked".into()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::not_found("Sale", "x").is_transient());
        assert!(!DbError::CheckViolation("stock".into()).is_transient());
    }

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_code("5"));
        assert!(is_busy_code("6"));
        assert!(is_busy_code("517"));
        assert!(!is_busy_code("19"));
        assert!(!is_busy_code("not a code"));
    }

    #[test]
    fn test_pool_timeout_maps_to_exhausted() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted));
    }
}
