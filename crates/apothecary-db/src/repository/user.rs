//! # User Repository
//!
//! The staff directory. Holds display metadata only (username, role); the
//! authentication layer owns credentials and hands the engine an opaque
//! actor id, which is this table's `id`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use apothecary_core::validation::validate_username;
use apothecary_core::{Role, User};

/// Repository for the user directory.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Adds a staff member.
    pub async fn create(&self, username: &str, role: Role) -> DbResult<User> {
        validate_username(username)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.trim().to_string(),
            role,
            created_at: Utc::now(),
        };

        debug!(username = %user.username, "Inserting user");

        sqlx::query("INSERT INTO users (id, username, role, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(user.role)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &user.username),
                other => other,
            })?;

        Ok(user)
    }

    /// Gets a user by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, role, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by username.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, role, created_at FROM users WHERE username = ?1",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Lists all users by username.
    pub async fn list(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, role, created_at FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
