//! # Database Migrations
//!
//! Embedded schema migrations for the pharmacy database.
//!
//! ## Migration Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new()                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run_migrations(&pool)                                                 │
//! │       │                                                                 │
//! │       ├── _sqlx_migrations exists? ── no ──► create it                 │
//! │       │                                                                 │
//! │       ├── for each embedded file not yet applied:                      │
//! │       │       run in a transaction, record checksum                    │
//! │       ▼                                                                 │
//! │  Schema current                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql` (e.g., `002_add_batches.sql`)
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the workspace `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent: safe to run multiple times.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)`, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}
