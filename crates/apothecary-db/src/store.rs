//! # Storage Context
//!
//! The seam between the sale engine and persistence. The engine is generic
//! over [`SalesStore`]; production uses [`Database`], tests can also use
//! [`MemoryStore`](crate::memory::MemoryStore).
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store.begin() ──► SalesUnit                                           │
//! │                      │                                                  │
//! │                      ├── adjust_stock(id, -q)   guarded, never < 0     │
//! │                      ├── insert_sale(&sale)                             │
//! │                      ├── update_status(id, from, to, at)                │
//! │                      │                                                  │
//! │                      ├── commit()  ──► all effects visible at once     │
//! │                      └── drop      ──► nothing happened (rollback)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::{product, sale};
use apothecary_core::{Expense, Product, Sale, SaleFilter, SaleStatus, User};

/// Outcome of a guarded stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// Applied; `stock` is the new quantity on hand.
    Applied { stock: i64 },
    /// Not applied: the result would be negative.
    Insufficient { available: i64 },
    /// Not applied: no such product.
    Missing,
}

/// Read access plus the ability to open a unit of work.
pub trait SalesStore: Send + Sync {
    type Unit: SalesUnit;

    /// Resolves products by id. Unknown ids are absent from the result.
    fn find_products_by_ids(&self, ids: &[String]) -> impl Future<Output = DbResult<Vec<Product>>> + Send;

    fn find_sale(&self, sale_id: &str) -> impl Future<Output = DbResult<Option<Sale>>> + Send;

    /// Sales matching the filter, newest first.
    fn find_sales(&self, filter: &SaleFilter) -> impl Future<Output = DbResult<Vec<Sale>>> + Send;

    /// Looks up an actor in the user directory.
    fn find_cashier(&self, actor_id: &str) -> impl Future<Output = DbResult<Option<User>>> + Send;

    /// Expenses dated in `[since, until)`.
    fn find_expenses(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> impl Future<Output = DbResult<Vec<Expense>>> + Send;

    /// Opens a unit of work. Dropping it without `commit` discards it.
    fn begin(&self) -> impl Future<Output = DbResult<Self::Unit>> + Send;
}

/// A scoped, all-or-nothing unit of work.
pub trait SalesUnit: Send {
    fn adjust_stock(
        &mut self,
        product_id: &str,
        delta: i64,
    ) -> impl Future<Output = DbResult<StockAdjustment>> + Send;

    fn insert_sale(&mut self, sale: &Sale) -> impl Future<Output = DbResult<()>> + Send;

    /// Returns false when the sale is not currently in `from`.
    fn update_status(
        &mut self,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = DbResult<bool>> + Send;

    fn commit(self) -> impl Future<Output = DbResult<()>> + Send;
}

// =============================================================================
// SQLite
// =============================================================================

/// A SQLite transaction. Rolled back by sqlx when dropped uncommitted.
#[derive(Debug)]
pub struct SqliteUnit {
    tx: Transaction<'static, Sqlite>,
}

impl SalesStore for Database {
    type Unit = SqliteUnit;

    async fn find_products_by_ids(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        self.products().get_by_ids(ids).await
    }

    async fn find_sale(&self, sale_id: &str) -> DbResult<Option<Sale>> {
        self.sales().get_by_id(sale_id).await
    }

    async fn find_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        self.sales().list(filter).await
    }

    async fn find_cashier(&self, actor_id: &str) -> DbResult<Option<User>> {
        self.users().get_by_id(actor_id).await
    }

    async fn find_expenses(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Expense>> {
        self.expenses().list(since, until).await
    }

    async fn begin(&self) -> DbResult<SqliteUnit> {
        let tx = self.pool().begin().await?;
        Ok(SqliteUnit { tx })
    }
}

impl SalesUnit for SqliteUnit {
    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> DbResult<StockAdjustment> {
        product::adjust_stock(&mut self.tx, product_id, delta).await
    }

    async fn insert_sale(&mut self, sale: &Sale) -> DbResult<()> {
        sale::insert(&mut self.tx, sale).await
    }

    async fn update_status(
        &mut self,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        sale::update_status(&mut self.tx, sale_id, from, to, at).await
    }

    async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
