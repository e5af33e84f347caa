//! # Sale Repository
//!
//! Persistence for the sale ledger: sales and their snapshot line items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMMIT (inside the engine's transaction)                           │
//! │     └── insert() → sales row { status: completed } + sale_items rows  │
//! │                                                                         │
//! │  2. (OPTIONAL) RETRACT (inside the engine's transaction)               │
//! │     └── update_status(completed → retracted)                           │
//! │         guarded by the current status, so only one retraction wins    │
//! │                                                                         │
//! │  Rows are never deleted.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use apothecary_core::{PaymentMethod, Sale, SaleFilter, SaleLineItem, SaleStatus};

const SALE_COLUMNS: &str =
    "id, cashier_id, total_amount_minor, payment_method, status, created_at, retracted_at";

#[derive(Debug, FromRow)]
struct SaleRow {
    id: String,
    cashier_id: String,
    total_amount_minor: i64,
    payment_method: PaymentMethod,
    status: SaleStatus,
    created_at: DateTime<Utc>,
    retracted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct SaleItemRow {
    sale_id: String,
    product_id: String,
    name: String,
    sku: String,
    unit_price_minor: i64,
    base_price_minor: i64,
    quantity: i64,
    line_total_minor: i64,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleLineItem>) -> Sale {
        Sale {
            id: self.id,
            cashier_id: self.cashier_id,
            items,
            total_amount_minor: self.total_amount_minor,
            payment_method: self.payment_method,
            status: self.status,
            created_at: self.created_at,
            retracted_at: self.retracted_at,
        }
    }
}

impl From<SaleItemRow> for SaleLineItem {
    fn from(row: SaleItemRow) -> Self {
        SaleLineItem {
            product_id: row.product_id,
            name: row.name,
            sku: row.sku,
            unit_price_minor: row.unit_price_minor,
            base_price_minor: row.base_price_minor,
            quantity: row.quantity,
            line_total_minor: row.line_total_minor,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its line items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut items = self.load_items(&[row.id.clone()]).await?;
        let lines = items.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_sale(lines)))
    }

    /// Lists sales matching `filter`, newest first.
    ///
    /// Sales created in the same instant come back in reverse insertion order.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE 1 = 1"));
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(since) = filter.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            builder.push(" AND created_at < ").push_bind(until);
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = builder.build_query_as::<SaleRow>().fetch_all(&self.pool).await?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut items = self.load_items(&ids).await?;

        debug!(count = rows.len(), "Listed sales");

        Ok(rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_sale(lines)
            })
            .collect())
    }

    /// Counts sales by status (for diagnostics).
    pub async fn count(&self, status: SaleStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn load_items(&self, sale_ids: &[String]) -> DbResult<HashMap<String, Vec<SaleLineItem>>> {
        let mut grouped: HashMap<String, Vec<SaleLineItem>> = HashMap::new();
        if sale_ids.is_empty() {
            return Ok(grouped);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT sale_id, product_id, name, sku, unit_price_minor, base_price_minor, \
             quantity, line_total_minor FROM sale_items WHERE sale_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in sale_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY sale_id, line_no");

        let rows = builder.build_query_as::<SaleItemRow>().fetch_all(&self.pool).await?;
        for row in rows {
            grouped.entry(row.sale_id.clone()).or_default().push(row.into());
        }

        Ok(grouped)
    }
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Inserts a sale and its line items on the caller's connection.
pub(crate) async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, lines = sale.items.len(), total = %sale.total_amount(), "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, cashier_id, total_amount_minor, payment_method,
            status, created_at, retracted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.cashier_id)
    .bind(sale.total_amount_minor)
    .bind(sale.payment_method)
    .bind(sale.status)
    .bind(sale.created_at)
    .bind(sale.retracted_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in sale.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                sale_id, line_no, product_id, name, sku,
                unit_price_minor, base_price_minor, quantity, line_total_minor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(line_no as i64)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(&item.sku)
        .bind(item.unit_price_minor)
        .bind(item.base_price_minor)
        .bind(item.quantity)
        .bind(item.line_total_minor)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Moves a sale from `from` to `to`. Returns false if the sale was not in
/// `from` (already transitioned, or absent).
pub(crate) async fn update_status(
    conn: &mut SqliteConnection,
    sale_id: &str,
    from: SaleStatus,
    to: SaleStatus,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(id = %sale_id, from = %from, to = %to, "Transitioning sale");

    let result = sqlx::query(
        r#"
        UPDATE sales SET
            status = ?3,
            retracted_at = CASE WHEN ?3 = 'retracted' THEN ?4 ELSE retracted_at END
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(sale_id)
    .bind(from)
    .bind(to)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
