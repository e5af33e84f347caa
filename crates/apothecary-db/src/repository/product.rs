//! # Product Repository
//!
//! Database operations for the pharmacy inventory.
//!
//! ## Key Operations
//! - CRUD operations (hard delete, sales keep their snapshots)
//! - Name/SKU search for the POS product picker
//! - Batch lookup and conditional stock adjustment for the sale engine
//!
//! ## Conditional Stock Adjustment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                                │
//! │                                                                         │
//! │  ❌ WRONG: read-modify-write (lost updates, oversells)                 │
//! │     SELECT stock ...; UPDATE products SET stock = 7 WHERE id = ?       │
//! │                                                                         │
//! │  ✅ CORRECT: guarded delta                                             │
//! │     UPDATE products SET stock = stock + ?delta                         │
//! │     WHERE id = ? AND stock + ?delta >= 0                               │
//! │     RETURNING stock                                                    │
//! │                                                                         │
//! │  No row returned → either the product is gone or stock is short;      │
//! │  a follow-up SELECT tells the two apart.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::store::StockAdjustment;
use apothecary_core::validation::{validate_new_product, validate_stock};
use apothecary_core::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, name, sku, category_id, base_price_minor, price_minor, \
     stock, expiry_date, supplier, created_at, updated_at";

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.search("para", 20).await?;
/// let product = repo.get_by_sku("PC500").await?;
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

    /// Validates and inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with generated id and timestamps
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn create(&self, input: &NewProduct) -> DbResult<Product> {
        validate_new_product(input)?;

        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            name: input.name.trim().to_string(),
            sku: input.sku.trim().to_string(),
            category_id: input.category_id.clone(),
            base_price_minor: input.base_price_minor,
            price_minor: input.price_minor,
            stock: input.stock,
            expiry_date: input.expiry_date,
            supplier: input.supplier.clone(),
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, category_id,
                base_price_minor, price_minor, stock,
                expiry_date, supplier, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.category_id)
        .bind(product.base_price_minor)
        .bind(product.price_minor)
        .bind(product.stock)
        .bind(product.expiry_date)
        .bind(&product.supplier)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| with_sku(e.into(), &product.sku))?;

        Ok(product)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU (e.g. "PC500").
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Resolves many products in one query. Unknown ids are simply absent.
    pub async fn get_by_ids(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let products = builder.build_query_as::<Product>().fetch_all(&self.pool).await?;

        debug!(requested = ids.len(), found = products.len(), "Batch product lookup");
        Ok(products)
    }

    /// Lists products sorted by name, optionally within one category.
    pub async fn list(&self, category_id: Option<&str>) -> DbResult<Vec<Product>> {
        let products = match category_id {
            Some(category_id) => {
                let sql = format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE category_id = ?1 ORDER BY name"
                );
                sqlx::query_as::<_, Product>(&sql)
                    .bind(category_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name");
                sqlx::query_as::<_, Product>(&sql).fetch_all(&self.pool).await?
            }
        };

        Ok(products)
    }

    /// Searches products by name or SKU substring (case-insensitive).
    ///
    /// An empty query lists the first `limit` products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();

        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = format!("%{}%", escape_like(query));
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE name LIKE ?1 ESCAPE '\\' OR sku LIKE ?1 ESCAPE '\\' \
             ORDER BY name LIMIT ?2"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Replaces the editable fields of a product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The updated product
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, id: &str, input: &NewProduct) -> DbResult<Product> {
        validate_new_product(input)?;

        debug!(id = %id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                sku = ?3,
                category_id = ?4,
                base_price_minor = ?5,
                price_minor = ?6,
                stock = ?7,
                expiry_date = ?8,
                supplier = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.sku.trim())
        .bind(&input.category_id)
        .bind(input.base_price_minor)
        .bind(input.price_minor)
        .bind(input.stock)
        .bind(input.expiry_date)
        .bind(&input.supplier)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| with_sku(e.into(), input.sku.trim()))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Sets the quantity on hand after a stock count.
    pub async fn set_stock(&self, id: &str, stock: i64) -> DbResult<()> {
        validate_stock(stock)?;

        debug!(id = %id, stock = %stock, "Setting stock");

        let result = sqlx::query("UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(stock)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Deletes a product.
    ///
    /// Historical sales keep their line snapshots; retracting such a sale
    /// later is reported as inconsistent by the engine.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Applies `delta` to a product's stock unless it would go negative.
///
/// Runs on the caller's connection so it joins the open transaction.
pub(crate) async fn adjust_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
) -> DbResult<StockAdjustment> {
    debug!(product_id = %product_id, delta = %delta, "Adjusting stock");

    let updated: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET stock = stock + ?2, updated_at = ?3
        WHERE id = ?1 AND stock + ?2 >= 0
        RETURNING stock
        "#,
    )
    .bind(product_id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = updated {
        return Ok(StockAdjustment::Applied { stock });
    }

    let available: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(match available {
        Some(available) => StockAdjustment::Insufficient { available },
        None => StockAdjustment::Missing,
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

fn with_sku(err: DbError, sku: &str) -> DbError {
    match err {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: sku.to_string(),
        },
        other => other,
    }
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Unit Tests
// =============================================================================
