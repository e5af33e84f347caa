//! # In-Memory Store
//!
//! A [`SalesStore`] kept entirely in process memory. Used as the injected
//! storage context in engine tests and for demos without a database file.
//!
//! ## Isolation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  begin()  ── locks the whole state (tokio Mutex, owned guard)          │
//! │     │       and works on a private copy                                │
//! │     ▼                                                                   │
//! │  adjust_stock / insert_sale / update_status  → copy only               │
//! │     │                                                                   │
//! │     ├── commit() → copy replaces the state, lock released              │
//! │     └── drop     → copy discarded, lock released                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Units are serialized, so concurrent commits observe each other's effects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::store::{SalesStore, SalesUnit, StockAdjustment};
use apothecary_core::{Expense, Product, Sale, SaleFilter, SaleStatus, User};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<String, Product>,
    /// Insertion order.
    sales: Vec<Sale>,
    users: HashMap<String, User>,
    expenses: Vec<Expense>,
}

/// In-memory storage context. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_commits: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Creates a store holding `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = MemoryState {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..MemoryState::default()
        };
        MemoryStore {
            state: Arc::new(Mutex::new(state)),
            failing_commits: Arc::default(),
        }
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id.clone(), product);
    }

    /// Removes a product, as a hard delete in the back office would.
    pub async fn remove_product(&self, product_id: &str) -> Option<Product> {
        self.state.lock().await.products.remove(product_id)
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }

    pub async fn insert_expense(&self, expense: Expense) {
        self.state.lock().await.expenses.push(expense);
    }

    /// Current quantity on hand, if the product exists.
    pub async fn stock(&self, product_id: &str) -> Option<i64> {
        self.state.lock().await.products.get(product_id).map(|p| p.stock)
    }

    /// Number of sales in the ledger, any status.
    pub async fn sale_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }

    /// Makes the next `n` commits fail with a transient `DbError::Busy`.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }
}

impl SalesStore for MemoryStore {
    type Unit = MemoryUnit;

    async fn find_products_by_ids(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn find_sale(&self, sale_id: &str) -> DbResult<Option<Sale>> {
        let state = self.state.lock().await;
        Ok(state.sales.iter().find(|s| s.id == sale_id).cloned())
    }

    async fn find_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let state = self.state.lock().await;
        let mut sales: Vec<Sale> = state
            .sales
            .iter()
            .rev()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        // Stable: ties keep reverse insertion order.
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sales)
    }

    async fn find_cashier(&self, actor_id: &str) -> DbResult<Option<User>> {
        Ok(self.state.lock().await.users.get(actor_id).cloned())
    }

    async fn find_expenses(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Expense>> {
        let state = self.state.lock().await;
        Ok(state
            .expenses
            .iter()
            .filter(|e| since.map_or(true, |t| e.expense_date >= t))
            .filter(|e| until.map_or(true, |t| e.expense_date < t))
            .cloned()
            .collect())
    }

    async fn begin(&self) -> DbResult<MemoryUnit> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnit {
            guard,
            working,
            failing_commits: Arc::clone(&self.failing_commits),
        })
    }
}

/// Unit of work over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    failing_commits: Arc<AtomicU32>,
}

impl SalesUnit for MemoryUnit {
    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> DbResult<StockAdjustment> {
        let Some(product) = self.working.products.get_mut(product_id) else {
            return Ok(StockAdjustment::Missing);
        };

        let next = product.stock + delta;
        if next < 0 {
            return Ok(StockAdjustment::Insufficient {
                available: product.stock,
            });
        }

        product.stock = next;
        product.updated_at = Utc::now();
        Ok(StockAdjustment::Applied { stock: next })
    }

    async fn insert_sale(&mut self, sale: &Sale) -> DbResult<()> {
        if self.working.sales.iter().any(|s| s.id == sale.id) {
            return Err(DbError::duplicate("sales.id", &sale.id));
        }
        self.working.sales.push(sale.clone());
        Ok(())
    }

    async fn update_status(
        &mut self,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let Some(sale) = self
            .working
            .sales
            .iter_mut()
            .find(|s| s.id == sale_id && s.status == from)
        else {
            return Ok(false);
        };

        sale.status = to;
        if to == SaleStatus::Retracted {
            sale.retracted_at = Some(at);
        }
        Ok(true)
    }

    async fn commit(mut self) -> DbResult<()> {
        let injected = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!("Injected commit failure");
            return Err(DbError::Busy("database is locked (injected)".to_string()));
        }

        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: id.to_string(),
            sku: id.to_uppercase(),
            category_id: None,
            base_price_minor: 100,
            price_minor: 200,
            stock,
            expiry_date: None,
            supplier: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_unit_isolated_until_commit() {
        let store = MemoryStore::with_products([product("a", 5)]);

        let mut unit = store.begin().await.unwrap();
        assert_eq!(
            unit.adjust_stock("a", -2).await.unwrap(),
            StockAdjustment::Applied { stock: 3 }
        );
        drop(unit);
        assert_eq!(store.stock("a").await, Some(5));

        let mut unit = store.begin().await.unwrap();
        unit.adjust_stock("a", -2).await.unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.stock("a").await, Some(3));
    }

    #[tokio::test]
    async fn test_adjust_stock_outcomes() {
        let store = MemoryStore::with_products([product("a", 5)]);
        let mut unit = store.begin().await.unwrap();

        assert_eq!(
            unit.adjust_stock("a", -6).await.unwrap(),
            StockAdjustment::Insufficient { available: 5 }
        );
        assert_eq!(unit.adjust_stock("ghost", 1).await.unwrap(), StockAdjustment::Missing);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_unit() {
        let store = MemoryStore::with_products([product("a", 5)]);
        store.fail_next_commits(1);

        let mut unit = store.begin().await.unwrap();
        unit.adjust_stock("a", -1).await.unwrap();
        let err = unit.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.stock("a").await, Some(5));

        let mut unit = store.begin().await.unwrap();
        unit.adjust_stock("a", -1).await.unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.stock("a").await, Some(4));
    }
}
