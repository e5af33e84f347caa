//! # Sale Transaction Engine
//!
//! Commits and retracts sales against live inventory. Every mutation runs as
//! one unit of work on the injected [`SalesStore`]: either the stock changes
//! and the ledger change all happen, or none of them do.
//!
//! ## commit_sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  normalize_lines()            empty / bad qty      → InvalidRequest     │
//! │       │                                                                 │
//! │  ┌────▼──────────────── attempt (retried on transient errors) ───────┐  │
//! │  │ find_products_by_ids()     one batch lookup                       │  │
//! │  │ plan_sale()                missing → NotFound, short → Insufficient│  │
//! │  │ begin()                                                           │  │
//! │  │   adjust_stock(-q) × n     guarded; a lost race aborts the unit   │  │
//! │  │   insert_sale()                                                    │  │
//! │  │ commit()                                                          │  │
//! │  └────┬──────────────────────────────────────────────────────────────┘  │
//! │       ▼                                                                 │
//! │  SaleReceipt { sale, cashier }                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## retract_sale
//! ```text
//! find_sale ── absent → NotFound, retracted → InvalidState
//!     │
//! begin → update_status(completed → retracted)   lost race → InvalidState
//!       → adjust_stock(+q) × n                   product gone → Inconsistent
//!       → commit
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::store::{SalesStore, SalesUnit, StockAdjustment};
use apothecary_core::sale::{
    commit_deltas, normalize_lines, plan_retraction, plan_sale, required_product_ids, SaleDraft,
    SaleLineRequest,
};
use apothecary_core::validation::validate_actor_id;
use apothecary_core::{
    CashierInfo, CoreError, ErrorKind, PaymentMethod, Product, Sale, SaleFilter, SaleReceipt,
    SaleStatus, SalesReport,
};

// =============================================================================
// Errors
// =============================================================================

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected by a business rule. Nothing was changed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failed. The unit of work was rolled back.
    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),
}

impl EngineError {
    /// Business error category, `None` for storage failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Core(err) => Some(err.kind()),
            EngineError::Storage(_) => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Storage(err) if err.is_transient())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Retry Policy
// =============================================================================

/// How often a unit of work is re-run after a transient storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Linear backoff step: the n-th retry waits `n × backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The Sale Transaction Engine.
///
/// ## Usage
/// ```rust,ignore
/// let engine = SaleEngine::new(db.clone()).with_retry_policy(config.retry_policy());
///
/// let receipt = engine
///     .commit_sale(&actor_id, &[SaleLineRequest::new(&product_id, 2)], PaymentMethod::Cash)
///     .await?;
/// engine.retract_sale(&receipt.sale.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleEngine<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: SalesStore> SaleEngine<S> {
    pub fn new(store: S) -> Self {
        SaleEngine {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            ..retry
        };
        self
    }

    /// The storage context this engine runs against.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a sale and decrements stock for every line, atomically.
    ///
    /// Prices come from the inventory, never from the caller. Duplicate
    /// product ids in `items` are merged before stock is checked.
    ///
    /// ## Errors
    /// - `InvalidRequest` - empty cart, bad quantity, blank actor id
    /// - `NotFound` - an item references an unknown product
    /// - `InsufficientStock` - a line asks for more than is on hand
    /// - `Storage` - persistence failed after retries; nothing was changed
    pub async fn commit_sale(
        &self,
        actor_id: &str,
        items: &[SaleLineRequest],
        payment_method: PaymentMethod,
    ) -> EngineResult<SaleReceipt> {
        validate_actor_id(actor_id).map_err(CoreError::from)?;
        let lines = normalize_lines(items)?;
        let sale_id = Uuid::new_v4().to_string();

        let sale = {
            let (sale_id, actor_id, lines) = (sale_id.as_str(), actor_id.trim(), lines.as_slice());
            self.with_retry("commit_sale", move || {
                self.try_commit(sale_id, actor_id, lines, payment_method)
            })
            .await?
        };

        info!(
            sale_id = %sale.id,
            cashier_id = %sale.cashier_id,
            lines = sale.items.len(),
            total = %sale.total_amount(),
            payment_method = %sale.payment_method,
            "Sale committed"
        );

        let cashier = self.cashier_info(&sale.cashier_id).await;
        Ok(SaleReceipt { sale, cashier })
    }

    async fn try_commit(
        &self,
        sale_id: &str,
        actor_id: &str,
        lines: &[SaleLineRequest],
        payment_method: PaymentMethod,
    ) -> EngineResult<Sale> {
        let ids = required_product_ids(lines);
        let products: HashMap<String, Product> = self
            .store
            .find_products_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let sale = plan_sale(
            SaleDraft {
                sale_id: sale_id.to_string(),
                cashier_id: actor_id,
                payment_method,
                created_at: Utc::now(),
                lines,
            },
            &products,
        )?;

        let mut unit = self.store.begin().await?;

        for (item, change) in sale.items.iter().zip(commit_deltas(&sale)) {
            match unit.adjust_stock(&change.product_id, change.delta).await? {
                StockAdjustment::Applied { stock } => {
                    debug!(product_id = %item.product_id, stock, "Stock decremented");
                }
                StockAdjustment::Insufficient { available } => {
                    debug!(product_id = %item.product_id, available, "Stock changed since lookup");
                    return Err(CoreError::InsufficientStock {
                        product_id: item.product_id.clone(),
                        sku: item.sku.clone(),
                        name: item.name.clone(),
                        available,
                        requested: item.quantity,
                    }
                    .into());
                }
                StockAdjustment::Missing => {
                    return Err(CoreError::ProductNotFound(item.product_id.clone()).into());
                }
            }
        }

        unit.insert_sale(&sale).await?;
        unit.commit().await?;

        Ok(sale)
    }

    /// Reverses a completed sale and restores its stock, atomically.
    ///
    /// ## Errors
    /// - `NotFound` - no such sale
    /// - `InvalidState` - the sale is already retracted
    /// - `Inconsistent` - a line's product no longer exists; nothing was changed
    pub async fn retract_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        let sale = self
            .with_retry("retract_sale", move || self.try_retract(sale_id))
            .await?;

        info!(
            sale_id = %sale.id,
            lines = sale.items.len(),
            total = %sale.total_amount(),
            "Sale retracted"
        );

        Ok(sale)
    }

    async fn try_retract(&self, sale_id: &str) -> EngineResult<Sale> {
        let mut sale = self
            .store
            .find_sale(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        let restorations = plan_retraction(&sale)?;
        let now = Utc::now();

        let mut unit = self.store.begin().await?;

        let transitioned = unit
            .update_status(&sale.id, SaleStatus::Completed, SaleStatus::Retracted, now)
            .await?;
        if !transitioned {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                current_status: SaleStatus::Retracted.to_string(),
            }
            .into());
        }

        for change in &restorations {
            match unit.adjust_stock(&change.product_id, change.delta).await? {
                StockAdjustment::Applied { stock } => {
                    debug!(product_id = %change.product_id, stock, "Stock restored");
                }
                StockAdjustment::Missing | StockAdjustment::Insufficient { .. } => {
                    error!(
                        sale_id = %sale.id,
                        product_id = %change.product_id,
                        "Cannot restore stock for retracted sale, product no longer exists"
                    );
                    return Err(CoreError::Inconsistent {
                        sale_id: sale.id.clone(),
                        product_id: change.product_id.clone(),
                    }
                    .into());
                }
            }
        }

        unit.commit().await?;

        sale.status = SaleStatus::Retracted;
        sale.retracted_at = Some(now);
        Ok(sale)
    }

    /// Lists sales, newest first.
    pub async fn list_sales(&self, filter: &SaleFilter) -> EngineResult<Vec<Sale>> {
        Ok(self.store.find_sales(filter).await?)
    }

    /// Gets one sale.
    pub async fn get_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        self.store
            .find_sale(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()).into())
    }

    /// Gets one sale with its cashier display metadata, for invoices.
    pub async fn get_sale_detail(&self, sale_id: &str) -> EngineResult<SaleReceipt> {
        let sale = self.get_sale(sale_id).await?;
        let cashier = self.cashier_info(&sale.cashier_id).await;
        Ok(SaleReceipt { sale, cashier })
    }

    /// Revenue and profit over sales created in `[since, until)`, net of
    /// expenses dated in the same period.
    pub async fn sales_report(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> EngineResult<SalesReport> {
        let filter = SaleFilter {
            status: None,
            since,
            until,
        };
        let sales = self.store.find_sales(&filter).await?;
        let expenses = self.store.find_expenses(since, until).await?;

        Ok(SalesReport::summarize(&sales, &expenses))
    }

    /// Resolves display metadata; never fails the caller.
    async fn cashier_info(&self, actor_id: &str) -> CashierInfo {
        match self.store.find_cashier(actor_id).await {
            Ok(Some(user)) => user.into(),
            Ok(None) => CashierInfo::unknown(actor_id),
            Err(err) => {
                warn!(actor_id = %actor_id, error = %err, "Cashier lookup failed");
                CashierInfo::unknown(actor_id)
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(err) if err.is_transient() && tries < self.retry.max_attempts => {
                    warn!(operation, attempt = tries, error = %err, "Transient storage failure, retrying");
                    tokio::time::sleep(self.retry.delay(tries)).await;
                    tries += 1;
                }
                result => return result,
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbResult;
    use crate::memory::{MemoryStore, MemoryUnit};
    use crate::{Database, DbConfig};
    use apothecary_core::{Expense, NewProduct, Role, User};

    fn new_product(sku: &str, price_minor: i64, stock: i64) -> NewProduct {
        NewProduct {
            name: format!("Product {sku}"),
            sku: sku.to_string(),
            category_id: None,
            base_price_minor: price_minor * 7 / 10,
            price_minor,
            stock,
            expiry_date: None,
            supplier: None,
        }
    }

    /// In-memory SQLite with A {stock 10, Rp5.000} and B {stock 5, Rp25.000}.
    async fn sqlite_engine() -> (SaleEngine<Database>, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.products().create(&new_product("A", 5000, 10)).await.unwrap();
        let b = db.products().create(&new_product("B", 25000, 5)).await.unwrap();
        (SaleEngine::new(db), a.id, b.id)
    }

    async fn stock(engine: &SaleEngine<Database>, id: &str) -> i64 {
        engine.store().products().get_by_id(id).await.unwrap().unwrap().stock
    }

    fn memory_product(id: &str, price_minor: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            sku: id.to_uppercase(),
            category_id: None,
            base_price_minor: price_minor / 2,
            price_minor,
            stock,
            expiry_date: None,
            supplier: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serves a fixed copy of one sale, as seen by a reader that loaded it
    /// before a concurrent retraction landed.
    struct StaleSale {
        inner: MemoryStore,
        snapshot: Sale,
    }

    impl SalesStore for StaleSale {
        type Unit = MemoryUnit;

        async fn find_products_by_ids(&self, ids: &[String]) -> DbResult<Vec<Product>> {
            self.inner.find_products_by_ids(ids).await
        }

        async fn find_sale(&self, sale_id: &str) -> DbResult<Option<Sale>> {
            Ok(Some(self.snapshot.clone()).filter(|s| s.id == sale_id))
        }

        async fn find_sales(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
            self.inner.find_sales(filter).await
        }

        async fn find_cashier(&self, actor_id: &str) -> DbResult<Option<User>> {
            self.inner.find_cashier(actor_id).await
        }

        async fn find_expenses(
            &self,
            since: Option<DateTime<Utc>>,
            until: Option<DateTime<Utc>>,
        ) -> DbResult<Vec<Expense>> {
            self.inner.find_expenses(since, until).await
        }

        async fn begin(&self) -> DbResult<MemoryUnit> {
            self.inner.begin().await
        }
    }

    /// Retracts `sale_id` twice concurrently; exactly one call may win.
    async fn retract_twice<S: SalesStore>(engine: &SaleEngine<S>, sale_id: &str) {
        let (first, second) = tokio::join!(engine.retract_sale(sale_id), engine.retract_sale(sale_id));

        let failures: Vec<EngineError> = [first, second].into_iter().filter_map(Result::err).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), Some(ErrorKind::InvalidState));
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_commit_retract_scenario() {
        let (engine, a, b) = sqlite_engine().await;

        let receipt = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 3), SaleLineRequest::new(&b, 5)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap();
        let sale = receipt.sale;
        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.total_amount_minor, 3 * 5000 + 5 * 25000);
        assert_eq!(stock(&engine, &a).await, 7);
        assert_eq!(stock(&engine, &b).await, 0);

        let err = engine
            .commit_sale("cashier1", &[SaleLineRequest::new(&b, 1)], PaymentMethod::Card)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));
        assert_eq!(stock(&engine, &a).await, 7);
        assert_eq!(stock(&engine, &b).await, 0);
        assert_eq!(engine.list_sales(&SaleFilter::all()).await.unwrap().len(), 1);
        assert_eq!(engine.store().sales().count(SaleStatus::Completed).await.unwrap(), 1);

        let retracted = engine.retract_sale(&sale.id).await.unwrap();
        assert_eq!(retracted.status, SaleStatus::Retracted);
        assert!(retracted.retracted_at.is_some());
        assert_eq!(stock(&engine, &a).await, 10);
        assert_eq!(stock(&engine, &b).await, 5);

        let err = engine.retract_sale(&sale.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
        assert_eq!(stock(&engine, &a).await, 10);
        assert_eq!(stock(&engine, &b).await, 5);

        let stored = engine.get_sale(&sale.id).await.unwrap();
        assert_eq!(stored.status, SaleStatus::Retracted);
        assert_eq!(stored.retracted_at, retracted.retracted_at);
        assert_eq!(engine.store().sales().count(SaleStatus::Completed).await.unwrap(), 0);
        assert_eq!(engine.store().sales().count(SaleStatus::Retracted).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let (engine, a, _) = sqlite_engine().await;

        let err = engine
            .commit_sale("cashier1", &[], PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

        let err = engine
            .commit_sale(" ", &[SaleLineRequest::new(&a, 1)], PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));
        assert!(engine.list_sales(&SaleFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_product_leaves_stock_untouched() {
        let (engine, a, _) = sqlite_engine().await;

        let err = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 2), SaleLineRequest::new("ghost", 1)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::ProductNotFound(ref id)) if id == "ghost"));
        assert_eq!(stock(&engine, &a).await, 10);
    }

    #[tokio::test]
    async fn test_partial_shortfall_rejects_whole_sale() {
        let (engine, a, b) = sqlite_engine().await;

        let err = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 2), SaleLineRequest::new(&b, 6)],
                PaymentMethod::Digital,
            )
            .await
            .unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            }) => {
                assert_eq!(product_id, b);
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stock(&engine, &a).await, 10);
    }

    #[tokio::test]
    async fn test_snapshot_survives_price_change() {
        let (engine, a, _) = sqlite_engine().await;

        let receipt = engine
            .commit_sale("cashier1", &[SaleLineRequest::new(&a, 2)], PaymentMethod::Cash)
            .await
            .unwrap();

        let mut edit = new_product("A", 9000, 8);
        edit.name = "Renamed".to_string();
        engine.store().products().update(&a, &edit).await.unwrap();

        let stored = engine.get_sale(&receipt.sale.id).await.unwrap();
        assert_eq!(stored.items[0].unit_price_minor, 5000);
        assert_eq!(stored.items[0].name, "Product A");
        assert_eq!(stored.total_amount_minor, 10000);
    }

    #[tokio::test]
    async fn test_duplicate_lines_merged() {
        let (engine, a, _) = sqlite_engine().await;

        let receipt = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 3), SaleLineRequest::new(&a, 2)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap();
        assert_eq!(receipt.sale.items.len(), 1);
        assert_eq!(receipt.sale.items[0].quantity, 5);
        assert_eq!(stock(&engine, &a).await, 5);

        let err = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 3), SaleLineRequest::new(&a, 3)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));
        assert_eq!(stock(&engine, &a).await, 5);
    }

    #[tokio::test]
    async fn test_cashier_info_resolution() {
        let (engine, a, _) = sqlite_engine().await;
        let cashier = engine
            .store()
            .users()
            .create("cashier1", Role::Cashier)
            .await
            .unwrap();

        let receipt = engine
            .commit_sale(&cashier.id, &[SaleLineRequest::new(&a, 1)], PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(receipt.cashier.username, "cashier1");
        assert_eq!(receipt.cashier.role, Some(Role::Cashier));

        let receipt = engine
            .commit_sale("ext-7", &[SaleLineRequest::new(&a, 1)], PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(receipt.cashier, CashierInfo::unknown("ext-7"));

        let detail = engine.get_sale_detail(&receipt.sale.id).await.unwrap();
        assert_eq!(detail.cashier.username, "ext-7");
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let (engine, a, b) = sqlite_engine().await;

        let first = engine
            .commit_sale("cashier1", &[SaleLineRequest::new(&a, 1)], PaymentMethod::Cash)
            .await
            .unwrap()
            .sale;
        let second = engine
            .commit_sale("cashier1", &[SaleLineRequest::new(&b, 1)], PaymentMethod::Card)
            .await
            .unwrap()
            .sale;
        engine.retract_sale(&first.id).await.unwrap();

        let all = engine.list_sales(&SaleFilter::all()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let completed = engine.list_sales(&SaleFilter::completed()).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, second.id);

        let err = engine.get_sale("missing").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        let err = engine.retract_sale("missing").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_retract_with_deleted_product_is_inconsistent() {
        let (engine, a, b) = sqlite_engine().await;

        let sale = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 2), SaleLineRequest::new(&b, 1)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap()
            .sale;
        engine.store().products().delete(&b).await.unwrap();

        let err = engine.retract_sale(&sale.id).await.unwrap_err();
        match err {
            EngineError::Core(CoreError::Inconsistent { sale_id, product_id }) => {
                assert_eq!(sale_id, sale.id);
                assert_eq!(product_id, b);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(stock(&engine, &a).await, 8);
        let stored = engine.get_sale(&sale.id).await.unwrap();
        assert_eq!(stored.status, SaleStatus::Completed);
        assert_eq!(stored.retracted_at, None);
    }

    #[tokio::test]
    async fn test_racing_commits_never_oversell() {
        let (engine, a, _) = sqlite_engine().await;

        let line = [SaleLineRequest::new(&a, 6)];
        let (first, second) = tokio::join!(
            engine.commit_sale("cashier1", &line, PaymentMethod::Cash),
            engine.commit_sale("cashier2", &line, PaymentMethod::Cash),
        );

        let succeeded = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let failure = first.err().or(second.err()).unwrap();
        assert_eq!(failure.kind(), Some(ErrorKind::InsufficientStock));
        assert_eq!(stock(&engine, &a).await, 4);
    }

    #[tokio::test]
    async fn test_disjoint_concurrent_commits_both_succeed() {
        let (engine, a, b) = sqlite_engine().await;

        let first_lines = [SaleLineRequest::new(&a, 4)];
        let second_lines = [SaleLineRequest::new(&b, 2)];
        let (first, second) = tokio::join!(
            engine.commit_sale("cashier1", &first_lines, PaymentMethod::Cash),
            engine.commit_sale("cashier2", &second_lines, PaymentMethod::Card),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(stock(&engine, &a).await, 6);
        assert_eq!(stock(&engine, &b).await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_tasks_sell_exactly_available_stock() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 5)]);
        let engine = SaleEngine::new(store.clone());

        let mut handles = Vec::new();
        for i in 0..12 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .commit_sale(&format!("cashier{i}"), &[SaleLineRequest::new("a", 1)], PaymentMethod::Cash)
                    .await
            }));
        }

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(err) => assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock)),
            }
        }

        assert_eq!(sold, 5);
        assert_eq!(store.stock("a").await, Some(0));
        assert_eq!(store.sale_count().await, 5);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 5)]);
        let engine = SaleEngine::new(store.clone()).with_retry_policy(fast_retry());

        store.fail_next_commits(2);
        let receipt = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 2)], PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(store.stock("a").await, Some(3));
        assert_eq!(store.sale_count().await, 1);

        store.fail_next_commits(3);
        let err = engine.retract_sale(&receipt.sale.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(DbError::Busy(_))));
        assert_eq!(err.kind(), None);
        assert_eq!(store.stock("a").await, Some(3));
        assert_eq!(
            engine.get_sale(&receipt.sale.id).await.unwrap().status,
            SaleStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 1)]);
        let engine = SaleEngine::new(store.clone()).with_retry_policy(fast_retry());

        store.fail_next_commits(1);
        let err = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 2)], PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));

        // The planted failure was never consumed by a commit.
        let single = SaleEngine::new(store.clone()).with_retry_policy(RetryPolicy::none());
        let err = single
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 1)], PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.stock("a").await, Some(1));
    }

    #[tokio::test]
    async fn test_memory_store_retraction_of_removed_product() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 5), memory_product("b", 100, 5)]);
        let engine = SaleEngine::new(store.clone());

        let sale = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new("a", 1), SaleLineRequest::new("b", 1)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap()
            .sale;
        store.remove_product("b").await;

        let err = engine.retract_sale(&sale.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Inconsistent));
        assert_eq!(store.stock("a").await, Some(4));
    }

    #[tokio::test]
    async fn test_sales_report() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 10)]);
        let engine = SaleEngine::new(store.clone());

        let kept = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 3)], PaymentMethod::Cash)
            .await
            .unwrap();
        let undone = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 1)], PaymentMethod::Card)
            .await
            .unwrap();
        engine.retract_sale(&undone.sale.id).await.unwrap();

        let now = Utc::now();
        store
            .insert_expense(Expense {
                id: "e1".to_string(),
                description: "Electricity".to_string(),
                amount_minor: 4000,
                category: "Utilities".to_string(),
                expense_date: now,
                created_by: "admin".to_string(),
                created_at: now,
            })
            .await;

        let report = engine.sales_report(None, None).await.unwrap();
        assert_eq!(report.completed_sales, 1);
        assert_eq!(report.retracted_sales, 1);
        assert_eq!(report.revenue_minor, kept.sale.total_amount_minor);
        assert_eq!(report.cost_of_goods_minor, 3 * 2500);
        assert_eq!(report.net_profit_minor, 15000 - 7500 - 4000);
    }

    #[tokio::test]
    async fn test_retraction_losing_status_race_is_invalid_state() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 5)]);
        let engine = SaleEngine::new(store.clone());

        let sale = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 2)], PaymentMethod::Cash)
            .await
            .unwrap()
            .sale;
        let late = SaleEngine::new(StaleSale {
            inner: store.clone(),
            snapshot: sale.clone(),
        });

        engine.retract_sale(&sale.id).await.unwrap();
        assert_eq!(store.stock("a").await, Some(5));

        let err = late.retract_sale(&sale.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidSaleStatus { ref sale_id, .. }) if *sale_id == sale.id));
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
        assert_eq!(store.stock("a").await, Some(5));
    }

    #[tokio::test]
    async fn test_concurrent_retractions_restore_once_sqlite() {
        let (engine, a, b) = sqlite_engine().await;

        let sale = engine
            .commit_sale(
                "cashier1",
                &[SaleLineRequest::new(&a, 3), SaleLineRequest::new(&b, 2)],
                PaymentMethod::Cash,
            )
            .await
            .unwrap()
            .sale;

        retract_twice(&engine, &sale.id).await;

        assert_eq!(stock(&engine, &a).await, 10);
        assert_eq!(stock(&engine, &b).await, 5);
        assert_eq!(engine.get_sale(&sale.id).await.unwrap().status, SaleStatus::Retracted);
    }

    #[tokio::test]
    async fn test_concurrent_retractions_restore_once_memory() {
        let store = MemoryStore::with_products([memory_product("a", 5000, 5)]);
        let engine = SaleEngine::new(store.clone());

        let sale = engine
            .commit_sale("cashier1", &[SaleLineRequest::new("a", 4)], PaymentMethod::Cash)
            .await
            .unwrap()
            .sale;

        retract_twice(&engine, &sale.id).await;

        assert_eq!(store.stock("a").await, Some(5));
        assert_eq!(engine.get_sale(&sale.id).await.unwrap().status, SaleStatus::Retracted);
    }

    #[tokio::test]
    async fn test_memory_store_cashier_info() {
        let store = MemoryStore::new();
        store.insert_product(memory_product("a", 5000, 5)).await;
        store
            .insert_user(User {
                id: "u1".to_string(),
                username: "cashier1".to_string(),
                role: Role::Cashier,
                created_at: Utc::now(),
            })
            .await;
        let engine = SaleEngine::new(store.clone());

        let receipt = engine
            .commit_sale("u1", &[SaleLineRequest::new("a", 1)], PaymentMethod::Digital)
            .await
            .unwrap();
        assert_eq!(receipt.cashier.username, "cashier1");
        assert_eq!(receipt.cashier.role, Some(Role::Cashier));
        assert_eq!(store.stock("a").await, Some(4));

        let detail = engine.get_sale_detail(&receipt.sale.id).await.unwrap();
        assert_eq!(detail.cashier, receipt.cashier);
    }
}
