//! # Sale Planning
//!
//! Pure half of the sale transaction workflow. The engine in `apothecary-db`
//! resolves products and runs the atomic phase; everything that can be
//! decided without I/O is decided here.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  [(product_id, qty), ...]                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  normalize_lines()  ── empty / bad qty / too many lines → InvalidRequest│
//! │       │              (duplicate product ids merged)                     │
//! │       ▼                                                                 │
//! │  batch lookup (engine, one query)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_sale()        ── missing id → ProductNotFound                    │
//! │       │             ── stock < qty → InsufficientStock                 │
//! │       │             ── snapshot name/sku/price/base price              │
//! │       ▼                                                                 │
//! │  Sale { status: Completed, total = Σ price × qty }                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PaymentMethod, Product, Sale, SaleLineItem, SaleStatus};
use crate::validation::{validate_actor_id, validate_cart_size, validate_quantity};

// =============================================================================
// Request Types
// =============================================================================

/// One requested line: which product and how many.
///
/// Deliberately carries no price. Prices always come from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

impl SaleLineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLineRequest {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Signed change to a product's quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDelta {
    pub product_id: String,
    pub delta: i64,
}

/// Everything needed to build a sale apart from the resolved products.
#[derive(Debug, Clone)]
pub struct SaleDraft<'a> {
    pub sale_id: String,
    pub cashier_id: &'a str,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    /// Normalized lines (see [`normalize_lines`]).
    pub lines: &'a [SaleLineRequest],
}

// =============================================================================
// Commit Planning
// =============================================================================

/// Validates and normalizes the requested lines.
///
/// ## Rules
/// - At least one line
/// - Every product id non-blank, every quantity in 1..=999
/// - Duplicate product ids are merged (first occurrence keeps its position)
/// - At most `MAX_CART_ITEMS` distinct products
///
/// ## Example
/// ```rust
/// use apothecary_core::sale::{normalize_lines, SaleLineRequest};
///
/// let lines = normalize_lines(&[
///     SaleLineRequest::new("a", 2),
///     SaleLineRequest::new("b", 1),
///     SaleLineRequest::new("a", 3),
/// ]).unwrap();
/// assert_eq!(lines, vec![SaleLineRequest::new("a", 5), SaleLineRequest::new("b", 1)]);
/// ```
pub fn normalize_lines(lines: &[SaleLineRequest]) -> CoreResult<Vec<SaleLineRequest>> {
    if lines.is_empty() {
        return Err(CoreError::invalid_request("sale must contain at least one item"));
    }

    let mut merged: Vec<SaleLineRequest> = Vec::with_capacity(lines.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(lines.len());

    for line in lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product id".to_string(),
            }
            .into());
        }
        validate_quantity(line.quantity)?;

        match positions.get(line.product_id.as_str()) {
            Some(&idx) => merged[idx].quantity += line.quantity,
            None => {
                positions.insert(line.product_id.as_str(), merged.len());
                merged.push(line.clone());
            }
        }
    }

    for line in &merged {
        validate_quantity(line.quantity)?;
    }
    validate_cart_size(merged.len())?;

    Ok(merged)
}

/// Product ids to resolve in the batch lookup, in request order.
pub fn required_product_ids(lines: &[SaleLineRequest]) -> Vec<String> {
    lines.iter().map(|l| l.product_id.clone()).collect()
}

/// Builds the sale record from normalized lines and the resolved products.
///
/// All missing products are reported before any stock shortfall, and the
/// first offending line (in request order) is the one named in the error.
pub fn plan_sale(draft: SaleDraft<'_>, products: &HashMap<String, Product>) -> CoreResult<Sale> {
    validate_actor_id(draft.cashier_id)?;
    if draft.lines.is_empty() {
        return Err(CoreError::invalid_request("sale must contain at least one item"));
    }

    let mut resolved = Vec::with_capacity(draft.lines.len());
    for line in draft.lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
        resolved.push((line, product));
    }

    for (line, product) in &resolved {
        if !product.can_sell(line.quantity) {
            return Err(insufficient(product, line.quantity));
        }
    }

    let mut items = Vec::with_capacity(resolved.len());
    let mut total = Money::zero();
    for (line, product) in resolved {
        let line_total = product
            .price()
            .checked_mul_quantity(line.quantity)
            .ok_or_else(|| CoreError::invalid_request("line total overflows"))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| CoreError::invalid_request("sale total overflows"))?;

        items.push(SaleLineItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            sku: product.sku.clone(),
            unit_price_minor: product.price_minor,
            base_price_minor: product.base_price_minor,
            quantity: line.quantity,
            line_total_minor: line_total.minor(),
        });
    }

    Ok(Sale {
        id: draft.sale_id,
        cashier_id: draft.cashier_id.trim().to_string(),
        items,
        total_amount_minor: total.minor(),
        payment_method: draft.payment_method,
        status: SaleStatus::Completed,
        created_at: draft.created_at,
        retracted_at: None,
    })
}

/// Builds the InsufficientStock error for a product.
pub fn insufficient(product: &Product, requested: i64) -> CoreError {
    CoreError::InsufficientStock {
        product_id: product.id.clone(),
        sku: product.sku.clone(),
        name: product.name.clone(),
        available: product.stock,
        requested,
    }
}

/// Stock decrements a committed sale applies, one per line.
pub fn commit_deltas(sale: &Sale) -> Vec<StockDelta> {
    sale.items
        .iter()
        .map(|item| StockDelta {
            product_id: item.product_id.clone(),
            delta: -item.quantity,
        })
        .collect()
}

// =============================================================================
// Retraction Planning
// =============================================================================

/// Stock restorations for retracting `sale`.
///
/// ## Errors
/// `InvalidSaleStatus` if the sale is already retracted. Retraction is not
/// idempotent: a second request is a caller error.
pub fn plan_retraction(sale: &Sale) -> CoreResult<Vec<StockDelta>> {
    if sale.status != SaleStatus::Completed {
        return Err(CoreError::InvalidSaleStatus {
            sale_id: sale.id.clone(),
            current_status: sale.status.to_string(),
        });
    }

    Ok(sale
        .items
        .iter()
        .map(|item| StockDelta {
            product_id: item.product_id.clone(),
            delta: item.quantity,
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn product(id: &str, price: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            sku: id.to_uppercase(),
            category_id: None,
            base_price_minor: price / 2,
            price_minor: price,
            stock,
            expiry_date: None,
            supplier: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn catalogue() -> HashMap<String, Product> {
        [product("a", 5000, 10), product("b", 25000, 5)]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect()
    }

    fn draft<'a>(lines: &'a [SaleLineRequest]) -> SaleDraft<'a> {
        SaleDraft {
            sale_id: "sale-1".to_string(),
            cashier_id: "cashier1",
            payment_method: PaymentMethod::Cash,
            created_at: Utc::now(),
            lines,
        }
    }

    #[test]
    fn test_normalize_rejects_empty() {
        let err = normalize_lines(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_normalize_rejects_bad_quantity() {
        let err = normalize_lines(&[SaleLineRequest::new("a", 0)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = normalize_lines(&[SaleLineRequest::new(" ", 1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_normalize_merged_quantity_is_bounded() {
        let err = normalize_lines(&[SaleLineRequest::new("a", 600), SaleLineRequest::new("a", 600)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_plan_sale_uses_inventory_prices() {
        let lines = normalize_lines(&[SaleLineRequest::new("a", 3), SaleLineRequest::new("b", 5)]).unwrap();
        let sale = plan_sale(draft(&lines), &catalogue()).unwrap();

        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.items.len(), 2);
        assert_eq!(sale.items[0].unit_price_minor, 5000);
        assert_eq!(sale.items[0].line_total_minor, 15000);
        assert_eq!(sale.items[1].base_price_minor, 12500);
        assert_eq!(sale.total_amount_minor, 3 * 5000 + 5 * 25000);
        assert_eq!(
            sale.total_amount_minor,
            sale.items.iter().map(|i| i.line_total_minor).sum::<i64>()
        );
    }

    #[test]
    fn test_plan_sale_missing_product() {
        let lines = vec![SaleLineRequest::new("a", 1), SaleLineRequest::new("ghost", 1)];
        let err = plan_sale(draft(&lines), &catalogue()).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_plan_sale_missing_reported_before_shortfall() {
        let lines = vec![SaleLineRequest::new("b", 50), SaleLineRequest::new("ghost", 1)];
        let err = plan_sale(draft(&lines), &catalogue()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_plan_sale_insufficient_stock() {
        let lines = vec![SaleLineRequest::new("a", 1), SaleLineRequest::new("b", 6)];
        let err = plan_sale(draft(&lines), &catalogue()).unwrap_err();
        match err {
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            } => {
                assert_eq!(product_id, "b");
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plan_sale_exact_stock_allowed() {
        let lines = vec![SaleLineRequest::new("b", 5)];
        assert!(plan_sale(draft(&lines), &catalogue()).is_ok());
    }

    #[test]
    fn test_commit_and_retraction_deltas_cancel() {
        let lines = vec![SaleLineRequest::new("a", 3), SaleLineRequest::new("b", 5)];
        let sale = plan_sale(draft(&lines), &catalogue()).unwrap();

        let down = commit_deltas(&sale);
        let up = plan_retraction(&sale).unwrap();
        for (d, u) in down.iter().zip(&up) {
            assert_eq!(d.product_id, u.product_id);
            assert_eq!(d.delta + u.delta, 0);
        }
    }

    #[test]
    fn test_plan_retraction_rejects_retracted() {
        let lines = vec![SaleLineRequest::new("a", 1)];
        let mut sale = plan_sale(draft(&lines), &catalogue()).unwrap();
        sale.status = SaleStatus::Retracted;

        let err = plan_retraction(&sale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
