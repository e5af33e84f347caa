//! # Domain Types
//!
//! Core domain types used throughout Apothecary POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │  SaleLineItem   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  product_id     │       │
//! │  │  sku (business) │   │  cashier_id     │   │  name (frozen)  │       │
//! │  │  price_minor    │   │  items[]        │   │  unit_price     │       │
//! │  │  stock          │   │  status         │   │  quantity       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Category      │   │   SaleStatus    │   │ PaymentMethod   │       │
//! │  │   User          │   │  Completed      │   │  Cash           │       │
//! │  │   Expense       │   │  Retracted      │   │  Card / Digital │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for relations
//! - Business ID: (sku, username, etc.) - human-readable, potentially mutable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the pharmacy inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on invoices.
    pub name: String,

    /// Stock Keeping Unit - unique business identifier.
    pub sku: String,

    /// Category this product is filed under.
    pub category_id: Option<String>,

    /// Cost basis in minor units (for profit reporting).
    pub base_price_minor: i64,

    /// Selling price in minor units.
    pub price_minor: i64,

    /// Quantity on hand. Never negative.
    pub stock: i64,

    /// Expiry date of the current batch.
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    /// Supplier label (free text).
    pub supplier: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the selling price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price_minor)
    }

    /// Returns the cost basis as Money.
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_minor(self.base_price_minor)
    }

    /// Checks if the requested quantity can be taken from stock.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

/// Input for creating a product. The id and timestamps are assigned on insert.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub category_id: Option<String>,
    pub base_price_minor: i64,
    pub price_minor: i64,
    pub stock: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub supplier: Option<String>,
}

// =============================================================================
// Category
// =============================================================================

/// A product category (e.g. "Pain Relief", "Vitamins").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Users
// =============================================================================

/// Role of a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
pub enum Role {
    Admin,
    Cashier,
}

/// A staff member known to the directory.
///
/// Credentials live in the external authentication layer; this record only
/// backs display metadata such as the cashier name on an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Cashier display metadata returned with a sale for invoice rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashierInfo {
    pub id: String,
    pub username: String,
    pub role: Option<Role>,
}

impl CashierInfo {
    /// Display metadata for an actor that is not in the user directory.
    pub fn unknown(actor_id: &str) -> Self {
        CashierInfo {
            id: actor_id.to_string(),
            username: actor_id.to_string(),
            role: None,
        }
    }
}

impl From<User> for CashierInfo {
    fn from(user: User) -> Self {
        CashierInfo {
            id: user.id,
            username: user.username,
            role: Some(user.role),
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
///
/// ```text
/// commit_sale ──► Completed ──retract_sale──► Retracted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
pub enum SaleStatus {
    /// Sale has been committed and its stock decrement applied.
    Completed,
    /// Sale was reversed and its stock restored.
    Retracted,
}

impl SaleStatus {
    /// Lowercase label, matching the stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Retracted => "retracted",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the customer paid. A label only; nothing is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    Digital,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Digital];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::Digital => "Digital",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the labels sent by the web client (case-insensitive).
impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "digital" => Ok(PaymentMethod::Digital),
            _ => Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A line item in a sale.
///
/// Snapshot pattern: name, SKU and prices are frozen at commit time so
/// historical invoices are immune to later product edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLineItem {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    /// SKU at time of sale (frozen).
    pub sku: String,
    /// Selling price at time of sale (frozen).
    pub unit_price_minor: i64,
    /// Cost basis at time of sale (frozen).
    pub base_price_minor: i64,
    /// Quantity sold, at least 1.
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_minor: i64,
}

impl SaleLineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_minor(self.unit_price_minor)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_minor(self.line_total_minor)
    }

    /// Cost of goods for this line (base price × quantity).
    #[inline]
    pub fn line_cost(&self) -> Money {
        Money::from_minor(self.base_price_minor.saturating_mul(self.quantity))
    }
}

/// A committed sale. Created once, transitions once, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Opaque id of the acting cashier.
    pub cashier_id: String,
    pub items: Vec<SaleLineItem>,
    /// Sum of line totals at creation time.
    pub total_amount_minor: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub retracted_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_minor(self.total_amount_minor)
    }

    /// Total number of units across all lines.
    pub fn unit_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Cost of goods across all lines.
    pub fn cost_of_goods(&self) -> Money {
        self.items.iter().map(SaleLineItem::line_cost).sum()
    }
}

/// A sale assembled with its cashier display metadata, for invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub cashier: CashierInfo,
}

/// Filter for sale listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleFilter {
    /// Only sales with this status (e.g. Completed for financial reporting).
    pub status: Option<SaleStatus>,
    /// Only sales created at or after this instant.
    #[ts(as = "Option<String>")]
    pub since: Option<DateTime<Utc>>,
    /// Only sales created strictly before this instant.
    #[ts(as = "Option<String>")]
    pub until: Option<DateTime<Utc>>,
}

impl SaleFilter {
    /// All sales, any status.
    pub fn all() -> Self {
        SaleFilter::default()
    }

    /// Completed sales only.
    pub fn completed() -> Self {
        SaleFilter {
            status: Some(SaleStatus::Completed),
            ..SaleFilter::default()
        }
    }

    /// Checks whether a sale passes this filter.
    pub fn matches(&self, sale: &Sale) -> bool {
        self.status.map_or(true, |s| sale.status == s)
            && self.since.map_or(true, |t| sale.created_at >= t)
            && self.until.map_or(true, |t| sale.created_at < t)
    }
}

// =============================================================================
// Expense
// =============================================================================

/// An operational cost recorded by an admin (rent, utilities, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub amount_minor: i64,
    pub category: String,
    #[ts(as = "String")]
    pub expense_date: DateTime<Utc>,
    /// Actor id of the admin who recorded it.
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Expense {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_minor(self.amount_minor)
    }
}

/// Input for recording an expense.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewExpense {
    pub description: String,
    pub amount_minor: i64,
    pub category: String,
    /// Defaults to the recording time when absent.
    #[ts(as = "Option<String>")]
    pub expense_date: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("Cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!(" card ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("DIGITAL".parse::<PaymentMethod>().unwrap(), PaymentMethod::Digital);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_method_serializes_as_label() {
        let json = serde_json::to_string(&PaymentMethod::Digital).unwrap();
        assert_eq!(json, "\"Digital\"");
    }

    #[test]
    fn test_sale_status_display() {
        assert_eq!(SaleStatus::Completed.to_string(), "completed");
        assert_eq!(SaleStatus::Retracted.to_string(), "retracted");
    }

    #[test]
    fn test_cashier_info_from_user() {
        let user = User {
            id: "u-1".to_string(),
            username: "cashier1".to_string(),
            role: Role::Cashier,
            created_at: Utc::now(),
        };
        let info = CashierInfo::from(user);
        assert_eq!(info.username, "cashier1");
        assert_eq!(info.role, Some(Role::Cashier));

        let unknown = CashierInfo::unknown("ext-42");
        assert_eq!(unknown.username, "ext-42");
        assert_eq!(unknown.role, None);
    }

    #[test]
    fn test_sale_filter_matches() {
        let now = Utc::now();
        let sale = Sale {
            id: "s-1".to_string(),
            cashier_id: "u-1".to_string(),
            items: vec![],
            total_amount_minor: 0,
            payment_method: PaymentMethod::Cash,
            status: SaleStatus::Retracted,
            created_at: now,
            retracted_at: Some(now),
        };

        assert!(SaleFilter::all().matches(&sale));
        assert!(!SaleFilter::completed().matches(&sale));

        let window = SaleFilter {
            status: None,
            since: Some(now),
            until: Some(now + chrono::Duration::seconds(1)),
        };
        assert!(window.matches(&sale));

        let past = SaleFilter {
            until: Some(now),
            ..SaleFilter::default()
        };
        assert!(!past.matches(&sale));
    }
}
