//! # apothecary-core: Pure Business Logic for Apothecary POS
//!
//! This crate is the **heart** of the pharmacy point-of-sale. It contains the
//! domain model and every sale rule that can be decided without I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Apothecary POS Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Web client + HTTP layer + auth (external collaborators)  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ commit_sale / retract_sale / list     │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          apothecary-db: SaleEngine + repositories               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ apothecary-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   sale    │  │  report   │  │   │
//! │  │   │  Product  │  │   Money   │  │ plan_sale │  │SalesReport│  │   │
//! │  │   │   Sale    │  │  (Rp)     │  │ retraction│  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Category, Expense, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Business rule validation
//! - [`sale`] - Snapshot pricing, totals, retraction planning
//! - [`report`] - Revenue / profit summaries
//!
//! ## Example Usage
//!
//! ```rust
//! use apothecary_core::money::Money;
//!
//! let price = Money::from_minor(5000);
//! assert_eq!(price.to_string(), "Rp5.000");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod report;
pub mod sale;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use report::SalesReport;
pub use sale::{SaleLineRequest, StockDelta};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct products allowed in a single sale.
///
/// ## Business Reason
/// Prevents runaway carts and keeps the atomic phase short.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single product in one sale.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
