//! # Validation Module
//!
//! Input validation utilities for Apothecary POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Web client                                                   │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (business rule validation)                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── CHECK (stock >= 0)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use apothecary_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("PC500").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::types::{NewExpense, NewProduct};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn require_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use apothecary_core::validation::validate_sku;
///
/// assert!(validate_sku("AMX250").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    require_text("sku", sku, 50)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (1-200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    require_text("name", name, 200)
}

/// Validates a category name (1-100 characters).
pub fn validate_category_name(name: &str) -> ValidationResult<()> {
    require_text("category name", name, 100)
}

/// Validates a username (1-50 characters).
pub fn validate_username(username: &str) -> ValidationResult<()> {
    require_text("username", username, 50)
}

/// Validates the opaque actor id supplied by the authentication layer.
pub fn validate_actor_id(actor_id: &str) -> ValidationResult<()> {
    require_text("actor id", actor_id, 100)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ```text
/// validate_quantity(5)
///       │
///       ├── qty <= 0?  → MustBePositive
///       ├── qty > 999? → OutOfRange
///       └── OK
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in minor units. Zero is allowed (free samples).
pub fn validate_price_minor(field: &str, minor: i64) -> ValidationResult<()> {
    if minor < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a quantity-on-hand value (>= 0).
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates the number of distinct lines in a sale request.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

/// Validates a product before insert or update.
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_product_name(&product.name)?;
    validate_sku(&product.sku)?;
    validate_price_minor("base price", product.base_price_minor)?;
    validate_price_minor("price", product.price_minor)?;
    validate_stock(product.stock)?;

    if let Some(supplier) = &product.supplier {
        if supplier.chars().count() > 200 {
            return Err(ValidationError::TooLong {
                field: "supplier".to_string(),
                max: 200,
            });
        }
    }

    Ok(())
}

/// Validates an expense before insert.
pub fn validate_new_expense(expense: &NewExpense) -> ValidationResult<()> {
    require_text("description", &expense.description, 500)?;
    require_text("category", &expense.category, 100)?;

    if expense.amount_minor <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
