//! # Error Types
//!
//! Domain-specific error types for apothecary-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  apothecary-core errors (this file)                                    │
//! │  ├── CoreError        - Sale engine taxonomy                           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  apothecary-db errors (separate crate)                                 │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError from the sale engine       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each variant maps to exactly one [`ErrorKind`]

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a [`CoreError`], used by callers to pick a
/// response (HTTP status, toast style) without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or empty input. Caller bug, never retried.
    InvalidRequest,
    /// Referenced product or sale is absent.
    NotFound,
    /// Business rule violation: not enough quantity on hand.
    InsufficientStock,
    /// Illegal lifecycle transition (e.g. double retraction).
    InvalidState,
    /// Internal invariant violated. Needs operator attention.
    Inconsistent,
}

// =============================================================================
// Core Error
// =============================================================================

/// Sale engine errors.
///
/// Every variant aborts the whole operation with no partial effect.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Request is malformed (empty cart, bad quantity, blank actor).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Product cannot be found.
    ///
    /// ## When This Occurs
    /// - Product ID in the cart doesn't exist
    /// - Product was deleted between cart build and checkout
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Sale cannot be found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Insufficient stock to complete sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (PC500 × 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "PC500", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 Paracetamol 500mg in stock"
    /// ```
    #[error("Insufficient stock for {sku} ({name}): available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        sku: String,
        name: String,
        available: i64,
        requested: i64,
    },

    /// Sale is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Retracting a sale that is already retracted
    /// - Losing a race against a concurrent retraction
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// A sale references a product that no longer exists.
    ///
    /// Raised during retraction instead of silently skipping the stock
    /// restoration, which would corrupt inventory accounting.
    #[error("Sale {sale_id} references missing product {product_id}")]
    Inconsistent { sale_id: String, product_id: String },
}

impl CoreError {
    /// Creates an InvalidRequest error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        CoreError::InvalidRequest(message.into())
    }

    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidRequest(_) | CoreError::Validation(_) => ErrorKind::InvalidRequest,
            CoreError::ProductNotFound(_) | CoreError::SaleNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CoreError::InvalidSaleStatus { .. } => ErrorKind::InvalidState,
            CoreError::Inconsistent { .. } => ErrorKind::Inconsistent,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            sku: "PC500".to_string(),
            name: "Paracetamol 500mg".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for PC500 (Paracetamol 500mg): available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");
    }

    #[test]
    fn test_validation_converts_to_invalid_request() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert_eq!(core_err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CoreError::ProductNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CoreError::SaleNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::InvalidSaleStatus {
                sale_id: "s".into(),
                current_status: "retracted".into()
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            CoreError::Inconsistent {
                sale_id: "s".into(),
                product_id: "p".into()
            }
            .kind(),
            ErrorKind::Inconsistent
        );
    }
}
