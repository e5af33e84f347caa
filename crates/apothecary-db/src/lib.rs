//! # apothecary-db: Sale Engine and Storage for Apothecary POS
//!
//! This crate owns everything that touches persistence: the SQLite pool, the
//! back-office repositories, and the Sale Transaction Engine that commits and
//! retracts sales against live inventory.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Apothecary POS Data Flow                           │
//! │                                                                         │
//! │  HTTP handler (POST /sales, PUT /sales/:id/retract, GET /sales)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  apothecary-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  SaleEngine   │    │  SalesStore   │    │ Repositories │  │   │
//! │  │   │  (engine.rs)  │───►│  (store.rs)   │───►│ product.rs   │  │   │
//! │  │   │               │    │               │    │ sale.rs      │  │   │
//! │  │   │ commit_sale   │    │ Database      │    │ user.rs ...  │  │   │
//! │  │   │ retract_sale  │    │ MemoryStore   │    └──────┬───────┘  │   │
//! │  │   │ list_sales    │    └───────────────┘           │          │   │
//! │  │   └───────────────┘                                │          │   │
//! │  │                      ┌───────────────┐    ┌────────▼───────┐  │   │
//! │  │                      │   Migrations  │    │    Database    │  │   │
//! │  │                      │   (embedded)  │───►│   (pool.rs)    │  │   │
//! │  │                      └───────────────┘    └────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   products • sales • sale_items • users • categories • expenses│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - Sale Transaction Engine and retry policy
//! - [`store`] - Storage context and unit-of-work traits
//! - [`memory`] - In-memory storage context
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - Environment configuration
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (product, sale, etc.)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apothecary_db::{AppConfig, Database, SaleEngine};
//! use apothecary_core::{PaymentMethod, SaleLineRequest};
//!
//! let config = AppConfig::load()?;
//! let db = Database::new(config.db_config()).await?;
//! let engine = SaleEngine::new(db).with_retry_policy(config.retry_policy());
//!
//! let receipt = engine
//!     .commit_sale(&user_id, &[SaleLineRequest::new(&product_id, 2)], PaymentMethod::Cash)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AppConfig, ConfigError};
pub use engine::{EngineError, EngineResult, RetryPolicy, SaleEngine};
pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use store::{SalesStore, SalesUnit, StockAdjustment};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::expense::ExpenseRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::user::UserRepository;
