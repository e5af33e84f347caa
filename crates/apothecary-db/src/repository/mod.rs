//! # Repository Module
//!
//! Database repository implementations for Apothecary POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Back-office caller                 SaleEngine                         │
//! │       │                                  │                              │
//! │       │  db.products().search(..)        │  SalesStore / SalesUnit     │
//! │       ▼                                  ▼                              │
//! │  ProductRepository ◄──────────── store.rs (Database impl)              │
//! │  CategoryRepository              uses the pool-backed reads and the    │
//! │  UserRepository                  pub(crate) transaction-scoped writes  │
//! │  ExpenseRepository               (adjust_stock, insert, update_status) │
//! │  SaleRepository                                                         │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product CRUD, search, stock
//! - [`CategoryRepository`](category::CategoryRepository) - Categories
//! - [`UserRepository`](user::UserRepository) - Staff directory
//! - [`ExpenseRepository`](expense::ExpenseRepository) - Operational costs
//! - [`SaleRepository`](sale::SaleRepository) - Sale ledger

pub mod category;
pub mod expense;
pub mod product;
pub mod sale;
pub mod user;
