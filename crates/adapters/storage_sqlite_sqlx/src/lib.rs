//! # roomhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement [`AutomationRepository`](roomhub_app::ports::AutomationRepository)
//!   for workflows, dimmer configs, controllers and execution outcomes
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows; graph parts, credentials,
//!   ports and full outcomes are stored as JSON columns
//!
//! ## Dependency rule
//! Depends on `roomhub-app` (for port traits) and `roomhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod controllers;
mod dimmers;
pub mod error;
mod outcomes;
pub mod pool;
mod repository;
mod workflows;

pub use error::StorageError;
pub use pool::{Config, Database};
pub use repository::SqliteRepository;
