//! Larder Database Layer
//!
//! This crate provides the persistence layer for Larder, using SQLite via
//! sqlx. Every query runs under a bounded timeout.

pub mod error;
pub mod filters;
pub mod models;
pub mod repository;
pub mod utils;

pub use error::DbError;
pub use filters::{Filters, Metadata};
pub use models::*;
pub use repository::{Database, DatabaseOptions, MenuScope};

/// Re-export sqlx types for convenience
pub use sqlx::SqlitePool;
