//! `PostgreSQL` request store for request desk.
//!
//! This crate provides a PostgreSQL-based implementation of the
//! `RequestStore` trait from `requestdesk-core`. It supports:
//!
//! - Atomic conditional close and reopen
//! - Embedded migrations for the `requests` table
//! - Connection pooling configured from the environment
//!
//! # Example
//!
//! ```ignore
//! use requestdesk_postgres::{PostgresConfig, PostgresRequestStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRequestStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Connection pool configuration
pub mod config;

/// The `requests` table store
pub mod store;

pub use config::PostgresConfig;
pub use store::PostgresRequestStore;
