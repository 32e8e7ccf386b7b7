//! Pluggable SQL dialect layer.
//!
//! Lets a backend-agnostic query core target PostgreSQL, MySQL/MariaDB and
//! SQLite. A [`Dialect`] assembles, per backend:
//!
//! - a [`Driver`](db::Driver) for pooled connections, transactions and
//!   statement execution
//! - a [`QueryCompiler`](query::QueryCompiler) turning query trees into SQL
//!   with bound parameters
//! - a [`DialectAdapter`](dialect::DialectAdapter) describing what the backend
//!   supports
//! - a [`DatabaseIntrospector`](db::DatabaseIntrospector) reading catalog
//!   metadata

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;
pub mod query;

pub use config::{Config, DialectConfig, PoolOptions};
pub use dialect::Dialect;
pub use error::{DialectError, DialectResult};
