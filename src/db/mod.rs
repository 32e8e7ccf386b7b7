//! Database access layer.
//!
//! This module provides:
//! - Physical connections and the connector abstraction the pool builds on
//! - Connection pool management
//! - Transactions and query execution
//! - Schema introspection
//! - Type mappings and parameter binding
//! - Backend dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod driver;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use connection::{Connection, Connector, DbConnection, SqlxConnector};
pub use driver::{
    AccessMode, Driver, DriverOptions, IsolationLevel, TransactionContext, TransactionSettings,
};
pub use pool::{ConnectionPool, Lease, PoolConfig, PoolStatus, PooledConnection};
pub use schema::DatabaseIntrospector;
