//! Dialect factory.
//!
//! A [`Dialect`] binds one backend to one connection pool and hands out the
//! four collaborators the query core needs: a [`Driver`], a
//! [`QueryCompiler`], a [`DialectAdapter`] and a [`DatabaseIntrospector`].
//! Every collaborator made by the same dialect shares its backend and pool.

pub mod adapter;

pub use adapter::{
    Capability, CapabilitySet, CapabilityValue, DialectAdapter, LimitSyntax, PlaceholderStyle,
};

use crate::config::DialectConfig;
use crate::db::connection::{Connector, SqlxConnector};
use crate::db::driver::{Driver, DriverOptions};
use crate::db::pool::{ConnectionPool, PoolConfig};
use crate::db::schema::DatabaseIntrospector;
use crate::error::{DialectError, DialectResult};
use crate::models::Backend;
use crate::query::QueryCompiler;
use std::sync::Arc;
use tracing::info;

pub struct Dialect<C: Connector = SqlxConnector> {
    adapter: DialectAdapter,
    pool: Arc<ConnectionPool<C>>,
    driver_options: DriverOptions,
    /// Pools built from configuration are closed with the dialect; pools
    /// supplied by the caller are not
    owns_pool: bool,
}

impl<C: Connector> std::fmt::Debug for Dialect<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialect")
            .field("backend", &self.adapter.backend())
            .field("owns_pool", &self.owns_pool)
            .field("pool", &self.pool.status())
            .finish()
    }
}

impl Dialect<SqlxConnector> {
    /// Build a dialect and its own pool from a parsed connection string.
    ///
    /// One connection is opened and returned to the pool so that bad
    /// credentials or an unreachable server fail here.
    pub async fn connect(config: &DialectConfig) -> DialectResult<Self> {
        config
            .pool_options
            .validate()
            .map_err(DialectError::invalid_input)?;

        let connector = SqlxConnector::new(config.backend, &config.connection_string)?;
        let pool_config = PoolConfig::from_options(&config.pool_options, config.backend);
        let pool = ConnectionPool::new(connector, pool_config);

        let handle = pool.acquire(None).await?;
        pool.release(handle).await;

        info!(
            backend = %config.backend,
            database = ?config.database,
            max_connections = pool.config().max_connections,
            "Dialect connected"
        );

        Ok(Self {
            adapter: DialectAdapter::for_backend(config.backend),
            pool,
            driver_options: DriverOptions {
                query_timeout: config.pool_options.query_timeout(),
                ..DriverOptions::default()
            },
            owns_pool: true,
        })
    }
}

impl<C: Connector> Dialect<C> {
    /// Build a dialect over a caller-owned pool. The pool is used as-is and
    /// left open by [`Dialect::close`].
    pub fn from_pool(backend: Backend, pool: Arc<ConnectionPool<C>>) -> Self {
        Self {
            adapter: DialectAdapter::for_backend(backend),
            pool,
            driver_options: DriverOptions::default(),
            owns_pool: false,
        }
    }

    /// Replace the default capabilities of the backend.
    pub fn with_adapter(mut self, adapter: DialectAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_driver_options(mut self, options: DriverOptions) -> Self {
        self.driver_options = options;
        self
    }

    pub fn backend(&self) -> Backend {
        self.adapter.backend()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    pub fn create_driver(&self) -> Driver<C> {
        let driver = if self.owns_pool {
            Driver::owning(Arc::clone(&self.pool), self.adapter.clone())
        } else {
            Driver::new(Arc::clone(&self.pool), self.adapter.clone())
        };
        driver.with_options(self.driver_options.clone())
    }

    pub fn create_query_compiler(&self) -> QueryCompiler {
        QueryCompiler::new(self.adapter.clone())
    }

    pub fn create_adapter(&self) -> DialectAdapter {
        self.adapter.clone()
    }

    pub fn create_introspector(&self, driver: Driver<C>) -> DatabaseIntrospector<C> {
        DatabaseIntrospector::new(driver)
    }

    /// Close the pool if this dialect created it.
    pub async fn close(&self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }
}
