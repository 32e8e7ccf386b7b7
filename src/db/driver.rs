//! Connection lifecycle, transactions and statement execution.
//!
//! A [`Driver`] sits on top of a [`ConnectionPool`]. It hands out pooled
//! connections, runs [`CompiledQuery`]s on them and manages transactions.
//!
//! A [`TransactionContext`] owns its connection for its whole lifetime. Depth 1
//! is the real transaction; every nested level is a savepoint named `sp_<depth>`
//! on the same connection, so there is never more than one real transaction per
//! connection and nesting never acquires another connection.

use crate::db::connection::{Connection, Connector};
use crate::db::pool::{ConnectionPool, Lease, PoolStatus, PooledConnection};
use crate::dialect::DialectAdapter;
use crate::error::{DialectError, DialectResult};
use crate::models::{Backend, QueryResult, Row, Value};
use crate::query::{CompiledQuery, QueryKind};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait for a named migration lock.
pub const DEFAULT_MIGRATION_LOCK_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 4] = [
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::Serializable,
    ];

    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// Options for [`Driver::begin_transaction`]. Unset fields keep the server default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSettings {
    pub isolation_level: Option<IsolationLevel>,
    pub access_mode: Option<AccessMode>,
}

impl TransactionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access_mode = Some(AccessMode::ReadOnly);
        self
    }

    pub fn read_write(mut self) -> Self {
        self.access_mode = Some(AccessMode::ReadWrite);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Per-statement limit for buffered execution; None waits forever
    pub query_timeout: Option<Duration>,
    pub migration_lock_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            query_timeout: None,
            migration_lock_timeout: Duration::from_secs(DEFAULT_MIGRATION_LOCK_TIMEOUT_SECS),
        }
    }
}

/// Statements that open a transaction with `settings` on `backend`.
///
/// Isolation support is checked by the caller against the adapter.
fn begin_statements(backend: Backend, settings: &TransactionSettings) -> Vec<String> {
    let access = settings.access_mode.map(|mode| match mode {
        AccessMode::ReadOnly => "READ ONLY",
        AccessMode::ReadWrite => "READ WRITE",
    });
    match backend {
        Backend::PostgreSQL => {
            let mut modes = Vec::new();
            if let Some(level) = settings.isolation_level {
                modes.push(format!("ISOLATION LEVEL {level}"));
            }
            if let Some(access) = access {
                modes.push(access.to_string());
            }
            if modes.is_empty() {
                vec!["BEGIN".to_string()]
            } else {
                vec![format!("START TRANSACTION {}", modes.join(", "))]
            }
        }
        Backend::MySQL => {
            let mut statements = Vec::new();
            // Applies to the next transaction only
            if let Some(level) = settings.isolation_level {
                statements.push(format!("SET TRANSACTION ISOLATION LEVEL {level}"));
            }
            match access {
                Some(access) => statements.push(format!("START TRANSACTION {access}")),
                None => statements.push("START TRANSACTION".to_string()),
            }
            statements
        }
        Backend::SQLite => vec!["BEGIN".to_string()],
    }
}

/// A transaction holding one pooled connection.
///
/// Dropping a context whose outermost level was neither committed nor rolled
/// back discards the connection instead of returning it to the pool.
pub struct TransactionContext<C: Connector> {
    handle: Option<PooledConnection<C>>,
    depth: u32,
    settings: TransactionSettings,
}

impl<C: Connector> fmt::Debug for TransactionContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("connection_id", &self.connection_id())
            .field("depth", &self.depth)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<C: Connector> TransactionContext<C> {
    /// Current nesting depth; 0 once the outermost level has finished.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn settings(&self) -> &TransactionSettings {
        &self.settings
    }

    pub fn connection_id(&self) -> u64 {
        self.handle.as_ref().map_or(0, PooledConnection::id)
    }

    fn handle_mut(&mut self) -> DialectResult<&mut PooledConnection<C>> {
        self.handle
            .as_mut()
            .ok_or_else(|| DialectError::internal("transaction context has no connection"))
    }

    fn ensure_active(&self, action: &str) -> DialectResult<()> {
        if self.depth == 0 {
            return Err(DialectError::transaction(
                format!("Cannot {action}: no active transaction"),
                self.connection_id(),
            ));
        }
        Ok(())
    }
}

impl<C: Connector> Drop for TransactionContext<C> {
    fn drop(&mut self) {
        if self.depth == 0 {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            warn!(
                connection_id = handle.id(),
                depth = self.depth,
                "Transaction dropped while active; discarding connection"
            );
            handle.mark_broken();
        }
    }
}

/// Executes queries and manages transactions over a pool.
pub struct Driver<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
    adapter: DialectAdapter,
    options: DriverOptions,
    owns_pool: bool,
}

impl<C: Connector> Clone for Driver<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            adapter: self.adapter.clone(),
            options: self.options.clone(),
            owns_pool: self.owns_pool,
        }
    }
}

impl<C: Connector> fmt::Debug for Driver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("backend", &self.adapter.backend())
            .field("options", &self.options)
            .field("owns_pool", &self.owns_pool)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Driver<C> {
    /// Driver over a caller-owned pool; [`Driver::destroy`] leaves it open.
    pub fn new(pool: Arc<ConnectionPool<C>>, adapter: DialectAdapter) -> Self {
        Self {
            pool,
            adapter,
            options: DriverOptions::default(),
            owns_pool: false,
        }
    }

    pub(crate) fn owning(pool: Arc<ConnectionPool<C>>, adapter: DialectAdapter) -> Self {
        Self {
            owns_pool: true,
            ..Self::new(pool, adapter)
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn adapter(&self) -> &DialectAdapter {
        &self.adapter
    }

    pub fn backend(&self) -> Backend {
        self.adapter.backend()
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Connections currently checked out, with how long each has been held.
    pub fn leases(&self) -> Vec<Lease> {
        self.pool.leases()
    }

    pub async fn acquire_connection(&self) -> DialectResult<PooledConnection<C>> {
        let handle = self.pool.acquire(None).await?;
        debug!(connection_id = handle.id(), "Acquired connection");
        Ok(handle)
    }

    pub async fn release_connection(&self, handle: PooledConnection<C>) {
        debug!(
            connection_id = handle.id(),
            broken = handle.is_broken(),
            "Releasing connection"
        );
        self.pool.release(handle).await;
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    /// Run a compiled query outside of any transaction.
    pub async fn execute_query(
        &self,
        handle: &mut PooledConnection<C>,
        query: &CompiledQuery,
    ) -> DialectResult<QueryResult> {
        debug!(
            connection_id = handle.id(),
            sql = %query.sql,
            params = query.parameters.len(),
            "Executing query"
        );
        run(
            handle,
            &query.sql,
            &query.parameters,
            query.returns_rows,
            self.options.query_timeout,
        )
        .await
    }

    /// Run a compiled query inside a transaction.
    ///
    /// DDL is rejected on backends where it would commit the transaction
    /// implicitly.
    pub async fn execute_in(
        &self,
        ctx: &mut TransactionContext<C>,
        query: &CompiledQuery,
    ) -> DialectResult<QueryResult> {
        ctx.ensure_active("execute")?;
        if query.kind == QueryKind::Ddl && !self.adapter.supports_transactional_ddl() {
            return Err(DialectError::compile(format!(
                "DDL inside a transaction is not supported by {}",
                self.adapter.backend()
            )));
        }
        let depth = ctx.depth;
        let connection_id = ctx.connection_id();
        let handle = ctx.handle_mut()?;
        debug!(
            connection_id,
            depth,
            sql = %query.sql,
            params = query.parameters.len(),
            "Executing query in transaction"
        );
        let result = run(
            handle,
            &query.sql,
            &query.parameters,
            query.returns_rows,
            self.options.query_timeout,
        )
        .await;

        match result {
            // The server has already rolled the whole transaction back
            Err(e) if e.is_transaction_abort() => {
                handle.mark_broken();
                ctx.depth = 0;
                warn!(connection_id, depth, error = %e, "Transaction aborted by the server");
                Err(DialectError::transaction(
                    format!("Transaction aborted: {e}"),
                    connection_id,
                ))
            }
            other => other,
        }
    }

    /// Stream a query's rows in batches of at most `batch_size`.
    ///
    /// The connection is busy until the stream is exhausted. Dropping the
    /// stream early, or a failed batch, leaves the connection broken.
    pub fn stream_query<'a>(
        &self,
        handle: &'a mut PooledConnection<C>,
        query: &'a CompiledQuery,
        batch_size: usize,
    ) -> BoxStream<'a, DialectResult<Vec<Row>>> {
        let connection_id = handle.id();
        let (conn, op) = match handle.begin_operation() {
            Ok(started) => started,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        debug!(connection_id, sql = %query.sql, batch_size, "Streaming query");

        let batches = conn
            .fetch(&query.sql, &query.parameters)
            .chunks(batch_size.max(1));
        stream::unfold(Some((batches, op)), move |state| async move {
            let (mut batches, op) = state?;
            match batches.next().await {
                Some(batch) => match batch.into_iter().collect::<DialectResult<Vec<Row>>>() {
                    Ok(rows) => Some((Ok(rows), Some((batches, op)))),
                    // `op` is dropped here without completing
                    Err(e) => Some((Err(e), None)),
                },
                None => {
                    op.complete();
                    debug!(connection_id, "Stream exhausted");
                    None
                }
            }
        })
        .boxed()
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Start a transaction on `handle`.
    ///
    /// An isolation level the backend does not support fails before any
    /// statement is sent; the connection then goes back to the pool unharmed.
    pub async fn begin_transaction(
        &self,
        mut handle: PooledConnection<C>,
        settings: TransactionSettings,
    ) -> DialectResult<TransactionContext<C>> {
        let connection_id = handle.id();
        if let Some(level) = settings.isolation_level
            && !self.adapter.supports_isolation_level(level)
        {
            return Err(DialectError::transaction(
                format!(
                    "Isolation level {level} is not supported by {}",
                    self.adapter.backend()
                ),
                connection_id,
            ));
        }
        if settings.access_mode == Some(AccessMode::ReadOnly)
            && self.adapter.backend() == Backend::SQLite
        {
            debug!(connection_id, "SQLite has no read-only transactions; using BEGIN");
        }

        for statement in begin_statements(self.adapter.backend(), &settings) {
            if let Err(e) = run(&mut handle, &statement, &[], false, self.options.query_timeout).await {
                handle.mark_broken();
                return Err(DialectError::transaction(
                    format!("{statement} failed: {e}"),
                    connection_id,
                ));
            }
        }

        debug!(
            connection_id,
            depth = 1,
            isolation = ?settings.isolation_level,
            access = ?settings.access_mode,
            "Transaction started"
        );
        Ok(TransactionContext {
            handle: Some(handle),
            depth: 1,
            settings,
        })
    }

    /// Open a nested level as a savepoint on the same connection.
    pub async fn begin_nested(&self, ctx: &mut TransactionContext<C>) -> DialectResult<()> {
        ctx.ensure_active("begin a nested transaction")?;
        if !self.adapter.supports_savepoints() {
            return Err(DialectError::transaction(
                format!("Savepoints are not supported by {}", self.adapter.backend()),
                ctx.connection_id(),
            ));
        }
        let depth = ctx.depth + 1;
        self.control(ctx, &format!("SAVEPOINT sp_{depth}")).await?;
        ctx.depth = depth;
        debug!(connection_id = ctx.connection_id(), depth, "Savepoint created");
        Ok(())
    }

    /// Commit the innermost level. Only the outermost level sends `COMMIT`.
    pub async fn commit(&self, ctx: &mut TransactionContext<C>) -> DialectResult<()> {
        ctx.ensure_active("commit")?;
        let depth = ctx.depth;
        let statement = if depth == 1 {
            "COMMIT".to_string()
        } else {
            format!("RELEASE SAVEPOINT sp_{depth}")
        };
        self.control(ctx, &statement).await?;
        ctx.depth -= 1;
        if depth == 1 {
            info!(connection_id = ctx.connection_id(), "Transaction committed");
        } else {
            debug!(connection_id = ctx.connection_id(), depth, "Savepoint released");
        }
        Ok(())
    }

    /// Roll back the innermost level.
    pub async fn rollback(&self, ctx: &mut TransactionContext<C>) -> DialectResult<()> {
        ctx.ensure_active("roll back")?;
        let depth = ctx.depth;
        let statement = if depth == 1 {
            "ROLLBACK".to_string()
        } else {
            format!("ROLLBACK TO SAVEPOINT sp_{depth}")
        };
        self.control(ctx, &statement).await?;
        ctx.depth -= 1;
        if depth == 1 {
            info!(connection_id = ctx.connection_id(), "Transaction rolled back");
        } else {
            debug!(connection_id = ctx.connection_id(), depth, "Rolled back to savepoint");
        }
        Ok(())
    }

    /// Recover the connection of a finished transaction.
    ///
    /// A context that is still active has its connection marked broken, so it
    /// is closed rather than reused once released.
    pub fn finish(&self, mut ctx: TransactionContext<C>) -> DialectResult<PooledConnection<C>> {
        let depth = ctx.depth;
        let mut handle = ctx
            .handle
            .take()
            .ok_or_else(|| DialectError::internal("transaction context has no connection"))?;
        if depth > 0 {
            warn!(
                connection_id = handle.id(),
                depth, "Finishing an active transaction; connection will be discarded"
            );
            handle.mark_broken();
        }
        ctx.depth = 0;
        Ok(handle)
    }

    /// Send a transaction control statement. Any failure breaks the connection
    /// and ends the transaction.
    async fn control(&self, ctx: &mut TransactionContext<C>, statement: &str) -> DialectResult<()> {
        let connection_id = ctx.connection_id();
        let depth = ctx.depth;
        let handle = ctx.handle_mut()?;
        match run(handle, statement, &[], false, self.options.query_timeout).await {
            Ok(_) => Ok(()),
            Err(e) => {
                handle.mark_broken();
                ctx.depth = 0;
                warn!(connection_id, depth, statement, error = %e, "Transaction statement failed");
                Err(DialectError::transaction(
                    format!("{statement} failed: {e}"),
                    connection_id,
                ))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Migration locks
    // -------------------------------------------------------------------------

    /// Take a named advisory lock for schema migrations.
    ///
    /// PostgreSQL uses a transaction-scoped lock released at commit or
    /// rollback. MySQL uses a session lock that must be released with
    /// [`Driver::release_migration_lock`]. SQLite needs no lock because its
    /// write transactions are already serialized.
    pub async fn acquire_migration_lock(
        &self,
        ctx: &mut TransactionContext<C>,
        name: &str,
    ) -> DialectResult<()> {
        ctx.ensure_active("acquire a migration lock")?;
        if name.is_empty() {
            return Err(DialectError::invalid_input("Migration lock name must not be empty"));
        }
        let connection_id = ctx.connection_id();
        let lock_timeout = self.options.migration_lock_timeout;
        let handle = ctx.handle_mut()?;

        match self.adapter.backend() {
            Backend::PostgreSQL => {
                run(
                    handle,
                    "SELECT pg_advisory_xact_lock(hashtext($1))",
                    &[Value::from(name)],
                    false,
                    None,
                )
                .await?;
            }
            Backend::MySQL => {
                let timeout_secs = i64::try_from(lock_timeout.as_secs()).unwrap_or(i64::MAX);
                let result = run(
                    handle,
                    "SELECT GET_LOCK(?, ?) AS acquired",
                    &[Value::from(name), Value::Int(timeout_secs)],
                    true,
                    None,
                )
                .await?;
                let acquired = result
                    .rows
                    .first()
                    .and_then(|row| row.get_index(0))
                    .and_then(Value::as_i64);
                if acquired != Some(1) {
                    return Err(DialectError::timeout(
                        format!("migration lock '{name}'"),
                        lock_timeout.as_millis() as u64,
                    ));
                }
            }
            Backend::SQLite => {}
        }
        info!(connection_id, lock = name, "Migration lock acquired");
        Ok(())
    }

    /// Release a lock taken by [`Driver::acquire_migration_lock`]. A no-op
    /// where the lock ends with the transaction.
    ///
    /// Must be called before the outermost commit or rollback.
    pub async fn release_migration_lock(
        &self,
        ctx: &mut TransactionContext<C>,
        name: &str,
    ) -> DialectResult<()> {
        ctx.ensure_active("release a migration lock")?;
        if self.adapter.backend() != Backend::MySQL {
            return Ok(());
        }
        let connection_id = ctx.connection_id();
        let handle = ctx.handle_mut()?;
        run(handle, "SELECT RELEASE_LOCK(?)", &[Value::from(name)], false, None).await?;
        debug!(connection_id, lock = name, "Migration lock released");
        Ok(())
    }

    /// Close the pool if this driver's dialect created it.
    pub async fn destroy(&self) {
        if self.owns_pool {
            self.pool.close().await;
        }
    }
}

/// Run one statement on a pooled connection.
///
/// A timed-out or cancelled statement leaves the connection broken, as does a
/// connection-level failure.
async fn run<C: Connector>(
    handle: &mut PooledConnection<C>,
    sql: &str,
    params: &[Value],
    returns_rows: bool,
    timeout: Option<Duration>,
) -> DialectResult<QueryResult> {
    let (conn, op) = handle.begin_operation()?;
    let statement = async move {
        if returns_rows {
            conn.fetch_all(sql, params).await
        } else {
            conn.execute(sql, params).await
        }
    };

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, statement).await {
            Ok(result) => result,
            Err(_) => {
                drop(op);
                handle.mark_broken();
                return Err(DialectError::timeout("query", limit.as_millis() as u64));
            }
        },
        None => statement.await,
    };
    op.complete();

    if let Err(DialectError::Connection { .. }) = &result {
        handle.mark_broken();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "REPEATABLE READ");
        assert_eq!(
            serde_json::to_string(&IsolationLevel::ReadCommitted).unwrap(),
            "\"read_committed\""
        );
    }

    #[test]
    fn test_begin_statements_postgres() {
        let default = begin_statements(Backend::PostgreSQL, &TransactionSettings::new());
        assert_eq!(default, vec!["BEGIN"]);

        let settings = TransactionSettings::new()
            .with_isolation_level(IsolationLevel::Serializable)
            .read_only();
        assert_eq!(
            begin_statements(Backend::PostgreSQL, &settings),
            vec!["START TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY"]
        );
    }

    #[test]
    fn test_begin_statements_mysql() {
        let settings =
            TransactionSettings::new().with_isolation_level(IsolationLevel::ReadCommitted);
        assert_eq!(
            begin_statements(Backend::MySQL, &settings),
            vec![
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                "START TRANSACTION"
            ]
        );
    }

    #[test]
    fn test_begin_statements_sqlite_ignores_access_mode() {
        let settings = TransactionSettings::new().read_only();
        assert_eq!(begin_statements(Backend::SQLite, &settings), vec!["BEGIN"]);
    }

    #[test]
    fn test_driver_options_default() {
        let options = DriverOptions::default();
        assert!(options.query_timeout.is_none());
        assert_eq!(options.migration_lock_timeout, Duration::from_secs(60));
    }
}
