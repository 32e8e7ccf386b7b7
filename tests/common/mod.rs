//! Shared test support: a scripted in-memory connector.
//!
//! `MockConnector` records every statement it receives, fails statements that
//! match a registered pattern and answers row-returning statements from a
//! table of canned responses. Nothing touches a real database.

#![allow(dead_code)]

use db_dialect::db::{Connection, ConnectionPool, Connector, PoolConfig};
use db_dialect::error::{DialectError, DialectResult};
use db_dialect::models::{QueryResult, Row, Value};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One statement as seen by a mock connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub connection: u64,
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
pub struct MockState {
    statements: Mutex<Vec<Statement>>,
    failures: Mutex<Vec<(String, String)>>,
    responses: Mutex<Vec<(String, Vec<Row>)>>,
    delay_ms: AtomicU64,
    fail_ping: AtomicBool,
    fail_connect: AtomicBool,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl MockState {
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql_log(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub fn clear_log(&self) {
        self.statements.lock().unwrap().clear();
    }

    /// Fail every statement whose SQL contains `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.fail_with_state(pattern, "XX000");
    }

    /// Fail statements containing `pattern` with the given SQLSTATE.
    pub fn fail_with_state(&self, pattern: &str, sql_state: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((pattern.to_string(), sql_state.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Answer statements containing `pattern` with `rows`.
    pub fn respond(&self, pattern: &str, rows: Vec<Row>) {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), rows));
    }

    /// Delay every statement by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Physical connections opened so far.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Physical connections closed so far.
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, connection: u64, sql: &str, params: &[Value]) {
        self.statements.lock().unwrap().push(Statement {
            connection,
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }

    fn failure_for(&self, sql: &str) -> Option<String> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, sql_state)| sql_state.clone())
    }

    fn rows_for(&self, sql: &str) -> Vec<Row> {
        self.responses
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    fn delay(&self) -> Option<Duration> {
        match self.delay_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self) -> BoxFuture<'_, DialectResult<MockConnection>> {
        Box::pin(async move {
            if self.state.fail_connect.load(Ordering::SeqCst) {
                return Err(DialectError::connection("connection refused", "Start the server"));
            }
            let serial = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MockConnection {
                serial,
                state: Arc::clone(&self.state),
            })
        })
    }
}

pub struct MockConnection {
    pub serial: u64,
    state: Arc<MockState>,
}

impl MockConnection {
    async fn run(&self, sql: &str, params: &[Value]) -> DialectResult<()> {
        self.state.record(self.serial, sql, params);
        if let Some(delay) = self.state.delay() {
            tokio::time::sleep(delay).await;
        }
        if let Some(sql_state) = self.state.failure_for(sql) {
            return Err(DialectError::database(
                format!("scripted failure: {sql}"),
                Some(sql_state),
            ));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, DialectResult<QueryResult>> {
        Box::pin(async move {
            self.run(sql, params).await?;
            Ok(QueryResult::from_rows(Vec::new(), self.state.rows_for(sql)))
        })
    }

    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, DialectResult<QueryResult>> {
        Box::pin(async move {
            self.run(sql, params).await?;
            Ok(QueryResult::from_affected(1, None))
        })
    }

    fn fetch<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxStream<'a, DialectResult<Row>> {
        let this = &*self;
        stream::once(async move {
            this.run(sql, params).await?;
            Ok(this.state.rows_for(sql))
        })
        .flat_map(|result: DialectResult<Vec<Row>>| match result {
            Ok(rows) => stream::iter(rows.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(e) => stream::iter(vec![Err(e)]),
        })
        .boxed()
    }

    fn ping(&mut self) -> BoxFuture<'_, DialectResult<()>> {
        Box::pin(async move {
            if self.state.fail_ping.load(Ordering::SeqCst) {
                return Err(DialectError::connection("server has gone away", "Reconnect"));
            }
            Ok(())
        })
    }

    fn close(self) -> BoxFuture<'static, DialectResult<()>> {
        Box::pin(async move {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Pool config for tests: short acquire timeout, no reaper, no pings.
pub fn test_config(max_connections: u32) -> PoolConfig {
    PoolConfig::default()
        .with_max_connections(max_connections)
        .with_acquire_timeout(Duration::from_millis(200))
        .with_idle_timeout(None)
        .with_test_before_acquire(false)
}

pub fn mock_pool(max_connections: u32) -> (Arc<ConnectionPool<MockConnector>>, Arc<MockState>) {
    let connector = MockConnector::new();
    let state = Arc::clone(&connector.state);
    (ConnectionPool::new(connector, test_config(max_connections)), state)
}

/// Rows of `(name, value)` pairs, as a catalog query would return them.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    Row::from_pairs(pairs)
}
