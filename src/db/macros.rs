//! Backend dispatch macros for reducing code duplication.
//!
//! These macros generate backend-specific implementations while keeping the
//! call sites linear. They expand at compile time with zero runtime overhead.

/// Macro for generating match arms over `DbConnection` variants.
///
/// Each arm is type-checked against its own sqlx connection type, so the same
/// body can call generic sqlx APIs for every backend.
///
/// # Example
///
/// ```ignore
/// impl_conn_dispatch!(conn, {
///     Postgres(c) => sqlx::Connection::ping(c).await,
///     MySql(c) => sqlx::Connection::ping(c).await,
///     SQLite(c) => sqlx::Connection::ping(c).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_conn_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

/// Generate the statement functions of one backend module.
///
/// Statements without parameters go through sqlx's unprepared text protocol,
/// which MySQL requires for transaction control statements such as
/// `SAVEPOINT`.
macro_rules! impl_backend_statements {
    ($module:ident, $conn:ty, $bind:path, $insert_id:expr) => {
        pub(crate) mod $module {
            use super::*;

            pub async fn fetch_all(
                conn: &mut $conn,
                sql: &str,
                params: &[Value],
            ) -> DialectResult<QueryResult> {
                let rows = if params.is_empty() {
                    sqlx::Executor::fetch_all(&mut *conn, sql).await?
                } else {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = $bind(query, param);
                    }
                    query.fetch_all(&mut *conn).await?
                };
                let (columns, rows) = decode_rows(&rows)?;
                Ok(QueryResult::from_rows(columns, rows))
            }

            pub async fn execute(
                conn: &mut $conn,
                sql: &str,
                params: &[Value],
            ) -> DialectResult<QueryResult> {
                let result = if params.is_empty() {
                    sqlx::Executor::execute(&mut *conn, sql).await?
                } else {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = $bind(query, param);
                    }
                    query.execute(&mut *conn).await?
                };
                Ok(QueryResult::from_affected(
                    result.rows_affected(),
                    ($insert_id)(&result),
                ))
            }

            pub fn fetch<'a>(
                conn: &'a mut $conn,
                sql: &'a str,
                params: &'a [Value],
            ) -> BoxStream<'a, DialectResult<Row>> {
                let rows = if params.is_empty() {
                    sqlx::Executor::fetch(conn, sql)
                } else {
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = $bind(query, param);
                    }
                    query.fetch(conn)
                };
                let mut columns: Option<Arc<[String]>> = None;
                rows.map(move |row| {
                    let row = row?;
                    let names = columns.get_or_insert_with(|| row.column_names());
                    row.decode_row(Arc::clone(names))
                })
                .boxed()
            }
        }
    };
}

pub use impl_conn_dispatch;
