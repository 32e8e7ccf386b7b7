//! Error types for the dialect layer.
//!
//! Every failure is surfaced to the caller. Errors that leave a physical
//! connection in an unknown state are additionally reflected by marking the
//! connection broken, but the error itself is never swallowed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DialectError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timed out after {waited_ms}ms waiting for a pooled connection")]
    PoolTimeout { waited_ms: u64 },

    #[error("Transaction error: {message} (connection: {connection_id})")]
    Transaction { message: String, connection_id: u64 },

    #[error("Compile error: {message}")]
    Compile { message: String },

    #[error("Introspection failed: {message} (object: {object})")]
    Introspection { message: String, object: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DialectError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn pool_timeout(waited_ms: u64) -> Self {
        Self::PoolTimeout { waited_ms }
    }

    /// Create a transaction error for the given physical connection.
    pub fn transaction(message: impl Into<String>, connection_id: u64) -> Self {
        Self::Transaction {
            message: message.into(),
            connection_id,
        }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    /// Create an introspection error naming the catalog object that failed.
    pub fn introspection(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Introspection {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::PoolTimeout { .. } => {
                Some("Increase max_connections or acquire_timeout, or release connections sooner")
            }
            _ => None,
        }
    }

    /// SQLSTATE reported by the backend, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Deadlock or serialization failure: the server has rolled back the
    /// enclosing transaction. PostgreSQL reports `40P01`/`40001`, MySQL
    /// reports deadlocks (error 1213) as `40001`.
    pub fn is_transaction_abort(&self) -> bool {
        match self {
            Self::Database { sql_state, message } => {
                matches!(sql_state.as_deref(), Some("40001" | "40P01"))
                    || message.starts_with("Deadlock found")
            }
            _ => false,
        }
    }

    /// Whether a caller-side retry could plausibly succeed.
    ///
    /// Advisory only: nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout { .. } | Self::Timeout { .. } | Self::Connection { .. }
        )
    }

    /// Re-label a statement failure as an introspection failure on `object`.
    pub(crate) fn into_introspection(self, object: impl Into<String>) -> Self {
        match self {
            err @ Self::Introspection { .. } => err,
            other => Self::introspection(other.to_string(), object),
        }
    }
}

/// Convert sqlx errors to DialectError.
impl From<sqlx::Error> for DialectError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DialectError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DialectError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DialectError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => DialectError::pool_timeout(0),
            sqlx::Error::PoolClosed => {
                DialectError::connection("Connection pool is closed", "Create a new dialect")
            }
            sqlx::Error::Io(io_err) => DialectError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DialectError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DialectError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DialectError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DialectError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DialectError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => DialectError::connection(
                "Database worker crashed",
                "The connection is unusable; acquire a new one",
            ),
            _ => DialectError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for dialect operations.
pub type DialectResult<T> = Result<T, DialectError>;
