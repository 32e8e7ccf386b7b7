//! Data models shared by every component of the dialect layer.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::Backend;
pub use query::{ColumnInfo, QueryResult, Row, Value};
pub use schema::{
    ColumnMetadata, ConstraintKind, ConstraintMetadata, DatabaseMetadata, ForeignKeyAction,
    IntrospectOptions, SchemaMetadata, TableMetadata,
};
