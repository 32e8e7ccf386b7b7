//! Abstract queries and their compilation to SQL.

pub mod ast;
pub mod compiler;

pub use ast::{
    BinaryOp, ColumnDef, ColumnRef, ColumnType, ConflictAction, CreateTable, DefaultValue,
    DeleteQuery, Direction, DropTable, Expr, ForeignKeyDef, InsertQuery, Join, JoinKind, LockMode,
    NullsOrder, OnConflict, OrderBy, QueryNode, RawQuery, SelectItem, SelectQuery, TableRef,
    UnaryOp, UpdateQuery,
};
pub use compiler::{CompiledQuery, QueryCompiler, QueryKind};
