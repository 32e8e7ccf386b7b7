//! Schema introspection.
//!
//! [`DatabaseIntrospector`] reads the system catalogs through a [`Driver`] and
//! normalizes whatever shape each backend returns into the canonical metadata
//! types of [`crate::models::schema`].
//!
//! # Architecture
//!
//! Catalog SQL lives in the `queries` submodule, one constant per question and
//! backend. PostgreSQL and MySQL answer the same three questions (tables,
//! columns, key constraints) with the same column aliases, so their rows go
//! through one assembler. SQLite has no information schema and is read table by
//! table through the `pragma_*` table-valued functions.
//!
//! Every call checks out one connection and returns it before finishing. A
//! failing or oddly shaped catalog query fails the whole call with an
//! introspection error; partial metadata is never returned.

use crate::db::connection::Connector;
use crate::db::driver::Driver;
use crate::db::pool::PooledConnection;
use crate::error::{DialectError, DialectResult};
use crate::models::{
    Backend, ColumnMetadata, ConstraintKind, ConstraintMetadata, DatabaseMetadata,
    ForeignKeyAction, IntrospectOptions, Row, SchemaMetadata, TableMetadata, Value,
};
use crate::query::{CompiledQuery, QueryKind};
use std::collections::HashMap;
use tracing::debug;

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// information_schema columns use domain types that the drivers cannot decode
// directly, so PostgreSQL results are cast to plain types and MySQL results
// are converted to utf8mb4.

mod queries {
    pub mod postgres {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT nspname::text AS name
            FROM pg_catalog.pg_namespace
            WHERE nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            AND nspname NOT LIKE 'pg\_temp\_%'
            AND nspname NOT LIKE 'pg\_toast\_temp\_%'
            ORDER BY nspname
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                table_name::text AS table_name,
                table_schema::text AS table_schema,
                table_type::text AS table_type
            FROM information_schema.tables
            WHERE table_schema = $1
            AND table_type IN ('BASE TABLE', 'VIEW')
            AND ($2::text IS NULL OR table_name = $2::text)
            ORDER BY table_name
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                c.table_name::text AS table_name,
                c.column_name::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                (c.is_nullable = 'YES') AS is_nullable,
                (c.column_default IS NOT NULL OR c.is_identity = 'YES') AS has_default,
                (c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') AS is_auto_increment,
                c.ordinal_position::int AS ordinal,
                col_description(a.attrelid, a.attnum) AS comment
            FROM information_schema.columns c
            JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
            JOIN pg_catalog.pg_class t ON t.relnamespace = n.oid AND t.relname = c.table_name
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
            WHERE c.table_schema = $1
            AND ($2::text IS NULL OR c.table_name = $2::text)
            ORDER BY c.table_name, c.ordinal_position
            "#;

        pub const LIST_CONSTRAINTS: &str = r#"
            SELECT
                con.conname::text AS constraint_name,
                cls.relname::text AS table_name,
                con.contype::text AS constraint_type,
                att.attname::text AS column_name,
                k.ord::int AS position,
                ref_cls.relname::text AS referenced_table,
                ref_att.attname::text AS referenced_column,
                con.confdeltype::text AS on_delete,
                con.confupdtype::text AS on_update
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class cls ON cls.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = cls.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_catalog.pg_attribute att
                ON att.attrelid = con.conrelid AND att.attnum = k.attnum
            LEFT JOIN pg_catalog.pg_class ref_cls ON ref_cls.oid = con.confrelid
            LEFT JOIN pg_catalog.pg_attribute ref_att
                ON ref_att.attrelid = con.confrelid AND ref_att.attnum = con.confkey[k.ord::int]
            WHERE n.nspname = $1
            AND con.contype IN ('p', 'u', 'f')
            AND ($2::text IS NULL OR cls.relname = $2::text)
            ORDER BY cls.relname, con.conname, k.ord
            "#;
    }

    pub mod mysql {
        pub const LIST_SCHEMAS: &str = r#"
            SELECT CONVERT(SCHEMA_NAME USING utf8mb4) AS name
            FROM information_schema.SCHEMATA
            WHERE SCHEMA_NAME NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
            ORDER BY SCHEMA_NAME
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8mb4) AS table_name,
                CONVERT(TABLE_SCHEMA USING utf8mb4) AS table_schema,
                CONVERT(TABLE_TYPE USING utf8mb4) AS table_type
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            AND TABLE_NAME = COALESCE(?, TABLE_NAME)
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8mb4) AS table_name,
                CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
                CONVERT(COLUMN_TYPE USING utf8mb4) AS data_type,
                CAST(IS_NULLABLE = 'YES' AS SIGNED) AS is_nullable,
                CAST(COLUMN_DEFAULT IS NOT NULL AS SIGNED) AS has_default,
                CAST(EXTRA LIKE '%auto_increment%' AS SIGNED) AS is_auto_increment,
                CAST(ORDINAL_POSITION AS SIGNED) AS ordinal,
                CONVERT(COLUMN_COMMENT USING utf8mb4) AS comment
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_NAME = COALESCE(?, TABLE_NAME)
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;

        pub const LIST_CONSTRAINTS: &str = r#"
            SELECT
                CONVERT(tc.CONSTRAINT_NAME USING utf8mb4) AS constraint_name,
                CONVERT(tc.TABLE_NAME USING utf8mb4) AS table_name,
                CONVERT(tc.CONSTRAINT_TYPE USING utf8mb4) AS constraint_type,
                CONVERT(kcu.COLUMN_NAME USING utf8mb4) AS column_name,
                CAST(kcu.ORDINAL_POSITION AS SIGNED) AS position,
                CONVERT(kcu.REFERENCED_TABLE_NAME USING utf8mb4) AS referenced_table,
                CONVERT(kcu.REFERENCED_COLUMN_NAME USING utf8mb4) AS referenced_column,
                CONVERT(rc.DELETE_RULE USING utf8mb4) AS on_delete,
                CONVERT(rc.UPDATE_RULE USING utf8mb4) AS on_update
            FROM information_schema.TABLE_CONSTRAINTS tc
            JOIN information_schema.KEY_COLUMN_USAGE kcu
                ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND kcu.TABLE_NAME = tc.TABLE_NAME
            LEFT JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
                ON rc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                AND rc.TABLE_NAME = tc.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND tc.TABLE_NAME = COALESCE(?, tc.TABLE_NAME)
            AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
            ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_SCHEMAS: &str = "SELECT name FROM pragma_database_list ORDER BY seq";

        pub const LIST_TABLES: &str = r#"
            SELECT name AS table_name, type AS table_type
            FROM sqlite_master
            WHERE type IN ('table', 'view')
            ORDER BY name
            "#;

        pub const TABLE_INFO: &str = r#"
            SELECT cid, name, type, "notnull" AS not_null, dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT id, seq, "table" AS referenced_table, "from" AS column_name,
                "to" AS referenced_column, on_update, on_delete
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#;

        pub const INDEX_LIST: &str = r#"
            SELECT name, origin
            FROM pragma_index_list(?)
            ORDER BY name
            "#;

        pub const INDEX_COLUMNS: &str = "SELECT name FROM pragma_index_info(?) ORDER BY seqno";

        /// Tables whose names start with `sqlite_` belong to SQLite itself.
        pub const INTERNAL_PREFIX: &str = "sqlite_";
    }
}

/// Reads catalog metadata through a driver.
pub struct DatabaseIntrospector<C: Connector> {
    driver: Driver<C>,
}

impl<C: Connector> std::fmt::Debug for DatabaseIntrospector<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseIntrospector")
            .field("backend", &self.driver.backend())
            .finish()
    }
}

impl<C: Connector> DatabaseIntrospector<C> {
    pub fn new(driver: Driver<C>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &Driver<C> {
        &self.driver
    }

    /// List user schemas (SQLite: attached databases).
    pub async fn get_schemas(&self) -> DialectResult<Vec<SchemaMetadata>> {
        let sql = match self.driver.backend() {
            Backend::PostgreSQL => queries::postgres::LIST_SCHEMAS,
            Backend::MySQL => queries::mysql::LIST_SCHEMAS,
            Backend::SQLite => queries::sqlite::LIST_SCHEMAS,
        };
        let mut handle = self.driver.acquire_connection().await?;
        let result = self.fetch(&mut handle, "schemas", sql, Vec::new()).await;
        self.driver.release_connection(handle).await;

        let schemas = result?
            .iter()
            .map(|row| text(row, "name", "schemas").map(|name| SchemaMetadata { name }))
            .collect::<DialectResult<Vec<_>>>()?;
        debug!(count = schemas.len(), backend = %self.driver.backend(), "Listed schemas");
        Ok(schemas)
    }

    /// Tables (and optionally views) with their columns and key constraints.
    pub async fn get_tables(&self, options: &IntrospectOptions) -> DialectResult<Vec<TableMetadata>> {
        let mut handle = self.driver.acquire_connection().await?;
        let result = self.load_tables(&mut handle, options, None).await;
        self.driver.release_connection(handle).await;

        let tables = result?;
        debug!(
            count = tables.len(),
            backend = %self.driver.backend(),
            schema = ?options.schema,
            "Introspected tables"
        );
        Ok(tables)
    }

    pub async fn get_metadata(&self, options: &IntrospectOptions) -> DialectResult<DatabaseMetadata> {
        Ok(DatabaseMetadata {
            tables: self.get_tables(options).await?,
        })
    }

    /// Metadata of one table or view.
    pub async fn describe_table(&self, name: &str, schema: Option<&str>) -> DialectResult<TableMetadata> {
        let mut options = IntrospectOptions::new().with_views(true).with_internal(true);
        options.schema = schema.map(String::from);

        let mut handle = self.driver.acquire_connection().await?;
        let result = self.load_tables(&mut handle, &options, Some(name)).await;
        self.driver.release_connection(handle).await;

        result?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| DialectError::introspection(format!("Table '{name}' not found"), name))
    }

    async fn load_tables(
        &self,
        handle: &mut PooledConnection<C>,
        options: &IntrospectOptions,
        only: Option<&str>,
    ) -> DialectResult<Vec<TableMetadata>> {
        match self.driver.backend() {
            Backend::PostgreSQL => {
                let schema = options.schema.clone().unwrap_or_else(|| "public".to_string());
                let params = vec![Value::Text(schema), text_or_null(only)];
                self.load_catalog(handle, options, params, [
                    queries::postgres::LIST_TABLES,
                    queries::postgres::LIST_COLUMNS,
                    queries::postgres::LIST_CONSTRAINTS,
                ])
                .await
            }
            Backend::MySQL => {
                let params = vec![text_or_null(options.schema.as_deref()), text_or_null(only)];
                self.load_catalog(handle, options, params, [
                    queries::mysql::LIST_TABLES,
                    queries::mysql::LIST_COLUMNS,
                    queries::mysql::LIST_CONSTRAINTS,
                ])
                .await
            }
            Backend::SQLite => self.load_sqlite(handle, options, only).await,
        }
    }

    /// Three catalog queries sharing one parameter list: tables, columns,
    /// key constraints.
    async fn load_catalog(
        &self,
        handle: &mut PooledConnection<C>,
        options: &IntrospectOptions,
        params: Vec<Value>,
        [tables_sql, columns_sql, constraints_sql]: [&str; 3],
    ) -> DialectResult<Vec<TableMetadata>> {
        let tables = self.fetch(handle, "tables", tables_sql, params.clone()).await?;
        let columns = self.fetch(handle, "columns", columns_sql, params.clone()).await?;
        let constraints = self.fetch(handle, "constraints", constraints_sql, params).await?;
        assemble_catalog(&tables, &columns, &constraints, options.include_views)
    }

    async fn load_sqlite(
        &self,
        handle: &mut PooledConnection<C>,
        options: &IntrospectOptions,
        only: Option<&str>,
    ) -> DialectResult<Vec<TableMetadata>> {
        let rows = self
            .fetch(handle, "sqlite_master", queries::sqlite::LIST_TABLES, Vec::new())
            .await?;

        let mut tables = Vec::new();
        for row in &rows {
            let name = text(row, "table_name", "sqlite_master")?;
            let is_view = text(row, "table_type", "sqlite_master")? == "view";
            if only.is_some_and(|wanted| wanted != name)
                || (is_view && !options.include_views)
                || (!options.include_internal && name.starts_with(queries::sqlite::INTERNAL_PREFIX))
            {
                continue;
            }
            tables.push(self.load_sqlite_table(handle, name, is_view).await?);
        }
        Ok(tables)
    }

    async fn load_sqlite_table(
        &self,
        handle: &mut PooledConnection<C>,
        name: String,
        is_view: bool,
    ) -> DialectResult<TableMetadata> {
        let param = || vec![Value::Text(name.clone())];
        let info = self.fetch(handle, &name, queries::sqlite::TABLE_INFO, param()).await?;
        if info.is_empty() {
            return Err(DialectError::introspection("Table has no columns", name));
        }
        let mut foreign_keys = self.fetch(handle, &name, queries::sqlite::FOREIGN_KEYS, param()).await?;
        let indexes = self.fetch(handle, &name, queries::sqlite::INDEX_LIST, param()).await?;

        let mut unique = Vec::new();
        for index in &indexes {
            if opt_text(index, "origin", &name)?.as_deref() != Some("u") {
                continue;
            }
            let index_name = text(index, "name", &name)?;
            let columns = self
                .fetch(handle, &index_name, queries::sqlite::INDEX_COLUMNS, vec![Value::Text(index_name.clone())])
                .await?
                .iter()
                .map(|row| text(row, "name", &index_name))
                .collect::<DialectResult<Vec<_>>>()?;
            unique.push(columns);
        }

        // A foreign key without target columns references the primary key
        for fk in foreign_keys.iter_mut() {
            if opt_text(fk, "referenced_column", &name)?.is_some() {
                continue;
            }
            let referenced = text(fk, "referenced_table", &name)?;
            let seq = usize::try_from(int(fk, "seq", &name)?).unwrap_or_default();
            let target = self
                .fetch(handle, &referenced, queries::sqlite::TABLE_INFO, vec![Value::Text(referenced.clone())])
                .await?;
            let pk = sqlite_primary_key(&target, &referenced)?;
            let column = pk.get(seq).cloned().ok_or_else(|| {
                DialectError::introspection("Foreign key target has no matching primary key column", &referenced)
            })?;
            *fk = Row::from_pairs(
                fk.columns()
                    .iter()
                    .cloned()
                    .zip(fk.values().iter().cloned())
                    .map(|(col, value)| {
                        if col == "referenced_column" {
                            (col, Value::Text(column.clone()))
                        } else {
                            (col, value)
                        }
                    }),
            );
        }

        assemble_sqlite_table(name, is_view, &info, &foreign_keys, unique)
    }

    async fn fetch(
        &self,
        handle: &mut PooledConnection<C>,
        object: &str,
        sql: &str,
        parameters: Vec<Value>,
    ) -> DialectResult<Vec<Row>> {
        let query = CompiledQuery {
            sql: sql.to_string(),
            parameters,
            kind: QueryKind::Raw,
            returns_rows: true,
        };
        self.driver
            .execute_query(handle, &query)
            .await
            .map(|result| result.rows)
            .map_err(|e| e.into_introspection(object))
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

// =============================================================================
// Row normalization
// =============================================================================

fn shape_error(object: &str, column: &str) -> DialectError {
    DialectError::introspection(
        format!("Unexpected catalog row: column '{column}' is missing or has the wrong type"),
        object,
    )
}

fn opt_text(row: &Row, column: &str, object: &str) -> DialectResult<Option<String>> {
    match row.get(column) {
        Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s.clone())),
        Some(Value::Bytes(b)) => String::from_utf8(b.clone())
            .map(Some)
            .map_err(|_| shape_error(object, column)),
        _ => Err(shape_error(object, column)),
    }
}

fn text(row: &Row, column: &str, object: &str) -> DialectResult<String> {
    opt_text(row, column, object)?.ok_or_else(|| shape_error(object, column))
}

fn int(row: &Row, column: &str, object: &str) -> DialectResult<i64> {
    match row.get(column) {
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Text(s)) => s.trim().parse().map_err(|_| shape_error(object, column)),
        _ => Err(shape_error(object, column)),
    }
}

fn flag(row: &Row, column: &str, object: &str) -> DialectResult<bool> {
    match row.get(column) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Int(i)) => Ok(*i != 0),
        Some(Value::Text(s)) if s.eq_ignore_ascii_case("yes") || s == "1" => Ok(true),
        Some(Value::Text(s)) if s.eq_ignore_ascii_case("no") || s == "0" => Ok(false),
        _ => Err(shape_error(object, column)),
    }
}

/// PostgreSQL stores referential actions as single-letter codes.
fn referential_action(raw: Option<&str>) -> ForeignKeyAction {
    match raw {
        Some("a") | None => ForeignKeyAction::NoAction,
        Some("r") => ForeignKeyAction::Restrict,
        Some("c") => ForeignKeyAction::Cascade,
        Some("n") => ForeignKeyAction::SetNull,
        Some("d") => ForeignKeyAction::SetDefault,
        Some(other) => ForeignKeyAction::parse(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Primary,
    Unique,
    Foreign,
}

fn key_kind(raw: &str) -> Option<KeyKind> {
    match raw {
        "p" | "PRIMARY KEY" => Some(KeyKind::Primary),
        "u" | "UNIQUE" => Some(KeyKind::Unique),
        "f" | "FOREIGN KEY" => Some(KeyKind::Foreign),
        _ => None,
    }
}

/// Build table metadata from information-schema shaped rows.
///
/// Rows must be ordered by table, then constraint name and key position.
fn assemble_catalog(
    table_rows: &[Row],
    column_rows: &[Row],
    constraint_rows: &[Row],
    include_views: bool,
) -> DialectResult<Vec<TableMetadata>> {
    let mut tables = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in table_rows {
        let name = text(row, "table_name", "tables")?;
        let schema = text(row, "table_schema", "tables")?;
        let is_view = text(row, "table_type", "tables")? == "VIEW";
        if is_view && !include_views {
            continue;
        }
        index.insert(name.clone(), tables.len());
        tables.push(TableMetadata::new(name, is_view).with_schema(schema));
    }

    for row in column_rows {
        let table_name = text(row, "table_name", "columns")?;
        let Some(&i) = index.get(&table_name) else {
            continue;
        };
        let ordinal = int(row, "ordinal", "columns")?;
        let mut column = ColumnMetadata::new(
            text(row, "column_name", "columns")?,
            text(row, "data_type", "columns")?,
            flag(row, "is_nullable", "columns")?,
        )
        .with_default_value(flag(row, "has_default", "columns")?)
        .with_auto_increment(flag(row, "is_auto_increment", "columns")?)
        .with_ordinal(u32::try_from(ordinal).map_err(|_| shape_error("columns", "ordinal"))?);
        if let Some(comment) = opt_text(row, "comment", "columns")?.filter(|c| !c.is_empty()) {
            column = column.with_comment(comment);
        }
        tables[i].columns.push(column);
    }

    // (table index, constraint name) -> position in that table's constraints
    let mut current: Option<(usize, String)> = None;
    for row in constraint_rows {
        let table_name = text(row, "table_name", "constraints")?;
        let Some(&i) = index.get(&table_name) else {
            continue;
        };
        let name = text(row, "constraint_name", "constraints")?;
        let raw_kind = text(row, "constraint_type", "constraints")?;
        let kind = key_kind(&raw_kind).ok_or_else(|| shape_error("constraints", "constraint_type"))?;
        let column = text(row, "column_name", "constraints")?;

        let continues = current.as_ref().is_some_and(|(ti, n)| *ti == i && *n == name);
        if !continues {
            let constraint = match kind {
                KeyKind::Primary => ConstraintMetadata::primary_key(Vec::new()),
                KeyKind::Unique => ConstraintMetadata::unique(Vec::new()),
                KeyKind::Foreign => ConstraintMetadata::foreign_key(
                    Vec::new(),
                    text(row, "referenced_table", "constraints")?,
                    Vec::new(),
                )
                .with_actions(
                    referential_action(opt_text(row, "on_delete", "constraints")?.as_deref()),
                    referential_action(opt_text(row, "on_update", "constraints")?.as_deref()),
                ),
            };
            tables[i].constraints.push(constraint.with_name(name.clone()));
            current = Some((i, name));
        }

        let Some(constraint) = tables[i].constraints.last_mut() else {
            continue;
        };
        constraint.columns.push(column);
        if let ConstraintKind::ForeignKey {
            referenced_columns, ..
        } = &mut constraint.kind
        {
            referenced_columns.push(text(row, "referenced_column", "constraints")?);
        }
    }

    for table in &mut tables {
        mark_primary_key(table);
    }
    Ok(tables)
}

/// Flag primary key columns; they are reported as non-nullable on every backend.
fn mark_primary_key(table: &mut TableMetadata) {
    let pk: Vec<String> = table.primary_key().into_iter().map(String::from).collect();
    for column in &mut table.columns {
        if pk.contains(&column.name) {
            column.is_primary_key = true;
            column.is_nullable = false;
        }
    }
}

/// Primary key columns from `pragma_table_info` rows, in key order.
fn sqlite_primary_key(info: &[Row], object: &str) -> DialectResult<Vec<String>> {
    let mut keyed = Vec::new();
    for row in info {
        let position = int(row, "pk", object)?;
        if position > 0 {
            keyed.push((position, text(row, "name", object)?));
        }
    }
    keyed.sort_by_key(|(position, _)| *position);
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

fn assemble_sqlite_table(
    name: String,
    is_view: bool,
    info: &[Row],
    foreign_keys: &[Row],
    unique: Vec<Vec<String>>,
) -> DialectResult<TableMetadata> {
    let object = name.clone();
    let pk = sqlite_primary_key(info, &object)?;
    let mut table = TableMetadata::new(name, is_view);

    for row in info {
        let column_name = text(row, "name", &object)?;
        let data_type = opt_text(row, "type", &object)?.unwrap_or_default();
        // Only a lone INTEGER PRIMARY KEY aliases the auto-assigned rowid
        let auto_increment =
            pk.len() == 1 && pk[0] == column_name && data_type.eq_ignore_ascii_case("INTEGER");
        let has_default = opt_text(row, "dflt_value", &object)?.is_some() || auto_increment;
        let ordinal = int(row, "cid", &object)? + 1;

        table.columns.push(
            ColumnMetadata::new(column_name, data_type, !flag(row, "not_null", &object)?)
                .with_auto_increment(auto_increment)
                .with_default_value(has_default)
                .with_ordinal(u32::try_from(ordinal).map_err(|_| shape_error(&object, "cid"))?),
        );
    }

    if !pk.is_empty() {
        table.constraints.push(ConstraintMetadata::primary_key(pk));
    }
    for columns in unique {
        table.constraints.push(ConstraintMetadata::unique(columns));
    }

    let mut fk_id = None;
    for row in foreign_keys {
        let id = int(row, "id", &object)?;
        let column = text(row, "column_name", &object)?;
        let referenced_column = text(row, "referenced_column", &object)?;
        if fk_id != Some(id) {
            fk_id = Some(id);
            table.constraints.push(
                ConstraintMetadata::foreign_key(Vec::new(), text(row, "referenced_table", &object)?, Vec::new())
                    .with_actions(
                        ForeignKeyAction::parse(&opt_text(row, "on_delete", &object)?.unwrap_or_default()),
                        ForeignKeyAction::parse(&opt_text(row, "on_update", &object)?.unwrap_or_default()),
                    ),
            );
        }
        if let Some(constraint) = table.constraints.last_mut() {
            constraint.columns.push(column);
            if let ConstraintKind::ForeignKey {
                referenced_columns, ..
            } = &mut constraint.kind
            {
                referenced_columns.push(referenced_column);
            }
        }
    }

    mark_primary_key(&mut table);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: Vec<(&str, Value)>) -> Row {
        Row::from_pairs(pairs)
    }

    fn t(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_assemble_catalog_postgres_shape() {
        let tables = vec![
            row(vec![("table_name", t("orders")), ("table_schema", t("public")), ("table_type", t("BASE TABLE"))]),
            row(vec![("table_name", t("recent")), ("table_schema", t("public")), ("table_type", t("VIEW"))]),
        ];
        let columns = vec![
            row(vec![
                ("table_name", t("orders")),
                ("column_name", t("id")),
                ("data_type", t("integer")),
                ("is_nullable", Value::Bool(false)),
                ("has_default", Value::Bool(true)),
                ("is_auto_increment", Value::Bool(true)),
                ("ordinal", Value::Int(1)),
                ("comment", Value::Null),
            ]),
            row(vec![
                ("table_name", t("orders")),
                ("column_name", t("user_id")),
                ("data_type", t("integer")),
                ("is_nullable", Value::Bool(true)),
                ("has_default", Value::Bool(false)),
                ("is_auto_increment", Value::Bool(false)),
                ("ordinal", Value::Int(2)),
                ("comment", t("owner")),
            ]),
        ];
        let constraints = vec![
            row(vec![
                ("constraint_name", t("orders_pkey")),
                ("table_name", t("orders")),
                ("constraint_type", t("p")),
                ("column_name", t("id")),
                ("referenced_table", Value::Null),
                ("referenced_column", Value::Null),
                ("on_delete", t(" ")),
                ("on_update", t(" ")),
            ]),
            row(vec![
                ("constraint_name", t("orders_user_fk")),
                ("table_name", t("orders")),
                ("constraint_type", t("f")),
                ("column_name", t("user_id")),
                ("referenced_table", t("users")),
                ("referenced_column", t("id")),
                ("on_delete", t("c")),
                ("on_update", t("a")),
            ]),
        ];

        let result = assemble_catalog(&tables, &columns, &constraints, false).unwrap();
        assert_eq!(result.len(), 1);
        let orders = &result[0];
        assert_eq!(orders.schema.as_deref(), Some("public"));
        assert_eq!(orders.primary_key(), vec!["id"]);
        assert!(orders.column("id").unwrap().is_primary_key);
        assert_eq!(orders.column("user_id").unwrap().comment.as_deref(), Some("owner"));

        let fk = orders.foreign_keys().next().unwrap();
        assert_eq!(fk.name.as_deref(), Some("orders_user_fk"));
        match &fk.kind {
            ConstraintKind::ForeignKey {
                referenced_table,
                referenced_columns,
                on_delete,
                on_update,
            } => {
                assert_eq!(referenced_table, "users");
                assert_eq!(referenced_columns, &vec!["id".to_string()]);
                assert_eq!(*on_delete, ForeignKeyAction::Cascade);
                assert_eq!(*on_update, ForeignKeyAction::NoAction);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let with_views = assemble_catalog(&tables, &columns, &constraints, true).unwrap();
        assert_eq!(with_views.len(), 2);
        assert!(with_views[1].is_view);
    }

    #[test]
    fn test_assemble_catalog_mysql_composite_key() {
        let tables = vec![row(vec![
            ("TABLE_NAME", t("memberships")),
            ("TABLE_SCHEMA", t("app")),
            ("TABLE_TYPE", t("BASE TABLE")),
        ])];
        let constraint = |column: &str| {
            row(vec![
                ("constraint_name", t("PRIMARY")),
                ("table_name", t("memberships")),
                ("constraint_type", t("PRIMARY KEY")),
                ("column_name", t(column)),
                ("referenced_table", Value::Null),
                ("referenced_column", Value::Null),
                ("on_delete", Value::Null),
                ("on_update", Value::Null),
            ])
        };
        let constraints = vec![constraint("user_id"), constraint("group_id")];

        let result = assemble_catalog(&tables, &[], &constraints, false).unwrap();
        assert_eq!(result[0].primary_key(), vec!["user_id", "group_id"]);
        assert_eq!(result[0].constraints.len(), 1);
    }

    #[test]
    fn test_assemble_catalog_rejects_unexpected_shape() {
        let tables = vec![row(vec![("name", t("orders"))])];
        let err = assemble_catalog(&tables, &[], &[], false).unwrap_err();
        assert!(matches!(err, DialectError::Introspection { .. }));
    }

    #[test]
    fn test_assemble_sqlite_table() {
        let info = vec![
            row(vec![
                ("cid", Value::Int(0)),
                ("name", t("id")),
                ("type", t("INTEGER")),
                ("not_null", Value::Int(0)),
                ("dflt_value", Value::Null),
                ("pk", Value::Int(1)),
            ]),
            row(vec![
                ("cid", Value::Int(1)),
                ("name", t("team_id")),
                ("type", t("INTEGER")),
                ("not_null", Value::Int(1)),
                ("dflt_value", Value::Null),
                ("pk", Value::Int(0)),
            ]),
        ];
        let fks = vec![row(vec![
            ("id", Value::Int(0)),
            ("seq", Value::Int(0)),
            ("referenced_table", t("teams")),
            ("column_name", t("team_id")),
            ("referenced_column", t("id")),
            ("on_update", t("NO ACTION")),
            ("on_delete", t("SET NULL")),
        ])];

        let table = assemble_sqlite_table("players".to_string(), false, &info, &fks, vec![]).unwrap();
        assert!(table.schema.is_none());
        let id = table.column("id").unwrap();
        assert!(id.is_primary_key);
        assert!(id.is_auto_incrementing);
        assert!(!id.is_nullable);
        assert_eq!(id.ordinal, 1);
        assert!(!table.column("team_id").unwrap().is_nullable);
        assert_eq!(table.foreign_keys().count(), 1);
    }

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(referential_action(Some("n")), ForeignKeyAction::SetNull);
        assert_eq!(referential_action(Some("RESTRICT")), ForeignKeyAction::Restrict);
        assert_eq!(referential_action(None), ForeignKeyAction::NoAction);
    }
}
