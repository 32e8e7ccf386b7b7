//! Query tree to SQL text.
//!
//! [`QueryCompiler`] is stateless: the same tree and adapter always produce the
//! same SQL and parameter list. Values are never inlined; every
//! [`Expr::Value`] becomes exactly one placeholder, and parameters are kept in
//! the order their placeholders appear in the text.

use crate::dialect::{DialectAdapter, LimitSyntax};
use crate::error::{DialectError, DialectResult};
use crate::models::{Backend, Value};
use crate::query::ast::{
    ColumnDef, ColumnRef, ColumnType, ConflictAction, CreateTable, DefaultValue, DeleteQuery,
    Direction, DropTable, Expr, ForeignKeyDef, InsertQuery, JoinKind, LockMode, NullsOrder,
    QueryNode, RawQuery, SelectItem, SelectQuery, TableRef, UnaryOp, UpdateQuery,
};
use serde::Serialize;

/// Statement category of a compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Raw,
}

/// SQL text plus its bound parameters, ready for the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<Value>,
    pub kind: QueryKind,
    /// Whether the statement yields a result set
    pub returns_rows: bool,
}

impl CompiledQuery {
    /// A raw statement with no parameters.
    pub fn raw(sql: impl Into<String>, returns_rows: bool) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
            kind: QueryKind::Raw,
            returns_rows,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    adapter: DialectAdapter,
}

impl QueryCompiler {
    pub fn new(adapter: DialectAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &DialectAdapter {
        &self.adapter
    }

    /// Compile a query tree. Capability violations and malformed trees fail
    /// here, before any statement reaches a connection.
    pub fn compile(&self, node: &QueryNode) -> DialectResult<CompiledQuery> {
        let mut w = SqlWriter::new(&self.adapter);
        let (kind, returns_rows) = match node {
            QueryNode::Select(q) => {
                w.select(q)?;
                (QueryKind::Select, true)
            }
            QueryNode::Insert(q) => {
                w.insert(q)?;
                (QueryKind::Insert, !q.returning.is_empty())
            }
            QueryNode::Update(q) => {
                w.update(q)?;
                (QueryKind::Update, !q.returning.is_empty())
            }
            QueryNode::Delete(q) => {
                w.delete(q)?;
                (QueryKind::Delete, !q.returning.is_empty())
            }
            QueryNode::CreateTable(q) => {
                w.create_table(q)?;
                (QueryKind::Ddl, false)
            }
            QueryNode::DropTable(q) => {
                w.drop_table(q)?;
                (QueryKind::Ddl, false)
            }
            QueryNode::Raw(q) => {
                w.raw_query(q)?;
                (QueryKind::Raw, q.returns_rows)
            }
        };
        Ok(CompiledQuery {
            sql: w.sql,
            parameters: w.params,
            kind,
            returns_rows,
        })
    }
}

/// Accumulates SQL text and parameters for one compile call.
struct SqlWriter<'a> {
    adapter: &'a DialectAdapter,
    sql: String,
    params: Vec<Value>,
    /// Inside the assignments of an upsert, where `Expr::Excluded` is legal
    upsert: bool,
}

impl<'a> SqlWriter<'a> {
    fn new(adapter: &'a DialectAdapter) -> Self {
        Self {
            adapter,
            sql: String::new(),
            params: Vec::new(),
            upsert: false,
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn param(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.adapter.placeholder_style().placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn ident(&mut self, name: &str) -> DialectResult<()> {
        if name.is_empty() {
            return Err(DialectError::compile("Identifier must not be empty"));
        }
        if name.contains('\0') {
            return Err(DialectError::compile(format!(
                "Identifier contains a NUL character: {name:?}"
            )));
        }
        if let Some(max) = self.adapter.max_identifier_length()
            && name.len() > max
        {
            return Err(DialectError::compile(format!(
                "Identifier '{name}' exceeds {max} bytes on {}",
                self.adapter.backend()
            )));
        }
        let quoted = self.adapter.quote_identifier(name);
        self.sql.push_str(&quoted);
        Ok(())
    }

    fn ident_list(&mut self, names: &[String]) -> DialectResult<()> {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(name)?;
        }
        Ok(())
    }

    /// Table name without its alias.
    fn table_name(&mut self, table: &TableRef) -> DialectResult<()> {
        if let Some(schema) = &table.schema {
            self.ident(schema)?;
            self.push(".");
        }
        self.ident(&table.name)
    }

    fn table(&mut self, table: &TableRef) -> DialectResult<()> {
        self.table_name(table)?;
        if let Some(alias) = &table.alias {
            self.push(" AS ");
            self.ident(alias)?;
        }
        Ok(())
    }

    fn column(&mut self, column: &ColumnRef) -> DialectResult<()> {
        if let Some(table) = &column.table {
            self.ident(table)?;
            self.push(".");
        }
        self.ident(&column.name)
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> DialectResult<()> {
        match expr {
            Expr::Column(c) => self.column(c)?,
            Expr::Value(v) => self.param(v.clone()),
            Expr::Binary { left, op, right } => {
                self.operand(left)?;
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.operand(right)?;
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    self.push("NOT ");
                    self.operand(expr)?;
                }
                UnaryOp::Neg => {
                    self.push("-");
                    self.operand(expr)?;
                }
                UnaryOp::IsNull => {
                    self.operand(expr)?;
                    self.push(" IS NULL");
                }
                UnaryOp::IsNotNull => {
                    self.operand(expr)?;
                    self.push(" IS NOT NULL");
                }
            },
            Expr::And(parts) => self.junction(parts, " AND ")?,
            Expr::Or(parts) => self.junction(parts, " OR ")?,
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return Err(DialectError::compile("IN list must not be empty"));
                }
                self.operand(expr)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.expr_list(list)?;
                self.push(")");
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.operand(expr)?;
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.operand(low)?;
                self.push(" AND ");
                self.operand(high)?;
            }
            Expr::Function { name, args } => {
                validate_function_name(name)?;
                self.push(name);
                self.push("(");
                self.expr_list(args)?;
                self.push(")");
            }
            Expr::Subquery(query) => {
                self.push("(");
                self.select(query)?;
                self.push(")");
            }
            Expr::Exists { query, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(query)?;
                self.push(")");
            }
            Expr::Excluded(column) => self.excluded(column)?,
            Expr::Raw { fragments, values } => self.raw_fragments(fragments, values)?,
            Expr::Star(None) => self.push("*"),
            Expr::Star(Some(table)) => {
                self.ident(table)?;
                self.push(".*");
            }
        }
        Ok(())
    }

    /// Expression in operand position; compound expressions are parenthesized.
    fn operand(&mut self, expr: &Expr) -> DialectResult<()> {
        let compound = matches!(
            expr,
            Expr::Binary { .. }
                | Expr::And(_)
                | Expr::Or(_)
                | Expr::InList { .. }
                | Expr::Between { .. }
                | Expr::Unary { .. }
                | Expr::Exists { .. }
        );
        if compound {
            self.push("(");
            self.expr(expr)?;
            self.push(")");
            Ok(())
        } else {
            self.expr(expr)
        }
    }

    fn junction(&mut self, parts: &[Expr], separator: &str) -> DialectResult<()> {
        if parts.is_empty() {
            return Err(DialectError::compile(format!(
                "{} requires at least one condition",
                separator.trim()
            )));
        }
        if let [single] = parts {
            return self.expr(single);
        }
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.operand(part)?;
        }
        Ok(())
    }

    fn expr_list(&mut self, exprs: &[Expr]) -> DialectResult<()> {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(e)?;
        }
        Ok(())
    }

    fn raw_fragments(&mut self, fragments: &[String], values: &[Value]) -> DialectResult<()> {
        if fragments.len() != values.len() + 1 {
            return Err(DialectError::compile(format!(
                "Raw SQL needs one more fragment than values (got {} fragments, {} values)",
                fragments.len(),
                values.len()
            )));
        }
        for (i, fragment) in fragments.iter().enumerate() {
            self.push(fragment);
            if let Some(value) = values.get(i) {
                self.param(value.clone());
            }
        }
        Ok(())
    }

    fn excluded(&mut self, column: &str) -> DialectResult<()> {
        if !self.upsert {
            return Err(DialectError::compile(
                "EXCLUDED values are only valid in upsert assignments",
            ));
        }
        if self.adapter.supports_on_conflict() {
            self.push("EXCLUDED.");
            self.ident(column)
        } else {
            self.push("VALUES(");
            self.ident(column)?;
            self.push(")");
            Ok(())
        }
    }

    fn select_items(&mut self, items: &[SelectItem]) -> DialectResult<()> {
        if items.is_empty() {
            self.push("*");
            return Ok(());
        }
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr)?;
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.ident(alias)?;
            }
        }
        Ok(())
    }

    fn assignments(&mut self, assignments: &[(String, Expr)]) -> DialectResult<()> {
        for (i, (column, value)) in assignments.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column)?;
            self.push(" = ");
            self.expr(value)?;
        }
        Ok(())
    }

    fn returning(&mut self, items: &[SelectItem]) -> DialectResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        if !self.adapter.supports_returning() {
            return Err(unsupported(self.adapter, "RETURNING"));
        }
        self.push(" RETURNING ");
        self.select_items(items)
    }

    fn where_clause(&mut self, condition: Option<&Expr>) -> DialectResult<()> {
        if let Some(condition) = condition {
            self.push(" WHERE ");
            self.expr(condition)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn select(&mut self, q: &SelectQuery) -> DialectResult<()> {
        self.push(if q.distinct { "SELECT DISTINCT " } else { "SELECT " });
        self.select_items(&q.columns)?;

        if let Some(from) = &q.from {
            self.push(" FROM ");
            self.table(from)?;
        } else if !q.joins.is_empty() {
            return Err(DialectError::compile("JOIN requires a FROM table"));
        }

        for join in &q.joins {
            self.push(" ");
            self.push(join.kind.as_str());
            self.push(" ");
            self.table(&join.table)?;
            match (&join.kind, &join.on) {
                (JoinKind::Cross, None) => {}
                (JoinKind::Cross, Some(_)) => {
                    return Err(DialectError::compile("CROSS JOIN cannot have an ON condition"));
                }
                (_, Some(on)) => {
                    self.push(" ON ");
                    self.expr(on)?;
                }
                (kind, None) => {
                    return Err(DialectError::compile(format!(
                        "{} requires an ON condition",
                        kind.as_str()
                    )));
                }
            }
        }

        self.where_clause(q.where_clause.as_ref())?;

        if !q.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.expr_list(&q.group_by)?;
        }
        if let Some(having) = &q.having {
            self.push(" HAVING ");
            self.expr(having)?;
        }

        if !q.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in q.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&order.expr)?;
                self.push(match order.direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                });
                if let Some(nulls) = order.nulls {
                    if !self.adapter.supports_nulls_ordering() {
                        return Err(unsupported(self.adapter, "NULLS FIRST/LAST"));
                    }
                    self.push(match nulls {
                        NullsOrder::First => " NULLS FIRST",
                        NullsOrder::Last => " NULLS LAST",
                    });
                }
            }
        }

        self.limit_offset(q.limit, q.offset)?;

        if let Some(lock) = q.lock {
            if !self.adapter.supports_row_locking() {
                return Err(unsupported(self.adapter, "FOR UPDATE/FOR SHARE"));
            }
            self.push(match lock {
                LockMode::Update => " FOR UPDATE",
                LockMode::Share => " FOR SHARE",
            });
        }
        Ok(())
    }

    fn limit_offset(&mut self, limit: Option<u64>, offset: Option<u64>) -> DialectResult<()> {
        let limit = limit.map(bound_count).transpose()?;
        let offset = offset.map(bound_count).transpose()?;

        match self.adapter.limit_syntax() {
            LimitSyntax::LimitOffset => {
                if let Some(limit) = limit {
                    self.push(" LIMIT ");
                    self.param(limit);
                } else if offset.is_some()
                    && let Some(unbounded) = self.adapter.unbounded_limit()
                {
                    self.push(" LIMIT ");
                    self.push(unbounded);
                }
                if let Some(offset) = offset {
                    self.push(" OFFSET ");
                    self.param(offset);
                }
            }
            LimitSyntax::OffsetFetch => {
                if let Some(offset) = offset {
                    self.push(" OFFSET ");
                    self.param(offset);
                    self.push(" ROWS");
                }
                if let Some(limit) = limit {
                    self.push(" FETCH FIRST ");
                    self.param(limit);
                    self.push(" ROWS ONLY");
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, q: &InsertQuery) -> DialectResult<()> {
        if q.columns.is_empty() {
            return Err(DialectError::compile("INSERT requires at least one column"));
        }
        if q.rows.is_empty() {
            return Err(DialectError::compile("INSERT requires at least one row of values"));
        }
        if let Some((i, row)) = q
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != q.columns.len())
        {
            return Err(DialectError::compile(format!(
                "INSERT row {} has {} values but {} columns were named",
                i + 1,
                row.len(),
                q.columns.len()
            )));
        }

        let conflict = q.on_conflict.as_ref();
        let ignore_prefix = matches!(
            conflict.map(|c| &c.action),
            Some(ConflictAction::DoNothing)
        ) && !self.adapter.supports_on_conflict();
        if ignore_prefix && !self.adapter.supports_insert_ignore() {
            return Err(unsupported(self.adapter, "ON CONFLICT DO NOTHING"));
        }

        self.push(if ignore_prefix { "INSERT IGNORE INTO " } else { "INSERT INTO " });
        self.table(&q.table)?;
        self.push(" (");
        self.ident_list(&q.columns)?;
        self.push(") VALUES ");
        for (i, row) in q.rows.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push("(");
            self.expr_list(row)?;
            self.push(")");
        }

        if let Some(conflict) = conflict {
            match &conflict.action {
                ConflictAction::DoNothing if ignore_prefix => {}
                ConflictAction::DoNothing => {
                    self.push(" ON CONFLICT");
                    if !conflict.target.is_empty() {
                        self.push(" (");
                        self.ident_list(&conflict.target)?;
                        self.push(")");
                    }
                    self.push(" DO NOTHING");
                }
                ConflictAction::DoUpdate(assignments) => {
                    if assignments.is_empty() {
                        return Err(DialectError::compile(
                            "Upsert update requires at least one assignment",
                        ));
                    }
                    if self.adapter.supports_on_conflict() {
                        if conflict.target.is_empty() {
                            return Err(DialectError::compile(
                                "ON CONFLICT DO UPDATE requires conflict target columns",
                            ));
                        }
                        self.push(" ON CONFLICT (");
                        self.ident_list(&conflict.target)?;
                        self.push(") DO UPDATE SET ");
                    } else if self.adapter.supports_on_duplicate_key() {
                        self.push(" ON DUPLICATE KEY UPDATE ");
                    } else {
                        return Err(unsupported(self.adapter, "upsert"));
                    }
                    self.upsert = true;
                    let result = self.assignments(assignments);
                    self.upsert = false;
                    result?;
                }
            }
        }

        self.returning(&q.returning)
    }

    fn update(&mut self, q: &UpdateQuery) -> DialectResult<()> {
        if q.assignments.is_empty() {
            return Err(DialectError::compile("UPDATE requires at least one assignment"));
        }
        self.push("UPDATE ");
        self.table(&q.table)?;
        self.push(" SET ");
        self.assignments(&q.assignments)?;
        self.where_clause(q.where_clause.as_ref())?;
        self.returning(&q.returning)
    }

    fn delete(&mut self, q: &DeleteQuery) -> DialectResult<()> {
        self.push("DELETE FROM ");
        self.table(&q.table)?;
        self.where_clause(q.where_clause.as_ref())?;
        self.returning(&q.returning)
    }

    fn raw_query(&mut self, q: &RawQuery) -> DialectResult<()> {
        self.raw_fragments(&q.fragments, &q.values)
    }

    // -------------------------------------------------------------------------
    // DDL
    // -------------------------------------------------------------------------

    fn create_table(&mut self, q: &CreateTable) -> DialectResult<()> {
        if q.columns.is_empty() {
            return Err(DialectError::compile("CREATE TABLE requires at least one column"));
        }
        let column_pks = q.columns.iter().filter(|c| c.primary_key).count();
        if column_pks > 1 || (column_pks == 1 && !q.primary_key.is_empty()) {
            return Err(DialectError::compile(
                "A table has at most one primary key; use a table-level key for composite keys",
            ));
        }

        self.push("CREATE TABLE ");
        if q.if_not_exists {
            self.push("IF NOT EXISTS ");
        }
        self.table_name(&q.table)?;
        self.push(" (");

        for (i, column) in q.columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.column_def(column)?;
        }

        if !q.primary_key.is_empty() {
            self.push(", PRIMARY KEY (");
            self.ident_list(&q.primary_key)?;
            self.push(")");
        }
        for unique in &q.unique {
            if unique.is_empty() {
                return Err(DialectError::compile("UNIQUE constraint requires columns"));
            }
            self.push(", UNIQUE (");
            self.ident_list(unique)?;
            self.push(")");
        }
        for fk in &q.foreign_keys {
            self.push(", ");
            self.foreign_key(fk)?;
        }

        self.push(")");
        Ok(())
    }

    fn column_def(&mut self, c: &ColumnDef) -> DialectResult<()> {
        let backend = self.adapter.backend();
        if c.auto_increment {
            if !is_integer(c.column_type) {
                return Err(DialectError::compile(format!(
                    "Auto-increment column '{}' must have an integer type",
                    c.name
                )));
            }
            if c.default.is_some() {
                return Err(DialectError::compile(format!(
                    "Auto-increment column '{}' cannot have a default",
                    c.name
                )));
            }
            if backend == Backend::SQLite && !c.primary_key {
                return Err(DialectError::compile(format!(
                    "SQLite auto-increment column '{}' must be the primary key",
                    c.name
                )));
            }
        }

        self.ident(&c.name)?;
        self.push(" ");

        match backend {
            Backend::PostgreSQL => {
                self.push(&type_name(backend, c.column_type));
                if c.auto_increment {
                    self.push(" GENERATED BY DEFAULT AS IDENTITY");
                }
                self.nullability_and_default(c);
                if c.primary_key {
                    self.push(" PRIMARY KEY");
                }
            }
            Backend::MySQL => {
                self.push(&type_name(backend, c.column_type));
                self.nullability_and_default(c);
                if c.auto_increment {
                    self.push(" AUTO_INCREMENT");
                }
                if c.primary_key {
                    self.push(" PRIMARY KEY");
                }
            }
            Backend::SQLite => {
                // Only the exact type name INTEGER aliases the rowid.
                if c.auto_increment {
                    self.push("INTEGER");
                } else {
                    self.push(&type_name(backend, c.column_type));
                }
                self.nullability_and_default(c);
                if c.primary_key {
                    self.push(" PRIMARY KEY");
                }
                if c.auto_increment {
                    self.push(" AUTOINCREMENT");
                }
            }
        }

        if c.unique {
            self.push(" UNIQUE");
        }
        Ok(())
    }

    fn nullability_and_default(&mut self, c: &ColumnDef) {
        if !c.nullable {
            self.push(" NOT NULL");
        }
        match &c.default {
            None => {}
            Some(DefaultValue::Null) => self.push(" DEFAULT NULL"),
            Some(DefaultValue::CurrentTimestamp) => self.push(" DEFAULT CURRENT_TIMESTAMP"),
            Some(DefaultValue::Raw(sql)) => {
                self.push(" DEFAULT ");
                self.push(sql);
            }
        }
    }

    fn foreign_key(&mut self, fk: &ForeignKeyDef) -> DialectResult<()> {
        if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
            return Err(DialectError::compile(format!(
                "FOREIGN KEY to '{}' needs matching, non-empty column lists",
                fk.references.name
            )));
        }
        self.push("FOREIGN KEY (");
        self.ident_list(&fk.columns)?;
        self.push(") REFERENCES ");
        self.table_name(&fk.references)?;
        self.push(" (");
        self.ident_list(&fk.referenced_columns)?;
        self.push(")");
        if let Some(action) = fk.on_delete {
            self.push(&format!(" ON DELETE {action}"));
        }
        if let Some(action) = fk.on_update {
            self.push(&format!(" ON UPDATE {action}"));
        }
        Ok(())
    }

    fn drop_table(&mut self, q: &DropTable) -> DialectResult<()> {
        if q.cascade && self.adapter.backend() == Backend::SQLite {
            return Err(unsupported(self.adapter, "DROP TABLE ... CASCADE"));
        }
        self.push("DROP TABLE ");
        if q.if_exists {
            self.push("IF EXISTS ");
        }
        self.table_name(&q.table)?;
        if q.cascade {
            self.push(" CASCADE");
        }
        Ok(())
    }
}

fn unsupported(adapter: &DialectAdapter, feature: &str) -> DialectError {
    DialectError::compile(format!("{feature} is not supported by {}", adapter.backend()))
}

/// LIMIT and OFFSET are bound as integers.
fn bound_count(n: u64) -> DialectResult<Value> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| DialectError::compile(format!("LIMIT/OFFSET value {n} is out of range")))
}

/// Function names are emitted verbatim, so they are restricted to plain
/// (optionally schema-qualified) identifiers.
fn validate_function_name(name: &str) -> DialectResult<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DialectError::compile(format!("Invalid function name: {name:?}")))
    }
}

fn is_integer(t: ColumnType) -> bool {
    matches!(t, ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt)
}

fn type_name(backend: Backend, t: ColumnType) -> String {
    match (backend, t) {
        (_, ColumnType::SmallInt) => "SMALLINT".to_string(),
        (Backend::MySQL, ColumnType::Integer) => "INT".to_string(),
        (_, ColumnType::Integer) => "INTEGER".to_string(),
        (_, ColumnType::BigInt) => "BIGINT".to_string(),
        (Backend::MySQL, ColumnType::Real) => "FLOAT".to_string(),
        (_, ColumnType::Real) => "REAL".to_string(),
        (Backend::PostgreSQL, ColumnType::Double) => "DOUBLE PRECISION".to_string(),
        (Backend::MySQL, ColumnType::Double) => "DOUBLE".to_string(),
        (Backend::SQLite, ColumnType::Double) => "REAL".to_string(),
        (Backend::MySQL, ColumnType::Decimal { precision, scale }) => {
            format!("DECIMAL({precision}, {scale})")
        }
        (_, ColumnType::Decimal { precision, scale }) => format!("NUMERIC({precision}, {scale})"),
        (Backend::MySQL, ColumnType::Boolean) => "TINYINT(1)".to_string(),
        (_, ColumnType::Boolean) => "BOOLEAN".to_string(),
        (_, ColumnType::Text) => "TEXT".to_string(),
        (_, ColumnType::Varchar(n)) => format!("VARCHAR({n})"),
        (_, ColumnType::Char(n)) => format!("CHAR({n})"),
        (Backend::PostgreSQL, ColumnType::Blob) => "BYTEA".to_string(),
        (Backend::MySQL, ColumnType::Blob) => "LONGBLOB".to_string(),
        (Backend::SQLite, ColumnType::Blob) => "BLOB".to_string(),
        (_, ColumnType::Date) => "DATE".to_string(),
        (_, ColumnType::Time) => "TIME".to_string(),
        (Backend::MySQL, ColumnType::Timestamp | ColumnType::TimestampTz) => {
            "DATETIME(6)".to_string()
        }
        (Backend::PostgreSQL, ColumnType::TimestampTz) => "TIMESTAMPTZ".to_string(),
        (_, ColumnType::Timestamp | ColumnType::TimestampTz) => "TIMESTAMP".to_string(),
        (Backend::PostgreSQL, ColumnType::Json) => "JSONB".to_string(),
        (_, ColumnType::Json) => "JSON".to_string(),
        (Backend::PostgreSQL, ColumnType::Uuid) => "UUID".to_string(),
        (Backend::MySQL, ColumnType::Uuid) => "CHAR(36)".to_string(),
        (Backend::SQLite, ColumnType::Uuid) => "TEXT".to_string(),
    }
}
