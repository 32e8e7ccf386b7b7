//! Abstract query tree.
//!
//! Nodes are plain data. Nothing here knows how a backend spells SQL; that is
//! the job of [`QueryCompiler`](crate::query::QueryCompiler).

use crate::models::{ForeignKeyAction, Value};

/// Root of a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    CreateTable(CreateTable),
    DropTable(DropTable),
    Raw(RawQuery),
}

impl From<SelectQuery> for QueryNode {
    fn from(q: SelectQuery) -> Self {
        Self::Select(q)
    }
}

impl From<InsertQuery> for QueryNode {
    fn from(q: InsertQuery) -> Self {
        Self::Insert(q)
    }
}

impl From<UpdateQuery> for QueryNode {
    fn from(q: UpdateQuery) -> Self {
        Self::Update(q)
    }
}

impl From<DeleteQuery> for QueryNode {
    fn from(q: DeleteQuery) -> Self {
        Self::Delete(q)
    }
}

impl From<CreateTable> for QueryNode {
    fn from(q: CreateTable) -> Self {
        Self::CreateTable(q)
    }
}

impl From<DropTable> for QueryNode {
    fn from(q: DropTable) -> Self {
        Self::DropTable(q)
    }
}

impl From<RawQuery> for QueryNode {
    fn from(q: RawQuery) -> Self {
        Self::Raw(q)
    }
}

// =============================================================================
// Names
// =============================================================================

/// A table, optionally schema-qualified and aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A column, optionally qualified by a table name or alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// Always rendered as a bound parameter
    Value(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Subquery(Box<SelectQuery>),
    Exists {
        query: Box<SelectQuery>,
        negated: bool,
    },
    /// The value an upsert tried to insert into `column`
    Excluded(String),
    /// SQL text interleaved with bound values: `fragments[0] values[0] fragments[1] ...`.
    /// There must be exactly one more fragment than values.
    Raw {
        fragments: Vec<String>,
        values: Vec<Value>,
    },
    /// `*`, or `table.*`
    Star(Option<String>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column(ColumnRef {
            table: None,
            name: name.into(),
        })
    }

    /// Column qualified by a table name or alias.
    pub fn col_of(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column(ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        })
    }

    pub fn val(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn star() -> Self {
        Self::Star(None)
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    /// Raw SQL without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw {
            fragments: vec![sql.into()],
            values: Vec::new(),
        }
    }

    /// Raw SQL with bound values between the fragments.
    pub fn raw_with(fragments: Vec<String>, values: Vec<Value>) -> Self {
        Self::Raw { fragments, values }
    }

    pub fn exists(query: SelectQuery) -> Self {
        Self::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_exists(query: SelectQuery) -> Self {
        Self::Exists {
            query: Box::new(query),
            negated: true,
        }
    }

    pub fn subquery(query: SelectQuery) -> Self {
        Self::Subquery(Box::new(query))
    }

    pub fn excluded(column: impl Into<String>) -> Self {
        Self::Excluded(column.into())
    }

    fn binary(self, op: BinaryOp, right: impl Into<Expr>) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::NotEq, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn lte(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::LtEq, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn gte(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::GtEq, right)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Like, pattern)
    }

    pub fn add(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, right)
    }

    pub fn sub(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, right)
    }

    pub fn is_null(self) -> Self {
        Self::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(self),
        }
    }

    pub fn is_not_null(self) -> Self {
        Self::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(self),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn in_list<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Self::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        Self::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Self::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
            negated: false,
        }
    }

    /// Conjunction, flattening nested ANDs.
    pub fn and(self, other: impl Into<Expr>) -> Self {
        match (self, other.into()) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction, flattening nested ORs.
    pub fn or(self, other: impl Into<Expr>) -> Self {
        match (self, other.into()) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Self::Value(Value::Int(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Self::Value(Value::Bool(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Self::Value(Value::Float(v))
    }
}

/// String literals become bound values, never column names.
impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Self::Value(Value::from(v))
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Self::Value(Value::Text(v))
    }
}

// =============================================================================
// SELECT
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    /// Required for every kind except `Cross`
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Update,
    Share,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    /// Empty selects `*`
    pub columns: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockMode>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: impl Into<TableRef>) -> Self {
        Self {
            from: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn column(mut self, expr: Expr) -> Self {
        self.columns.push(SelectItem { expr, alias: None });
        self
    }

    pub fn column_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Select plain columns by name.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(names.into_iter().map(|n| SelectItem {
                expr: Expr::col(n),
                alias: None,
            }));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn join(mut self, kind: JoinKind, table: impl Into<TableRef>, on: Option<Expr>) -> Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            on,
        });
        self
    }

    pub fn inner_join(self, table: impl Into<TableRef>, on: Expr) -> Self {
        self.join(JoinKind::Inner, table, Some(on))
    }

    pub fn left_join(self, table: impl Into<TableRef>, on: Expr) -> Self {
        self.join(JoinKind::Left, table, Some(on))
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            expr,
            direction,
            nulls: None,
        });
        self
    }

    pub fn order_by_nulls(mut self, expr: Expr, direction: Direction, nulls: NullsOrder) -> Self {
        self.order_by.push(OrderBy {
            expr,
            direction,
            nulls: Some(nulls),
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn for_update(mut self) -> Self {
        self.lock = Some(LockMode::Update);
        self
    }

    pub fn for_share(mut self) -> Self {
        self.lock = Some(LockMode::Share);
        self
    }
}

// =============================================================================
// INSERT / UPDATE / DELETE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target columns; ignored by `ON DUPLICATE KEY UPDATE`
    pub target: Vec<String>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<SelectItem>,
}

impl InsertQuery {
    pub fn into_table(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Expr>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_conflict_do_nothing<I, S>(mut self, target: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoNothing,
        });
        self
    }

    pub fn on_conflict_do_update<I, S>(mut self, target: I, assignments: Vec<(String, Expr)>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict {
            target: target.into_iter().map(Into::into).collect(),
            action: ConflictAction::DoUpdate(assignments),
        });
        self
    }

    pub fn returning(mut self, expr: Expr) -> Self {
        self.returning.push(SelectItem { expr, alias: None });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: TableRef,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
    pub returning: Vec<SelectItem>,
}

impl UpdateQuery {
    pub fn table(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            where_clause: None,
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn returning(mut self, expr: Expr) -> Self {
        self.returning.push(SelectItem { expr, alias: None });
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: TableRef,
    pub where_clause: Option<Expr>,
    pub returning: Vec<SelectItem>,
}

impl DeleteQuery {
    pub fn from_table(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
            returning: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn returning(mut self, expr: Expr) -> Self {
        self.returning.push(SelectItem { expr, alias: None });
        self
    }
}

// =============================================================================
// DDL
// =============================================================================

/// Portable column types; each backend picks its own spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Text,
    Varchar(u32),
    Char(u32),
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
}

/// Column default. DDL cannot carry bound parameters, so only keywords and
/// caller-supplied SQL are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Null,
    CurrentTimestamp,
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnDef {
    /// A nullable column without constraints.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Column-level primary key; implies NOT NULL.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub columns: Vec<String>,
    pub references: TableRef,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: TableRef,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    /// Table-level (possibly composite) primary key
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl CreateTable {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            if_not_exists: false,
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    pub table: TableRef,
    pub if_exists: bool,
    pub cascade: bool,
}

impl DropTable {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            if_exists: false,
            cascade: false,
        }
    }

    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    pub fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }
}

/// A statement given as SQL text, with values bound between fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub fragments: Vec<String>,
    pub values: Vec<Value>,
    pub returns_rows: bool,
}

impl RawQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            fragments: vec![sql.into()],
            values: Vec::new(),
            returns_rows: false,
        }
    }

    pub fn with_values(fragments: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            fragments,
            values,
            returns_rows: false,
        }
    }

    pub fn returning_rows(mut self) -> Self {
        self.returns_rows = true;
        self
    }
}
