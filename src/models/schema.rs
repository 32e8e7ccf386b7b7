//! Canonical, backend-independent schema metadata.
//!
//! Every introspection call builds these values fresh; nothing here is cached.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
}

/// Everything the introspector found, in table-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub tables: Vec<TableMetadata>,
}

impl DatabaseMetadata {
    /// Find a table by name (and schema, when given).
    pub fn table(&self, name: &str, schema: Option<&str>) -> Option<&TableMetadata> {
        self.tables.iter().find(|t| {
            t.name == name && schema.is_none_or(|s| t.schema.as_deref() == Some(s))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// None for backends without schemas (SQLite)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub is_view: bool,
    pub columns: Vec<ColumnMetadata>,
    pub constraints: Vec<ConstraintMetadata>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, is_view: bool) -> Self {
        Self {
            name: name.into(),
            schema: None,
            is_view,
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintMetadata) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns of the primary key, in key order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.constraints
            .iter()
            .find_map(|c| match &c.kind {
                ConstraintKind::PrimaryKey => Some(c.columns.iter().map(String::as_str).collect()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ConstraintMetadata> {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::ForeignKey { .. }))
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Type as the backend spells it (e.g., `int4`, `varchar(30)`, `INTEGER`)
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_auto_incrementing: bool,
    pub has_default_value: bool,
    /// 1-based position within the table
    pub ordinal: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
            is_primary_key: false,
            is_auto_incrementing: false,
            has_default_value: false,
            ordinal: 0,
            comment: None,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.is_auto_incrementing = auto_increment;
        self
    }

    pub fn with_default_value(mut self, has_default: bool) -> Self {
        self.has_default_value = has_default;
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintMetadata {
    /// SQLite does not name implicit constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub kind: ConstraintKind,
}

impl ConstraintMetadata {
    pub fn primary_key(columns: Vec<String>) -> Self {
        Self {
            name: None,
            columns,
            kind: ConstraintKind::PrimaryKey,
        }
    }

    pub fn unique(columns: Vec<String>) -> Self {
        Self {
            name: None,
            columns,
            kind: ConstraintKind::Unique,
        }
    }

    pub fn foreign_key(
        columns: Vec<String>,
        referenced_table: impl Into<String>,
        referenced_columns: Vec<String>,
    ) -> Self {
        Self {
            name: None,
            columns,
            kind: ConstraintKind::ForeignKey {
                referenced_table: referenced_table.into(),
                referenced_columns,
                on_delete: ForeignKeyAction::NoAction,
                on_update: ForeignKeyAction::NoAction,
            },
        }
    }

    /// Set the constraint name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the referential actions; ignored for non foreign key constraints.
    pub fn with_actions(mut self, delete: ForeignKeyAction, update: ForeignKeyAction) -> Self {
        if let ConstraintKind::ForeignKey {
            on_delete,
            on_update,
            ..
        } = &mut self.kind
        {
            *on_delete = delete;
            *on_update = update;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey {
        referenced_table: String,
        referenced_columns: Vec<String>,
        on_delete: ForeignKeyAction,
        on_update: ForeignKeyAction,
    },
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced)
    #[default]
    NoAction,
    /// Restrict (same as NoAction in most databases)
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// Filters for introspection calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectOptions {
    /// Defaults to `public` on PostgreSQL and the connected database on MySQL.
    /// Ignored by SQLite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub include_views: bool,
    /// Include backend-internal tables (`sqlite_%`).
    #[serde(default)]
    pub include_internal: bool,
}

impl IntrospectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema filter.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_views(mut self, include_views: bool) -> Self {
        self.include_views = include_views;
        self
    }

    pub fn with_internal(mut self, include_internal: bool) -> Self {
        self.include_internal = include_internal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(ForeignKeyAction::parse("cascade"), ForeignKeyAction::Cascade);
        assert_eq!(ForeignKeyAction::parse("SET NULL"), ForeignKeyAction::SetNull);
        assert_eq!(ForeignKeyAction::parse("NO ACTION"), ForeignKeyAction::NoAction);
        assert_eq!(ForeignKeyAction::parse(""), ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_primary_key_lookup() {
        let table = TableMetadata::new("users", false)
            .with_column(ColumnMetadata::new("id", "integer", false).with_primary_key(true))
            .with_constraint(ConstraintMetadata::primary_key(vec!["id".to_string()]));
        assert_eq!(table.primary_key(), vec!["id"]);
        assert_eq!(table.foreign_keys().count(), 0);
    }

    #[test]
    fn test_with_actions_only_touches_foreign_keys() {
        let unique = ConstraintMetadata::unique(vec!["email".to_string()])
            .with_actions(ForeignKeyAction::Cascade, ForeignKeyAction::Cascade);
        assert_eq!(unique.kind, ConstraintKind::Unique);

        let fk = ConstraintMetadata::foreign_key(
            vec!["user_id".to_string()],
            "users",
            vec!["id".to_string()],
        )
        .with_actions(ForeignKeyAction::Cascade, ForeignKeyAction::NoAction);
        assert!(matches!(
            fk.kind,
            ConstraintKind::ForeignKey {
                on_delete: ForeignKeyAction::Cascade,
                ..
            }
        ));
    }

    #[test]
    fn test_database_metadata_lookup() {
        let metadata = DatabaseMetadata {
            tables: vec![
                TableMetadata::new("users", false).with_schema("public"),
                TableMetadata::new("users", false).with_schema("audit"),
            ],
        };
        assert_eq!(
            metadata.table("users", Some("audit")).and_then(|t| t.schema.as_deref()),
            Some("audit")
        );
        assert!(metadata.table("orders", None).is_none());
    }
}
