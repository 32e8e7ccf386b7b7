//! Capability negotiation.
//!
//! A [`DialectAdapter`] answers "is this legal here?" for the query builder and
//! the compiler. Capabilities are an open key/value map rather than a fixed
//! struct, so a new capability is a new [`Capability`] key and not a breaking
//! change to every adapter.

use crate::db::driver::IsolationLevel;
use crate::models::Backend;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Capability keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    IdentifierQuote,
    PlaceholderStyle,
    LimitSyntax,
    /// Literal LIMIT used when only an OFFSET is given; absent when OFFSET may
    /// stand alone
    UnboundedLimit,
    Returning,
    OnConflict,
    OnDuplicateKey,
    InsertIgnore,
    TransactionalDdl,
    Savepoints,
    RowLocking,
    NullsOrdering,
    IsolationLevels,
    /// 0 means unlimited
    MaxIdentifierLength,
}

/// How bound parameters are spelled in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    QuestionMark,
    /// `$1`, `$2`, ...
    Dollar,
    /// `:p1`, `:p2`, ...
    Named,
}

impl PlaceholderStyle {
    /// Placeholder for the `index`-th parameter (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::QuestionMark => "?".to_string(),
            Self::Dollar => format!("${index}"),
            Self::Named => format!(":p{index}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSyntax {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH FIRST n ROWS ONLY`
    OffsetFetch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Flag(bool),
    Char(char),
    Placeholder(PlaceholderStyle),
    Limit(LimitSyntax),
    IsolationLevels(BTreeSet<IsolationLevel>),
    Number(u64),
    Text(String),
}

/// Immutable capability map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    values: BTreeMap<Capability, CapabilityValue>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default capabilities of a backend.
    pub fn for_backend(backend: Backend) -> Self {
        let all_levels: BTreeSet<_> = IsolationLevel::ALL.into_iter().collect();
        match backend {
            Backend::PostgreSQL => Self::new()
                .with(Capability::IdentifierQuote, CapabilityValue::Char('"'))
                .with(
                    Capability::PlaceholderStyle,
                    CapabilityValue::Placeholder(PlaceholderStyle::Dollar),
                )
                .with(Capability::LimitSyntax, CapabilityValue::Limit(LimitSyntax::LimitOffset))
                .with(Capability::Returning, CapabilityValue::Flag(true))
                .with(Capability::OnConflict, CapabilityValue::Flag(true))
                .with(Capability::OnDuplicateKey, CapabilityValue::Flag(false))
                .with(Capability::InsertIgnore, CapabilityValue::Flag(false))
                .with(Capability::TransactionalDdl, CapabilityValue::Flag(true))
                .with(Capability::Savepoints, CapabilityValue::Flag(true))
                .with(Capability::RowLocking, CapabilityValue::Flag(true))
                .with(Capability::NullsOrdering, CapabilityValue::Flag(true))
                .with(Capability::IsolationLevels, CapabilityValue::IsolationLevels(all_levels))
                .with(Capability::MaxIdentifierLength, CapabilityValue::Number(63)),
            Backend::MySQL => Self::new()
                .with(Capability::IdentifierQuote, CapabilityValue::Char('`'))
                .with(
                    Capability::PlaceholderStyle,
                    CapabilityValue::Placeholder(PlaceholderStyle::QuestionMark),
                )
                .with(Capability::LimitSyntax, CapabilityValue::Limit(LimitSyntax::LimitOffset))
                .with(
                    Capability::UnboundedLimit,
                    CapabilityValue::Text(u64::MAX.to_string()),
                )
                .with(Capability::Returning, CapabilityValue::Flag(false))
                .with(Capability::OnConflict, CapabilityValue::Flag(false))
                .with(Capability::OnDuplicateKey, CapabilityValue::Flag(true))
                .with(Capability::InsertIgnore, CapabilityValue::Flag(true))
                .with(Capability::TransactionalDdl, CapabilityValue::Flag(false))
                .with(Capability::Savepoints, CapabilityValue::Flag(true))
                .with(Capability::RowLocking, CapabilityValue::Flag(true))
                .with(Capability::NullsOrdering, CapabilityValue::Flag(false))
                .with(Capability::IsolationLevels, CapabilityValue::IsolationLevels(all_levels))
                .with(Capability::MaxIdentifierLength, CapabilityValue::Number(64)),
            Backend::SQLite => Self::new()
                .with(Capability::IdentifierQuote, CapabilityValue::Char('"'))
                .with(
                    Capability::PlaceholderStyle,
                    CapabilityValue::Placeholder(PlaceholderStyle::QuestionMark),
                )
                .with(Capability::LimitSyntax, CapabilityValue::Limit(LimitSyntax::LimitOffset))
                .with(Capability::UnboundedLimit, CapabilityValue::Text("-1".to_string()))
                .with(Capability::Returning, CapabilityValue::Flag(true))
                .with(Capability::OnConflict, CapabilityValue::Flag(true))
                .with(Capability::OnDuplicateKey, CapabilityValue::Flag(false))
                .with(Capability::InsertIgnore, CapabilityValue::Flag(false))
                .with(Capability::TransactionalDdl, CapabilityValue::Flag(false))
                .with(Capability::Savepoints, CapabilityValue::Flag(true))
                .with(Capability::RowLocking, CapabilityValue::Flag(false))
                .with(Capability::NullsOrdering, CapabilityValue::Flag(true))
                .with(
                    Capability::IsolationLevels,
                    CapabilityValue::IsolationLevels(BTreeSet::new()),
                )
                .with(Capability::MaxIdentifierLength, CapabilityValue::Number(0)),
        }
    }

    /// Set a capability, replacing any previous value.
    pub fn with(mut self, capability: Capability, value: CapabilityValue) -> Self {
        self.values.insert(capability, value);
        self
    }

    pub fn get(&self, capability: Capability) -> Option<&CapabilityValue> {
        self.values.get(&capability)
    }

    /// Boolean capability; missing or non-flag values read as unsupported.
    pub fn flag(&self, capability: Capability) -> bool {
        matches!(self.get(capability), Some(CapabilityValue::Flag(true)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Capability, &CapabilityValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable per-backend capabilities and SQL conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectAdapter {
    backend: Backend,
    capabilities: CapabilitySet,
}

impl DialectAdapter {
    pub fn for_backend(backend: Backend) -> Self {
        Self {
            backend,
            capabilities: CapabilitySet::for_backend(backend),
        }
    }

    /// Adapter with custom capabilities. `backend` still decides DDL type
    /// names and transaction statements.
    pub fn from_capabilities(backend: Backend, capabilities: CapabilitySet) -> Self {
        Self {
            backend,
            capabilities,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn get(&self, capability: Capability) -> Option<&CapabilityValue> {
        self.capabilities.get(capability)
    }

    pub fn supports_returning(&self) -> bool {
        self.capabilities.flag(Capability::Returning)
    }

    pub fn supports_on_conflict(&self) -> bool {
        self.capabilities.flag(Capability::OnConflict)
    }

    pub fn supports_on_duplicate_key(&self) -> bool {
        self.capabilities.flag(Capability::OnDuplicateKey)
    }

    pub fn supports_insert_ignore(&self) -> bool {
        self.capabilities.flag(Capability::InsertIgnore)
    }

    pub fn supports_transactional_ddl(&self) -> bool {
        self.capabilities.flag(Capability::TransactionalDdl)
    }

    pub fn supports_savepoints(&self) -> bool {
        self.capabilities.flag(Capability::Savepoints)
    }

    pub fn supports_row_locking(&self) -> bool {
        self.capabilities.flag(Capability::RowLocking)
    }

    pub fn supports_nulls_ordering(&self) -> bool {
        self.capabilities.flag(Capability::NullsOrdering)
    }

    pub fn supports_isolation_level(&self, level: IsolationLevel) -> bool {
        matches!(
            self.get(Capability::IsolationLevels),
            Some(CapabilityValue::IsolationLevels(levels)) if levels.contains(&level)
        )
    }

    /// Identifier quote character (default `"`).
    pub fn identifier_quote(&self) -> char {
        match self.get(Capability::IdentifierQuote) {
            Some(CapabilityValue::Char(c)) => *c,
            _ => '"',
        }
    }

    /// Placeholder convention (default `?`).
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self.get(Capability::PlaceholderStyle) {
            Some(CapabilityValue::Placeholder(style)) => *style,
            _ => PlaceholderStyle::QuestionMark,
        }
    }

    pub fn limit_syntax(&self) -> LimitSyntax {
        match self.get(Capability::LimitSyntax) {
            Some(CapabilityValue::Limit(syntax)) => *syntax,
            _ => LimitSyntax::LimitOffset,
        }
    }

    pub fn unbounded_limit(&self) -> Option<&str> {
        match self.get(Capability::UnboundedLimit) {
            Some(CapabilityValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Maximum identifier length in bytes; None when unlimited.
    pub fn max_identifier_length(&self) -> Option<usize> {
        match self.get(Capability::MaxIdentifierLength) {
            Some(CapabilityValue::Number(0)) | None => None,
            Some(CapabilityValue::Number(n)) => usize::try_from(*n).ok(),
            Some(_) => None,
        }
    }

    /// Quote one identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = name.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }
}
