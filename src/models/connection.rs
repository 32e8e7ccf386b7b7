//! Backend identification.

use serde::{Deserialize, Serialize};

/// Supported database backends.
///
/// The backend is chosen once, when a [`Dialect`](crate::dialect::Dialect) is
/// constructed, and selects the behavior of every component built from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl Backend {
    /// Parse the backend from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this backend.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_connection_string() {
        assert_eq!(
            Backend::from_connection_string("postgres://localhost/db"),
            Some(Backend::PostgreSQL)
        );
        assert_eq!(
            Backend::from_connection_string("postgresql://localhost/db"),
            Some(Backend::PostgreSQL)
        );
        assert_eq!(
            Backend::from_connection_string("mariadb://localhost/db"),
            Some(Backend::MySQL)
        );
        assert_eq!(
            Backend::from_connection_string("sqlite:test.db"),
            Some(Backend::SQLite)
        );
        assert_eq!(Backend::from_connection_string("oracle://localhost"), None);
    }

    #[test]
    fn test_default_port() {
        assert_eq!(Backend::PostgreSQL.default_port(), Some(5432));
        assert_eq!(Backend::SQLite.default_port(), None);
    }
}
