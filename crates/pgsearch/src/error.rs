//! Error types for search scope compilation and execution.
//!
//! Configuration errors are raised while a declaration is compiled, before any
//! SQL reaches the database. Execution errors only exist when the `postgres`
//! feature runs a compiled scope.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Declaration or schema problems found at compile time
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Database errors while running a compiled scope
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Errors in a search declaration or its schema lookups.
///
/// These are fatal: the declaration cannot be compiled and must be fixed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The schema reflection has no model with this name.
    #[error("unknown model: {model}")]
    UnknownModel { model: String },

    /// The model has no association with this name.
    #[error("unknown association '{association}' on model {model}")]
    UnknownAssociation { model: String, association: String },

    /// The table has no column with this name.
    #[error("unknown column '{column}' on table {table}")]
    UnknownColumn { table: String, column: String },

    /// No feature strategy is registered under this name.
    #[error("unknown search feature: {name}")]
    UnknownFeature { name: String },

    /// A feature was listed twice in `using`, or registered twice.
    #[error("search feature '{name}' declared more than once")]
    DuplicateFeature { name: String },

    /// A feature or column option could not be interpreted.
    #[error("malformed option for {feature}: {message}")]
    MalformedOption { feature: String, message: String },

    /// An `ignoring` rule the compiler does not know.
    #[error("unknown normalization rule: {rule}")]
    UnknownNormalization { rule: String },

    /// A feature needs raw text but the column only exposes a precomputed vector.
    #[error("feature '{feature}' requires text but column '{column}' is a precomputed vector")]
    TextRequired { feature: String, column: String },

    /// The declaration as a whole is inconsistent.
    #[error("invalid search declaration: {message}")]
    InvalidDeclaration { message: String },

    /// No scope is defined under this name.
    #[error("unknown search scope: {name}")]
    UnknownScope { name: String },

    /// A scope with this name is already defined.
    #[error("search scope '{name}' is already defined")]
    DuplicateScope { name: String },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::MalformedOption`].
    pub fn malformed(feature: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigurationError::MalformedOption {
            feature: feature.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`ConfigurationError::InvalidDeclaration`].
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigurationError::InvalidDeclaration {
            message: message.into(),
        }
    }
}

/// Errors raised while executing compiled SQL.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A connection could not be obtained from the pool.
    #[error("connection pool error: {message}")]
    Pool { message: String },

    /// The database rejected or failed the query.
    #[error("query failed for scope {scope}: {message}")]
    Query { scope: String, message: String },
}

/// Result type for compilation-only operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Result type for search operations.
pub type SearchResult<T> = Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::UnknownAssociation {
            model: "posts".to_string(),
            association: "author".to_string(),
        };
        assert!(err.to_string().contains("author"));
        assert!(err.to_string().contains("posts"));
    }

    #[test]
    fn test_search_error_from_configuration() {
        let err: SearchError = ConfigurationError::UnknownFeature {
            name: "soundex".to_string(),
        }
        .into();
        assert!(matches!(err, SearchError::Configuration(_)));
        assert_eq!(err.to_string(), "unknown search feature: soundex");
    }

    #[test]
    fn test_malformed_shorthand() {
        let err = ConfigurationError::malformed("trigram", "threshold must be positive");
        assert_eq!(
            err.to_string(),
            "malformed option for trigram: threshold must be positive"
        );
    }
}
