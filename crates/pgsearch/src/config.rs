//! Compiler configuration.
//!
//! All fields carry serde defaults so a partial JSON document is enough to
//! override a single setting:
//!
//! ```
//! use helios_pgsearch::config::{CompilerConfig, EmptyQueryPolicy};
//!
//! let config: CompilerConfig =
//!     serde_json::from_str(r#"{ "default_dictionary": "english" }"#).unwrap();
//! assert_eq!(config.default_dictionary, "english");
//! assert_eq!(config.empty_query, EmptyQueryPolicy::MatchNothing);
//! ```

use serde::{Deserialize, Serialize};

/// What a feature's predicate does when the query has no usable terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryPolicy {
    /// An empty query matches no rows.
    #[default]
    MatchNothing,
    /// An empty query matches every row.
    MatchAll,
}

impl EmptyQueryPolicy {
    /// The constant predicate for this policy.
    pub fn predicate(&self) -> &'static str {
        match self {
            EmptyQueryPolicy::MatchNothing => "FALSE",
            EmptyQueryPolicy::MatchAll => "TRUE",
        }
    }
}

/// Settings shared by every declaration a compiler handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Text search configuration used when `tsearch` has no `dictionary`.
    #[serde(default = "default_dictionary")]
    pub default_dictionary: String,

    /// SQL function applied for `ignoring: ["accents"]`.
    #[serde(default = "default_unaccent_function")]
    pub unaccent_function: String,

    /// Predicate policy for empty or whitespace-only queries.
    #[serde(default)]
    pub empty_query: EmptyQueryPolicy,

    /// Prefix of every generated alias.
    #[serde(default = "default_alias_prefix")]
    pub alias_prefix: String,

    /// Column alias of the rank in scoped selects.
    #[serde(default = "default_rank_alias")]
    pub rank_alias: String,

    /// Column alias of `tsearch` highlights.
    #[serde(default = "default_highlight_alias")]
    pub highlight_alias: String,
}

fn default_dictionary() -> String {
    "simple".to_string()
}

fn default_unaccent_function() -> String {
    "unaccent".to_string()
}

fn default_alias_prefix() -> String {
    "pg_search".to_string()
}

fn default_rank_alias() -> String {
    "pg_search_rank".to_string()
}

fn default_highlight_alias() -> String {
    "pg_search_highlight".to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_dictionary: default_dictionary(),
            unaccent_function: default_unaccent_function(),
            empty_query: EmptyQueryPolicy::default(),
            alias_prefix: default_alias_prefix(),
            rank_alias: default_rank_alias(),
            highlight_alias: default_highlight_alias(),
        }
    }
}

impl CompilerConfig {
    /// Sets the empty-query policy.
    pub fn with_empty_query(mut self, policy: EmptyQueryPolicy) -> Self {
        self.empty_query = policy;
        self
    }

    /// Sets the default text search dictionary.
    pub fn with_dictionary(mut self, dictionary: impl Into<String>) -> Self {
        self.default_dictionary = dictionary.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.default_dictionary, "simple");
        assert_eq!(config.unaccent_function, "unaccent");
        assert_eq!(config.empty_query, EmptyQueryPolicy::MatchNothing);
        assert_eq!(config.alias_prefix, "pg_search");
        assert_eq!(config.rank_alias, "pg_search_rank");
    }

    #[test]
    fn test_config_from_empty_json() {
        let config: CompilerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = CompilerConfig::default()
            .with_empty_query(EmptyQueryPolicy::MatchAll)
            .with_dictionary("english");

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"match_all\""));
        let deserialized: CompilerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_empty_query_predicates() {
        assert_eq!(EmptyQueryPolicy::MatchNothing.predicate(), "FALSE");
        assert_eq!(EmptyQueryPolicy::MatchAll.predicate(), "TRUE");
    }
}
