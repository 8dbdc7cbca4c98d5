//! Search features.
//!
//! A feature turns the resolved columns and the query text into a predicate,
//! a rank expression, and optional extra select clauses. Features are looked
//! up by name in a [`FeatureRegistry`], so new ones plug in without touching
//! the compiler.
//!
//! # Built-in features
//!
//! | Name | Predicate | Rank |
//! |------|-----------|------|
//! | `tsearch` | `tsvector @@ tsquery` | `ts_rank` |
//! | `trigram` | `%` / `similarity >= t` | `similarity` |
//! | `dmetaphone` | per-term phonetic code equality | `1.0` / `0.0` |

mod dmetaphone;
mod registry;
mod trigram;
mod tsearch;

pub use dmetaphone::DmetaphoneStrategy;
pub use registry::FeatureRegistry;
pub use trigram::TrigramStrategy;
pub use tsearch::TsearchStrategy;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::column::ResolvedColumn;
use crate::config::{CompilerConfig, EmptyQueryPolicy};
use crate::error::{ConfigResult, ConfigurationError};
use crate::normalize::Normalizer;
use crate::sql::{ParamBinder, SqlQuoter};

/// Option key shared by every feature: restricts it to some declared columns.
pub const ONLY_OPTION: &str = "only";

/// Characters that would break out of a quoted tsquery lexeme.
const DISALLOWED_TERM_CHARS: &[char] = &['\'', '?', '\\', ':', '‘', '’', 'ʻ', 'ʼ'];

/// The SQL one feature contributes to a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSql {
    /// Boolean expression.
    pub predicate: String,
    /// Numeric expression.
    pub rank: String,
    /// Complete `<expr> AS <alias>` select items.
    pub extra_selects: Vec<String>,
}

impl FeatureSql {
    /// SQL for a query with no usable terms.
    pub fn inert(policy: EmptyQueryPolicy) -> Self {
        Self {
            predicate: policy.predicate().to_string(),
            rank: "0".to_string(),
            extra_selects: Vec::new(),
        }
    }
}

/// Per-invocation input to [`Feature::compile`].
#[derive(Debug)]
pub struct FeatureInput<'a> {
    /// Columns this feature searches, never empty.
    pub columns: Vec<&'a ResolvedColumn>,
    /// Trimmed query text.
    pub query: &'a str,
    /// Normalization applied to documents and bound query text alike.
    pub normalizer: &'a Normalizer,
    /// What to do when the query has no usable terms.
    pub empty_query: EmptyQueryPolicy,
}

impl FeatureInput<'_> {
    /// Text expressions of the columns; precomputed vectors are skipped.
    pub fn text_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|c| c.text_sql())
    }

    /// Binds `value` and returns its normalized placeholder.
    pub fn bind(&self, binder: &mut ParamBinder, value: &str) -> String {
        let placeholder = binder.bind_text(value);
        self.normalizer.apply(&placeholder)
    }

    /// All text columns concatenated with single spaces, NULLs as empty strings.
    pub fn combined_text(&self) -> String {
        self.text_columns()
            .map(|sql| format!("coalesce({}, '')", sql))
            .collect::<Vec<_>>()
            .join(" || ' ' || ")
    }
}

/// A configured feature, immutable once instantiated.
pub trait Feature: Send + Sync + fmt::Debug {
    /// Feature name as registered.
    fn name(&self) -> &str;

    /// Precomputed vector column names offered by this feature's options.
    fn vector_columns(&self) -> &[String] {
        &[]
    }

    /// Checks the columns this feature will search.
    fn validate(&self, _columns: &[&ResolvedColumn]) -> ConfigResult<()> {
        Ok(())
    }

    /// Renders predicate, rank, and extra selects for one query.
    fn compile(&self, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> FeatureSql;
}

/// A named factory of [`Feature`]s.
pub trait FeatureStrategy: Send + Sync {
    /// Name used in `using`.
    fn name(&self) -> &'static str;

    /// Returns true if column weights affect the rank.
    fn supports_weighting(&self) -> bool {
        false
    }

    /// Returns true if the feature cannot search precomputed vectors.
    fn requires_text(&self) -> bool {
        false
    }

    /// Builds a feature from its options. `Value::Null` means defaults.
    fn instantiate(
        &self,
        options: &Value,
        config: &CompilerConfig,
        quoter: &dyn SqlQuoter,
    ) -> ConfigResult<Arc<dyn Feature>>;
}

/// One name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            StringList::One(s) => vec![s],
            StringList::Many(v) => v,
        }
    }
}

/// Separates the shared `only` option from feature-specific options.
pub fn split_options(feature: &str, options: &Value) -> ConfigResult<(Option<Vec<String>>, Value)> {
    match options {
        Value::Null => Ok((None, Value::Null)),
        Value::Object(map) => {
            let mut rest = map.clone();
            let only = match rest.remove(ONLY_OPTION) {
                None => None,
                Some(value) => {
                    let names = serde_json::from_value::<StringList>(value)
                        .map_err(|e| ConfigurationError::malformed(feature, e.to_string()))?
                        .into_vec();
                    if names.is_empty() {
                        return Err(ConfigurationError::malformed(
                            feature,
                            "'only' must name at least one column",
                        ));
                    }
                    Some(names)
                }
            };
            let rest = if rest.is_empty() {
                Value::Null
            } else {
                Value::Object(rest)
            };
            Ok((only, rest))
        }
        other => Err(ConfigurationError::malformed(
            feature,
            format!("options must be an object, got {}", other),
        )),
    }
}

/// Deserializes feature options, using the default for `Value::Null`.
pub(crate) fn parse_options<T>(feature: &str, options: &Value) -> ConfigResult<T>
where
    T: DeserializeOwned + Default,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone())
        .map_err(|e| ConfigurationError::malformed(feature, e.to_string()))
}

/// Fails with [`ConfigurationError::TextRequired`] on the first vector column.
pub fn require_text(feature: &str, columns: &[&ResolvedColumn]) -> ConfigResult<()> {
    match columns.iter().find(|c| c.is_vector()) {
        Some(column) => Err(ConfigurationError::TextRequired {
            feature: feature.to_string(),
            column: column.name().to_string(),
        }),
        None => Ok(()),
    }
}

/// Blanks characters that are unsafe inside a quoted lexeme and trims the result.
pub fn sanitize_term(token: &str) -> String {
    token
        .chars()
        .map(|c| if DISALLOWED_TERM_CHARS.contains(&c) { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitized, non-empty terms of a query.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(sanitize_term)
        .filter(|t| !t.is_empty())
        .collect()
}
