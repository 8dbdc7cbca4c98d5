//! Text normalization (`ignoring`).
//!
//! Normalization happens in SQL: documents and bound query parameters are
//! wrapped in the same function, so both sides are compared in the same form.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::CompilerConfig;
use crate::error::{ConfigResult, ConfigurationError};

static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("function name pattern is valid")
});

/// A normalization rule from `ignoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizationRule {
    /// Strip diacritics with the configured unaccent function.
    Accents,
}

impl NormalizationRule {
    /// Parses a rule name.
    pub fn parse(rule: &str) -> ConfigResult<Self> {
        match rule {
            "accents" => Ok(NormalizationRule::Accents),
            other => Err(ConfigurationError::UnknownNormalization {
                rule: other.to_string(),
            }),
        }
    }
}

/// Applies the configured rules to SQL expressions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalizer {
    rules: Vec<NormalizationRule>,
    unaccent_function: String,
}

impl Normalizer {
    /// A normalizer that leaves expressions untouched.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builds a normalizer from `ignoring` rule names.
    pub fn from_rules<S: AsRef<str>>(rules: &[S], config: &CompilerConfig) -> ConfigResult<Self> {
        let mut parsed = Vec::new();
        for rule in rules {
            let rule = NormalizationRule::parse(rule.as_ref())?;
            if !parsed.contains(&rule) {
                parsed.push(rule);
            }
        }

        if parsed.contains(&NormalizationRule::Accents)
            && !FUNCTION_NAME.is_match(&config.unaccent_function)
        {
            return Err(ConfigurationError::malformed(
                "ignoring",
                format!(
                    "'{}' is not a valid function name",
                    config.unaccent_function
                ),
            ));
        }

        Ok(Self {
            rules: parsed,
            unaccent_function: config.unaccent_function.clone(),
        })
    }

    /// Returns true if the rule is active.
    pub fn ignores(&self, rule: NormalizationRule) -> bool {
        self.rules.contains(&rule)
    }

    /// Wraps a text expression in every active rule.
    pub fn apply(&self, sql: &str) -> String {
        let mut sql = sql.to_string();
        for rule in &self.rules {
            sql = match rule {
                NormalizationRule::Accents => format!("{}({})", self.unaccent_function, sql),
            };
        }
        sql
    }
}

/// Trims surrounding whitespace from raw query text.
pub fn normalize_query(raw: &str) -> &str {
    raw.trim()
}
