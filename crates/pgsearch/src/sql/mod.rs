//! SQL building blocks shared by every compiler stage.
//!
//! - [`ParamBinder`] hands out `$N` placeholders for user-supplied text
//! - [`SqlQuoter`] quotes identifiers and configuration literals
//! - [`alias`] derives every generated alias

mod alias;
mod quoting;

pub use alias::{alias, is_safe_alias};
pub use quoting::{PostgresQuoter, SqlQuoter};

/// A SQL parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// Text parameter.
    Text(String),
}

impl SqlParam {
    /// Creates a text parameter.
    pub fn text(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }

    /// Returns the text value.
    pub fn as_str(&self) -> &str {
        match self {
            SqlParam::Text(s) => s,
        }
    }
}

/// Collects bound parameters and numbers their placeholders.
///
/// Numbering starts after `offset`, so a fragment can be embedded in a query
/// that already binds its own leading parameters.
#[derive(Debug, Clone, Default)]
pub struct ParamBinder {
    offset: usize,
    params: Vec<SqlParam>,
}

impl ParamBinder {
    /// Creates a binder whose first placeholder is `$offset+1`.
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            params: Vec::new(),
        }
    }

    /// Binds a text value and returns its placeholder.
    pub fn bind_text(&mut self, value: impl Into<String>) -> String {
        self.params.push(SqlParam::Text(value.into()));
        format!("${}", self.offset + self.params.len())
    }

    /// Number of parameters bound so far.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if nothing has been bound.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Consumes the binder, returning the parameters in placeholder order.
    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

/// Joins expressions with a binary SQL operator, parenthesizing each operand.
///
/// Returns `None` for an empty input so callers pick their own identity value.
pub(crate) fn join_parenthesized<I>(parts: I, operator: &str) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let parts: Vec<String> = parts.into_iter().map(|p| format!("({})", p)).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(&format!(" {} ", operator)))
    }
}
