//! Identifier and literal quoting.

/// Quotes names and configuration values for interpolation into SQL.
///
/// User search text never goes through a quoter; it is always bound with
/// [`ParamBinder`](super::ParamBinder).
pub trait SqlQuoter: Send + Sync {
    /// Quotes a single identifier (column, alias).
    fn quote_identifier(&self, name: &str) -> String;

    /// Quotes a possibly schema-qualified table name.
    fn quote_table_name(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a string literal.
    fn quote_literal(&self, value: &str) -> String;

    /// Renders `table.column` with both parts quoted.
    fn qualified_column(&self, table: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.quote_table_name(table),
            self.quote_identifier(column)
        )
    }
}

/// PostgreSQL quoting rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresQuoter;

impl SqlQuoter for PostgresQuoter {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &str) -> String {
        if value.contains('\\') {
            format!("E'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
        } else {
            format!("'{}'", value.replace('\'', "''"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        let q = PostgresQuoter;
        assert_eq!(q.quote_identifier("title"), "\"title\"");
        assert_eq!(q.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_table_name() {
        let q = PostgresQuoter;
        assert_eq!(q.quote_table_name("posts"), "\"posts\"");
        assert_eq!(q.quote_table_name("blog.posts"), "\"blog\".\"posts\"");
    }

    #[test]
    fn test_quote_literal() {
        let q = PostgresQuoter;
        assert_eq!(q.quote_literal("english"), "'english'");
        assert_eq!(q.quote_literal("o'brien"), "'o''brien'");
        assert_eq!(q.quote_literal("a\\b"), "E'a\\\\b'");
    }

    #[test]
    fn test_qualified_column() {
        let q = PostgresQuoter;
        assert_eq!(q.qualified_column("posts", "title"), "\"posts\".\"title\"");
    }
}
