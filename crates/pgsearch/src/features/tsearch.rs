//! PostgreSQL full text search (`tsvector @@ tsquery`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::column::{ColumnRendering, ResolvedColumn};
use crate::config::CompilerConfig;
use crate::error::{ConfigResult, ConfigurationError};
use crate::sql::{ParamBinder, SqlQuoter};

use super::{
    Feature, FeatureInput, FeatureSql, FeatureStrategy, StringList, parse_options, require_text,
    sanitize_term,
};

const NAME: &str = "tsearch";

/// `setweight` labels from heaviest to lightest.
const WEIGHT_LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Weight of columns declared without one.
const DEFAULT_WEIGHT: f64 = 1.0;

/// Highest `ts_rank` normalization bitmask (flags 1 through 32).
const MAX_NORMALIZATION: u8 = 63;

/// Registry entry for `tsearch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsearchStrategy;

impl FeatureStrategy for TsearchStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports_weighting(&self) -> bool {
        true
    }

    fn instantiate(
        &self,
        options: &Value,
        config: &CompilerConfig,
        quoter: &dyn SqlQuoter,
    ) -> ConfigResult<Arc<dyn Feature>> {
        let options: TsearchOptions = parse_options(NAME, options)?;

        if options.normalization > MAX_NORMALIZATION {
            return Err(ConfigurationError::malformed(
                NAME,
                format!(
                    "normalization must be between 0 and {}, got {}",
                    MAX_NORMALIZATION, options.normalization
                ),
            ));
        }

        let dictionary = options
            .dictionary
            .unwrap_or_else(|| config.default_dictionary.clone());
        if dictionary.is_empty() {
            return Err(ConfigurationError::malformed(
                NAME,
                "dictionary must not be empty",
            ));
        }

        let highlight = options
            .highlight
            .map(|h| h.render(quoter, &config.highlight_alias))
            .transpose()?;

        Ok(Arc::new(Tsearch {
            dictionary: format!("{}::regconfig", quoter.quote_literal(&dictionary)),
            prefix: options.prefix,
            negation: options.negation,
            any_word: options.any_word,
            normalization: options.normalization,
            vector_columns: options
                .tsvector_column
                .map(StringList::into_vec)
                .unwrap_or_default(),
            highlight,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TsearchOptions {
    dictionary: Option<String>,
    #[serde(default)]
    prefix: bool,
    #[serde(default)]
    negation: bool,
    #[serde(default)]
    any_word: bool,
    #[serde(default)]
    normalization: u8,
    tsvector_column: Option<StringList>,
    highlight: Option<HighlightOptions>,
}

/// `ts_headline` settings.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HighlightOptions {
    start_sel: Option<String>,
    stop_sel: Option<String>,
    max_words: Option<u32>,
    min_words: Option<u32>,
    max_fragments: Option<u32>,
    fragment_delimiter: Option<String>,
    highlight_all: Option<bool>,
}

impl HighlightOptions {
    fn render(self, quoter: &dyn SqlQuoter, alias: &str) -> ConfigResult<Highlight> {
        let mut parts = Vec::new();
        for (key, value) in [
            ("StartSel", self.start_sel),
            ("StopSel", self.stop_sel),
            ("FragmentDelimiter", self.fragment_delimiter),
        ] {
            if let Some(value) = value {
                if value.contains('"') {
                    return Err(ConfigurationError::malformed(
                        NAME,
                        format!("highlight {} must not contain '\"'", key),
                    ));
                }
                parts.push(format!("{} = \"{}\"", key, value));
            }
        }
        for (key, value) in [
            ("MaxWords", self.max_words),
            ("MinWords", self.min_words),
            ("MaxFragments", self.max_fragments),
        ] {
            if let Some(value) = value {
                parts.push(format!("{} = {}", key, value));
            }
        }
        if let Some(all) = self.highlight_all {
            parts.push(format!("HighlightAll = {}", all));
        }

        if let (Some(min), Some(max)) = (self.min_words, self.max_words)
            && min >= max
        {
            return Err(ConfigurationError::malformed(
                NAME,
                "highlight min_words must be less than max_words",
            ));
        }

        Ok(Highlight {
            options: (!parts.is_empty()).then(|| quoter.quote_literal(&parts.join(", "))),
            alias: alias.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
struct Highlight {
    options: Option<String>,
    alias: String,
}

/// A query term; `negated` terms must not match.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    text: String,
    negated: bool,
}

/// Configured `tsearch` instance.
#[derive(Debug, Clone)]
pub struct Tsearch {
    dictionary: String,
    prefix: bool,
    negation: bool,
    any_word: bool,
    normalization: u8,
    vector_columns: Vec<String>,
    highlight: Option<Highlight>,
}

impl Tsearch {
    /// Parses a query into OR'ed groups of AND'ed terms.
    fn parse(&self, query: &str) -> Vec<Vec<Term>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();

        for token in query.split_whitespace() {
            if token == "OR" || token == "|" {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                continue;
            }

            let (negated, raw) = match token.strip_prefix('!') {
                Some(rest) if self.negation => (true, rest),
                _ => (false, token),
            };
            let text = sanitize_term(raw);
            if text.is_empty() {
                continue;
            }

            let term = Term { text, negated };
            if self.any_word {
                groups.push(vec![term]);
            } else {
                current.push(term);
            }
        }

        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    fn term_sql(&self, term: &Term, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> String {
        let placeholder = input.bind(binder, &term.text);
        let mut lexeme = format!("''' ' || {} || ' '''", placeholder);
        if self.prefix {
            lexeme.push_str(" || ':*'");
        }
        let tsquery = format!("to_tsquery({}, {})", self.dictionary, lexeme);
        if term.negated {
            format!("!!({})", tsquery)
        } else {
            tsquery
        }
    }

    fn tsquery(&self, groups: &[Vec<Term>], input: &FeatureInput<'_>, binder: &mut ParamBinder) -> String {
        groups
            .iter()
            .map(|group| {
                let terms: Vec<String> = group
                    .iter()
                    .map(|term| self.term_sql(term, input, binder))
                    .collect();
                format!("({})", terms.join(" && "))
            })
            .collect::<Vec<_>>()
            .join(" || ")
    }

    fn document(&self, input: &FeatureInput<'_>, labels: Option<&[(f64, char)]>) -> String {
        input
            .columns
            .iter()
            .map(|column| {
                let vector = match &column.rendering {
                    ColumnRendering::Text(sql) => format!(
                        "to_tsvector({}, {})",
                        self.dictionary,
                        input.normalizer.apply(&format!("coalesce({}, '')", sql))
                    ),
                    ColumnRendering::Vector(sql) => format!("coalesce({}, ''::tsvector)", sql),
                };
                match labels {
                    Some(labels) => {
                        format!("setweight({}, '{}')", vector, label_for(labels, column.weight()))
                    }
                    None => vector,
                }
            })
            .collect::<Vec<_>>()
            .join(" || ")
    }

    fn rank(&self, document: &str, tsquery: &str, labels: Option<&[(f64, char)]>) -> String {
        match labels {
            Some(labels) => {
                // ts_rank orders weights {D, C, B, A} and rejects values above 1.
                let heaviest = labels.first().map(|(w, _)| *w).unwrap_or(DEFAULT_WEIGHT);
                let weights: Vec<String> = WEIGHT_LABELS
                    .iter()
                    .rev()
                    .map(|label| {
                        labels
                            .iter()
                            .find(|(_, l)| l == label)
                            .map(|(w, _)| (w / heaviest).to_string())
                            .unwrap_or_else(|| "0".to_string())
                    })
                    .collect();
                format!(
                    "ts_rank(ARRAY[{}]::float4[], ({}), ({}), {})",
                    weights.join(", "),
                    document,
                    tsquery,
                    self.normalization
                )
            }
            None => format!(
                "ts_rank(({}), ({}), {})",
                document, tsquery, self.normalization
            ),
        }
    }
}

/// Assigns a label to each distinct weight, heaviest first.
///
/// Returns `None` when no column carries a weight.
fn weight_labels(columns: &[&ResolvedColumn]) -> ConfigResult<Option<Vec<(f64, char)>>> {
    if columns.iter().all(|c| c.weight().is_none()) {
        return Ok(None);
    }

    let mut weights: Vec<f64> = Vec::new();
    for column in columns {
        let weight = column.weight().unwrap_or(DEFAULT_WEIGHT);
        if !weights.contains(&weight) {
            weights.push(weight);
        }
    }
    if weights.len() > WEIGHT_LABELS.len() {
        return Err(ConfigurationError::malformed(
            NAME,
            format!(
                "at most {} distinct column weights are supported, got {}",
                WEIGHT_LABELS.len(),
                weights.len()
            ),
        ));
    }

    weights.sort_by(|a, b| b.total_cmp(a));
    Ok(Some(weights.into_iter().zip(WEIGHT_LABELS).collect()))
}

fn label_for(labels: &[(f64, char)], weight: Option<f64>) -> char {
    let weight = weight.unwrap_or(DEFAULT_WEIGHT);
    labels
        .iter()
        .find(|(w, _)| *w == weight)
        .map(|(_, label)| *label)
        .unwrap_or('D')
}

impl Feature for Tsearch {
    fn name(&self) -> &str {
        NAME
    }

    fn vector_columns(&self) -> &[String] {
        &self.vector_columns
    }

    fn validate(&self, columns: &[&ResolvedColumn]) -> ConfigResult<()> {
        weight_labels(columns)?;
        if self.highlight.is_some() {
            require_text(NAME, columns)?;
        }
        Ok(())
    }

    fn compile(&self, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> FeatureSql {
        let groups = self.parse(input.query);
        if groups.is_empty() {
            let mut sql = FeatureSql::inert(input.empty_query);
            if let Some(highlight) = &self.highlight {
                sql.extra_selects
                    .push(format!("NULL::text AS {}", highlight.alias));
            }
            return sql;
        }

        // Checked by validate at compile time.
        let labels = weight_labels(&input.columns).ok().flatten();
        let tsquery = self.tsquery(&groups, input, binder);
        let document = self.document(input, labels.as_deref());

        let mut extra_selects = Vec::new();
        if let Some(highlight) = &self.highlight {
            let options = highlight
                .options
                .as_ref()
                .map(|o| format!(", {}", o))
                .unwrap_or_default();
            extra_selects.push(format!(
                "ts_headline({}, {}, ({}){}) AS {}",
                self.dictionary,
                input.combined_text(),
                tsquery,
                options,
                highlight.alias
            ));
        }

        FeatureSql {
            predicate: format!("({}) @@ ({})", document, tsquery),
            rank: self.rank(&document, &tsquery, labels.as_deref()),
            extra_selects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnReference;
    use crate::config::EmptyQueryPolicy;
    use crate::normalize::Normalizer;
    use crate::sql::{PostgresQuoter, SqlParam};
    use serde_json::json;

    fn text(name: &str, weight: Option<f64>) -> ResolvedColumn {
        let mut reference = ColumnReference::local(name);
        reference.weight = weight;
        ResolvedColumn {
            reference,
            rendering: ColumnRendering::Text(format!("\"posts\".\"{}\"::text", name)),
        }
    }

    fn vector(name: &str) -> ResolvedColumn {
        ResolvedColumn {
            reference: ColumnReference::local(name),
            rendering: ColumnRendering::Vector(format!("\"posts\".\"{}_vector\"", name)),
        }
    }

    fn feature(options: Value) -> Arc<dyn Feature> {
        TsearchStrategy
            .instantiate(&options, &CompilerConfig::default(), &PostgresQuoter)
            .unwrap()
    }

    fn compile(feature: &dyn Feature, columns: &[&ResolvedColumn], query: &str) -> (FeatureSql, Vec<SqlParam>) {
        let normalizer = Normalizer::identity();
        let input = FeatureInput {
            columns: columns.to_vec(),
            query,
            normalizer: &normalizer,
            empty_query: EmptyQueryPolicy::MatchNothing,
        };
        let mut binder = ParamBinder::new(0);
        let sql = feature.compile(&input, &mut binder);
        (sql, binder.into_params())
    }

    #[test]
    fn test_single_term() {
        let title = text("title", None);
        let (sql, params) = compile(feature(Value::Null).as_ref(), &[&title], "foo");

        assert_eq!(
            sql.predicate,
            "(to_tsvector('simple'::regconfig, coalesce(\"posts\".\"title\"::text, ''))) @@ \
             ((to_tsquery('simple'::regconfig, ''' ' || $1 || ' ''')))"
        );
        assert!(sql.rank.starts_with("ts_rank((to_tsvector("));
        assert!(sql.rank.ends_with(", 0)"));
        assert_eq!(params, vec![SqlParam::text("foo")]);
    }

    #[test]
    fn test_terms_are_anded() {
        let title = text("title", None);
        let content = text("content", None);
        let (sql, params) = compile(feature(Value::Null).as_ref(), &[&title, &content], "foo bar");

        assert!(sql.predicate.contains(
            "coalesce(\"posts\".\"title\"::text, '')) || to_tsvector('simple'::regconfig, coalesce(\"posts\".\"content\"::text, ''))"
        ));
        assert!(sql.predicate.contains("$1 || ' ''') && to_tsquery("));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_explicit_or() {
        let title = text("title", None);
        let (sql, params) = compile(feature(Value::Null).as_ref(), &[&title], "foo OR bar | baz");
        assert!(sql.predicate.contains("$1 || ' '''))"));
        assert_eq!(sql.predicate.matches(") || (to_tsquery").count(), 2);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_any_word() {
        let f = feature(json!({"any_word": true}));
        let title = text("title", None);
        let (sql, _) = compile(f.as_ref(), &[&title], "foo bar");
        assert!(!sql.predicate.contains("&&"));
        assert!(sql.predicate.contains(") || ("));
    }

    #[test]
    fn test_prefix_and_negation() {
        let f = feature(json!({"prefix": true, "negation": true}));
        let title = text("title", None);
        let (sql, params) = compile(f.as_ref(), &[&title], "foo !bar");
        assert!(sql.predicate.contains("' ''' || ':*')"));
        assert!(sql.predicate.contains("!!(to_tsquery("));
        assert_eq!(params, vec![SqlParam::text("foo"), SqlParam::text("bar")]);
    }

    #[test]
    fn test_bang_is_literal_without_negation() {
        let title = text("title", None);
        let (sql, params) = compile(feature(Value::Null).as_ref(), &[&title], "!bar");
        assert!(!sql.predicate.contains("!!"));
        assert_eq!(params, vec![SqlParam::text("!bar")]);
    }

    #[test]
    fn test_disallowed_characters() {
        let title = text("title", None);
        let (_, params) = compile(feature(Value::Null).as_ref(), &[&title], "it's ?");
        assert_eq!(params, vec![SqlParam::text("it s")]);
    }

    #[test]
    fn test_empty_query_is_inert() {
        let title = text("title", None);
        let (sql, params) = compile(feature(Value::Null).as_ref(), &[&title], "  ?  OR ");
        assert_eq!(sql, FeatureSql::inert(EmptyQueryPolicy::MatchNothing));
        assert!(params.is_empty());
    }

    #[test]
    fn test_dictionary_and_normalization() {
        let f = feature(json!({"dictionary": "english", "normalization": 2}));
        let title = text("title", None);
        let (sql, _) = compile(f.as_ref(), &[&title], "foo");
        assert!(sql.predicate.contains("to_tsvector('english'::regconfig"));
        assert!(sql.rank.ends_with(", 2)"));
    }

    #[test]
    fn test_weights_map_to_labels() {
        let title = text("title", Some(2.0));
        let content = text("content", None);
        let body = text("body", Some(0.5));
        let (sql, _) = compile(feature(Value::Null).as_ref(), &[&title, &content, &body], "foo");

        assert!(sql.predicate.contains("setweight(to_tsvector('simple'::regconfig, coalesce(\"posts\".\"title\"::text, '')), 'A')"));
        assert!(sql.predicate.contains("\"content\"::text, '')), 'B')"));
        assert!(sql.predicate.contains("\"body\"::text, '')), 'C')"));
        assert!(sql.rank.starts_with("ts_rank(ARRAY[0, 0.25, 0.5, 1]::float4[], "));
    }

    #[test]
    fn test_too_many_weights() {
        let columns: Vec<ResolvedColumn> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .enumerate()
            .map(|(i, w)| text(&format!("c{}", i), Some(*w)))
            .collect();
        let refs: Vec<&ResolvedColumn> = columns.iter().collect();
        let err = feature(Value::Null).validate(&refs).unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedOption { .. }));
    }

    #[test]
    fn test_vector_column() {
        let content = vector("content");
        let (sql, _) = compile(feature(Value::Null).as_ref(), &[&content], "foo");
        assert!(
            sql.predicate
                .starts_with("(coalesce(\"posts\".\"content_vector\", ''::tsvector)) @@ ")
        );
    }

    #[test]
    fn test_tsvector_column_option() {
        let f = feature(json!({"tsvector_column": "content_vector"}));
        assert_eq!(f.vector_columns(), ["content_vector".to_string()]);
        let f = feature(json!({"tsvector_column": ["a_vector", "b_vector"]}));
        assert_eq!(f.vector_columns().len(), 2);
    }

    #[test]
    fn test_highlight() {
        let f = feature(json!({"highlight": {"start_sel": "<b>", "stop_sel": "</b>", "max_words": 10, "min_words": 2}}));
        let title = text("title", None);
        let (sql, _) = compile(f.as_ref(), &[&title], "foo");
        assert_eq!(sql.extra_selects.len(), 1);
        let select = &sql.extra_selects[0];
        assert!(select.starts_with("ts_headline('simple'::regconfig, coalesce(\"posts\".\"title\"::text, ''), "));
        assert!(select.contains("'StartSel = \"<b>\", StopSel = \"</b>\", MaxWords = 10, MinWords = 2'"));
        assert!(select.ends_with(" AS pg_search_highlight"));

        let (sql, _) = compile(f.as_ref(), &[&title], "");
        assert_eq!(sql.extra_selects, vec!["NULL::text AS pg_search_highlight"]);
    }

    #[test]
    fn test_highlight_requires_text() {
        let f = feature(json!({"highlight": {}}));
        let content = vector("content");
        let err = f.validate(&[&content]).unwrap_err();
        assert!(matches!(err, ConfigurationError::TextRequired { .. }));
    }

    #[test]
    fn test_malformed_options() {
        let config = CompilerConfig::default();
        for options in [
            json!({"prefx": true}),
            json!({"normalization": 64}),
            json!({"normalization": -1}),
            json!({"dictionary": ""}),
            json!({"highlight": {"start_sel": "\""}}),
            json!({"highlight": {"min_words": 5, "max_words": 5}}),
        ] {
            let err = TsearchStrategy
                .instantiate(&options, &config, &PostgresQuoter)
                .err()
                .unwrap();
            assert!(matches!(err, ConfigurationError::MalformedOption { .. }), "{}", options);
        }
    }
}
