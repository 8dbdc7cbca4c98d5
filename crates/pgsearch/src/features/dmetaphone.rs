//! Double Metaphone phonetic matching (`fuzzystrmatch`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::column::ResolvedColumn;
use crate::config::CompilerConfig;
use crate::error::ConfigResult;
use crate::sql::{ParamBinder, SqlQuoter, alias};

use super::{
    Feature, FeatureInput, FeatureSql, FeatureStrategy, parse_options, query_terms, require_text,
};

const NAME: &str = "dmetaphone";

/// Registry entry for `dmetaphone`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DmetaphoneStrategy;

impl FeatureStrategy for DmetaphoneStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requires_text(&self) -> bool {
        true
    }

    fn instantiate(
        &self,
        options: &Value,
        config: &CompilerConfig,
        _quoter: &dyn SqlQuoter,
    ) -> ConfigResult<Arc<dyn Feature>> {
        let _: DmetaphoneOptions = parse_options(NAME, options)?;
        Ok(Arc::new(Dmetaphone {
            words_alias: alias(&config.alias_prefix, [NAME, "words"]),
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DmetaphoneOptions {}

/// Configured `dmetaphone` instance.
///
/// Every query term must sound like some word of the document: either its
/// primary or its alternate code has to match.
#[derive(Debug, Clone)]
pub struct Dmetaphone {
    words_alias: String,
}

impl Dmetaphone {
    fn term_predicate(&self, document: &str, term: &str) -> String {
        let word = format!("{}.word", self.words_alias);
        format!(
            "EXISTS (SELECT 1 FROM regexp_split_to_table({document}, '[[:space:]]+') AS {alias}(word) \
             WHERE {word} <> '' AND dmetaphone({term}) <> '' \
             AND (dmetaphone({word}) = dmetaphone({term}) OR dmetaphone_alt({word}) = dmetaphone_alt({term})))",
            document = document,
            alias = self.words_alias,
            word = word,
            term = term,
        )
    }
}

impl Feature for Dmetaphone {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, columns: &[&ResolvedColumn]) -> ConfigResult<()> {
        require_text(NAME, columns)
    }

    fn compile(&self, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> FeatureSql {
        let terms = query_terms(input.query);
        if terms.is_empty() {
            return FeatureSql::inert(input.empty_query);
        }

        let document = input.normalizer.apply(&input.combined_text());
        let predicates: Vec<String> = terms
            .iter()
            .map(|term| {
                let placeholder = input.bind(binder, term);
                format!("({})", self.term_predicate(&document, &placeholder))
            })
            .collect();
        let predicate = predicates.join(" AND ");

        FeatureSql {
            rank: format!("(CASE WHEN {} THEN 1.0 ELSE 0.0 END)", predicate),
            predicate,
            extra_selects: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnReference, ColumnRendering};
    use crate::config::EmptyQueryPolicy;
    use crate::error::ConfigurationError;
    use crate::normalize::Normalizer;
    use crate::sql::{PostgresQuoter, SqlParam};
    use serde_json::json;

    fn feature() -> Arc<dyn Feature> {
        DmetaphoneStrategy
            .instantiate(&Value::Null, &CompilerConfig::default(), &PostgresQuoter)
            .unwrap()
    }

    #[test]
    fn test_terms_each_need_a_match() {
        let name = ResolvedColumn {
            reference: ColumnReference::local("name"),
            rendering: ColumnRendering::Text("name".to_string()),
        };
        let normalizer = Normalizer::identity();
        let input = FeatureInput {
            columns: vec![&name],
            query: "Stephen Jonson",
            normalizer: &normalizer,
            empty_query: EmptyQueryPolicy::MatchNothing,
        };
        let mut binder = ParamBinder::new(4);
        let sql = feature().compile(&input, &mut binder);

        assert_eq!(sql.predicate.matches("EXISTS (SELECT 1 FROM regexp_split_to_table(coalesce(name, ''), '[[:space:]]+')").count(), 2);
        assert!(sql.predicate.contains(") AND ("));
        assert!(sql.predicate.contains("dmetaphone($5)"));
        assert!(sql.predicate.contains("dmetaphone_alt($6)"));
        assert!(sql.rank.starts_with("(CASE WHEN (EXISTS"));
        assert!(sql.rank.ends_with(" THEN 1.0 ELSE 0.0 END)"));
        assert_eq!(
            binder.into_params(),
            vec![SqlParam::text("Stephen"), SqlParam::text("Jonson")]
        );
    }

    #[test]
    fn test_empty_query() {
        let name = ResolvedColumn {
            reference: ColumnReference::local("name"),
            rendering: ColumnRendering::Text("name".to_string()),
        };
        let normalizer = Normalizer::identity();
        let input = FeatureInput {
            columns: vec![&name],
            query: "",
            normalizer: &normalizer,
            empty_query: EmptyQueryPolicy::MatchNothing,
        };
        let sql = feature().compile(&input, &mut ParamBinder::new(0));
        assert_eq!(sql.predicate, "FALSE");
    }

    #[test]
    fn test_rejects_options() {
        let err = DmetaphoneStrategy
            .instantiate(&json!({"threshold": 1}), &CompilerConfig::default(), &PostgresQuoter)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::MalformedOption { .. }));
    }
}
