//! Trigram similarity (`pg_trgm`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::column::ResolvedColumn;
use crate::config::CompilerConfig;
use crate::error::{ConfigResult, ConfigurationError};
use crate::sql::{ParamBinder, SqlQuoter};

use super::{Feature, FeatureInput, FeatureSql, FeatureStrategy, parse_options, require_text};

const NAME: &str = "trigram";

/// Registry entry for `trigram`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrigramStrategy;

impl FeatureStrategy for TrigramStrategy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn requires_text(&self) -> bool {
        true
    }

    fn instantiate(
        &self,
        options: &Value,
        _config: &CompilerConfig,
        _quoter: &dyn SqlQuoter,
    ) -> ConfigResult<Arc<dyn Feature>> {
        let options: TrigramOptions = parse_options(NAME, options)?;
        if let Some(threshold) = options.threshold
            && !(threshold > 0.0 && threshold <= 1.0)
        {
            return Err(ConfigurationError::malformed(
                NAME,
                format!("threshold must be in (0, 1], got {}", threshold),
            ));
        }

        Ok(Arc::new(Trigram {
            threshold: options.threshold,
            word_similarity: options.word_similarity,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrigramOptions {
    threshold: Option<f64>,
    #[serde(default)]
    word_similarity: bool,
}

/// Configured `trigram` instance.
///
/// Without a threshold the predicate uses the `%` operators, which read the
/// server's `pg_trgm.similarity_threshold` and can use trigram indexes.
#[derive(Debug, Clone)]
pub struct Trigram {
    threshold: Option<f64>,
    word_similarity: bool,
}

impl Feature for Trigram {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, columns: &[&ResolvedColumn]) -> ConfigResult<()> {
        require_text(NAME, columns)
    }

    fn compile(&self, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> FeatureSql {
        if input.query.is_empty() {
            return FeatureSql::inert(input.empty_query);
        }

        let document = input.normalizer.apply(&input.combined_text());
        let query = input.bind(binder, input.query);

        let (predicate, rank) = if self.word_similarity {
            let rank = format!("word_similarity({}, ({}))", query, document);
            let predicate = match self.threshold {
                Some(t) => format!("{} >= {}", rank, t),
                None => format!("{} <% ({})", query, document),
            };
            (predicate, rank)
        } else {
            let rank = format!("similarity(({}), {})", document, query);
            let predicate = match self.threshold {
                Some(t) => format!("{} >= {}", rank, t),
                None => format!("({}) % {}", document, query),
            };
            (predicate, rank)
        };

        FeatureSql {
            predicate,
            rank,
            extra_selects: Vec::new(),
        }
    }
}
