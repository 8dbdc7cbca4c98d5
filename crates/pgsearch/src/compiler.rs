//! Configuration compiler.
//!
//! [`ConfigurationCompiler::compile_static`] validates a declaration against
//! the schema and resolves everything that does not depend on the query:
//! column renderings, association joins, feature instances. The resulting
//! [`CompiledConfiguration`] is immutable and renders a
//! [`CompiledQueryFragment`] for each query without touching the schema again.
//!
//! ```
//! use std::sync::Arc;
//! use helios_pgsearch::compiler::ConfigurationCompiler;
//! use helios_pgsearch::declaration::SearchDeclaration;
//! use helios_pgsearch::schema::{ModelSchema, StaticCatalog};
//!
//! let catalog = StaticCatalog::new()
//!     .with_model("post", ModelSchema::new("posts").with_columns(["title", "content"]));
//! let compiler = ConfigurationCompiler::new(Arc::new(catalog));
//!
//! let compiled = compiler
//!     .compile_static("post", &SearchDeclaration::new().against(["title", "content"]))
//!     .unwrap();
//! let fragment = compiled.fragment("foo bar", 0);
//!
//! assert!(fragment.joins.is_empty());
//! assert!(fragment.predicate.contains(" @@ "));
//! assert_eq!(fragment.params.len(), 2);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::association::AssociationResolver;
use crate::column::{ColumnOwner, ColumnReference, ColumnRendering, ResolvedColumn};
use crate::config::{CompilerConfig, EmptyQueryPolicy};
use crate::declaration::{
    DEFAULT_FEATURE, Declaration, FeatureSpec, InvocationArgs, PredicateCombination,
    RankCombination, SearchDeclaration,
};
use crate::error::{ConfigResult, ConfigurationError};
use crate::features::{Feature, FeatureInput, FeatureRegistry, require_text, split_options};
use crate::normalize::{NormalizationRule, Normalizer, normalize_query};
use crate::schema::SchemaReflection;
use crate::sql::{
    ParamBinder, PostgresQuoter, SqlParam, SqlQuoter, alias, is_safe_alias, join_parenthesized,
};

static RANK_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([a-z_][a-z0-9_]*)").expect("rank placeholder pattern is valid")
});

/// The SQL produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQueryFragment {
    /// `LEFT OUTER JOIN` clauses in declaration order, one per association.
    pub joins: Vec<String>,
    /// Boolean expression for `WHERE`.
    pub predicate: String,
    /// Numeric expression for `ORDER BY ... DESC`.
    pub rank: String,
    /// Additional `<expr> AS <alias>` select items.
    pub extra_selects: Vec<String>,
    /// Bound values for the `$N` placeholders, in order.
    pub params: Vec<SqlParam>,
}

impl CompiledQueryFragment {
    /// The joins as one space-separated clause.
    pub fn join_sql(&self) -> String {
        self.joins.join(" ")
    }
}

/// A feature bound to the columns it searches.
#[derive(Debug, Clone)]
struct CompiledFeature {
    feature: Arc<dyn Feature>,
    columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum RankSegment {
    Sql(String),
    Feature(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum RankExpression {
    Combined(RankCombination),
    Custom(Vec<RankSegment>),
}

/// A validated declaration, ready to render fragments.
#[derive(Debug, Clone)]
pub struct CompiledConfiguration {
    model: String,
    table_name: String,
    primary_key: String,
    primary_key_expr: String,
    columns: Vec<ResolvedColumn>,
    joins: Vec<String>,
    features: Vec<CompiledFeature>,
    normalizer: Normalizer,
    predicate_combination: PredicateCombination,
    rank: RankExpression,
    empty_query: EmptyQueryPolicy,
    query_override: Option<String>,
    order_within_rank: Option<String>,
}

impl CompiledConfiguration {
    /// Model this configuration searches.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Table of the model.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Primary key column of the model.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Quoted, table-qualified primary key.
    pub fn primary_key_expr(&self) -> &str {
        &self.primary_key_expr
    }

    /// Resolved columns in declaration order.
    pub fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    /// Association joins, one per distinct association.
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// Feature names in declaration order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.feature.name()).collect()
    }

    /// Tie-breaking `ORDER BY` expression, if declared.
    pub fn order_within_rank(&self) -> Option<&str> {
        self.order_within_rank.as_deref()
    }

    /// Renders the fragment for `query`, numbering placeholders after `offset`.
    ///
    /// A `query` set on the declaration replaces the invocation's query.
    pub fn fragment(&self, query: &str, offset: usize) -> CompiledQueryFragment {
        let query = normalize_query(self.query_override.as_deref().unwrap_or(query));
        let mut binder = ParamBinder::new(offset);

        if self.columns.is_empty() {
            return CompiledQueryFragment {
                joins: Vec::new(),
                predicate: "TRUE".to_string(),
                rank: "0".to_string(),
                extra_selects: Vec::new(),
                params: Vec::new(),
            };
        }

        let mut predicates = Vec::with_capacity(self.features.len());
        let mut ranks = Vec::with_capacity(self.features.len());
        let mut extra_selects = Vec::new();

        for compiled in &self.features {
            let input = FeatureInput {
                columns: compiled
                    .columns
                    .iter()
                    .filter_map(|&i| self.columns.get(i))
                    .collect(),
                query,
                normalizer: &self.normalizer,
                empty_query: self.empty_query,
            };
            let sql = compiled.feature.compile(&input, &mut binder);
            predicates.push(sql.predicate);
            ranks.push(sql.rank);
            extra_selects.extend(sql.extra_selects);
        }

        let predicate = join_parenthesized(predicates, self.predicate_combination.operator())
            .unwrap_or_else(|| "TRUE".to_string());
        let rank = self.render_rank(ranks);

        CompiledQueryFragment {
            joins: self.joins.clone(),
            predicate,
            rank,
            extra_selects,
            params: binder.into_params(),
        }
    }

    fn render_rank(&self, ranks: Vec<String>) -> String {
        match &self.rank {
            RankExpression::Combined(RankCombination::Sum) => {
                join_parenthesized(ranks, "+").unwrap_or_else(|| "0".to_string())
            }
            RankExpression::Combined(RankCombination::Max) => {
                if ranks.is_empty() {
                    "0".to_string()
                } else {
                    format!("GREATEST({})", ranks.join(", "))
                }
            }
            RankExpression::Custom(segments) => segments
                .iter()
                .map(|segment| match segment {
                    RankSegment::Sql(sql) => sql.clone(),
                    RankSegment::Feature(i) => ranks
                        .get(*i)
                        .map(|r| format!("({})", r))
                        .unwrap_or_else(|| "0".to_string()),
                })
                .collect(),
        }
    }
}

/// Compiles declarations for one schema.
pub struct ConfigurationCompiler {
    reflection: Arc<dyn SchemaReflection>,
    quoter: Arc<dyn SqlQuoter>,
    registry: FeatureRegistry,
    config: CompilerConfig,
}

impl ConfigurationCompiler {
    /// A compiler with PostgreSQL quoting, the built-in features, and default settings.
    pub fn new(reflection: Arc<dyn SchemaReflection>) -> Self {
        Self {
            reflection,
            quoter: Arc::new(PostgresQuoter),
            registry: FeatureRegistry::with_builtins(),
            config: CompilerConfig::default(),
        }
    }

    /// A compiler with every collaborator supplied.
    ///
    /// Fails if a configured alias could not be used unquoted.
    pub fn with_parts(
        reflection: Arc<dyn SchemaReflection>,
        quoter: Arc<dyn SqlQuoter>,
        registry: FeatureRegistry,
        config: CompilerConfig,
    ) -> ConfigResult<Self> {
        let derived = alias(&config.alias_prefix, ["probe"]);
        for (setting, value) in [
            ("alias_prefix", derived.as_str()),
            ("rank_alias", config.rank_alias.as_str()),
            ("highlight_alias", config.highlight_alias.as_str()),
        ] {
            if !is_safe_alias(value) {
                return Err(ConfigurationError::invalid(format!(
                    "{} '{}' is not a valid unquoted identifier",
                    setting, value
                )));
            }
        }

        Ok(Self {
            reflection,
            quoter,
            registry,
            config,
        })
    }

    /// Compiler settings.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Identifier quoting in use.
    pub fn quoter(&self) -> &dyn SqlQuoter {
        self.quoter.as_ref()
    }

    /// Registered features.
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Compiles a declaration and renders it for one invocation.
    ///
    /// Nothing is cached here: static declarations are resolved against the
    /// schema on every call too. To reuse the joins and features of a static
    /// declaration, keep the result of [`compile_static`](Self::compile_static)
    /// and call [`CompiledConfiguration::fragment`], or use a
    /// [`SearchScope`](crate::scope::SearchScope), which does that.
    /// Dynamic declarations are rebuilt and recompiled on every call.
    pub fn compile(
        &self,
        model: &str,
        declaration: &Declaration,
        args: &InvocationArgs,
        offset: usize,
    ) -> ConfigResult<CompiledQueryFragment> {
        let compiled = match declaration {
            Declaration::Static(declaration) => self.compile_static(model, declaration)?,
            Declaration::Dynamic(build) => {
                let declaration = build(args)?;
                tracing::debug!(
                    "Recompiling dynamic search declaration for {} ({} args)",
                    model,
                    args.args.len()
                );
                self.compile_static(model, &declaration)?
            }
        };
        Ok(compiled.fragment(&args.query, offset))
    }

    /// Validates and resolves a declaration.
    pub fn compile_static(
        &self,
        model: &str,
        declaration: &SearchDeclaration,
    ) -> ConfigResult<CompiledConfiguration> {
        let table_name = self.reflection.table_name(model)?;
        let primary_key = self.reflection.primary_key(model)?;
        let primary_key_expr = self.quoter.qualified_column(&table_name, &primary_key);

        let features = self.instantiate_features(declaration)?;
        let normalizer = Normalizer::from_rules(declaration.ignoring.as_slice(), &self.config)?;

        let candidates: Vec<String> = features
            .iter()
            .flat_map(|(feature, _)| feature.vector_columns().iter().cloned())
            .collect();
        let references = declaration
            .columns()
            .into_iter()
            .map(|(owner, spec)| ColumnReference::from_spec(owner.into(), spec, &candidates))
            .collect::<ConfigResult<Vec<_>>>()?;

        for candidate in &candidates {
            if !references
                .iter()
                .any(|r| r.vector_column.as_deref() == Some(candidate.as_str()))
            {
                tracing::warn!(
                    "tsvector column {} matches no searched column of {}; expected <column>_vector",
                    candidate,
                    model
                );
            }
        }

        let (columns, joins) =
            self.resolve_columns(model, &table_name, &primary_key_expr, references)?;

        for column in unnormalized_vectors(&columns, &normalizer) {
            tracing::warn!(
                "precomputed tsvector for {} on {} is used as stored; ignoring accents only applies to the query",
                column,
                model
            );
        }

        let mut compiled_features = Vec::with_capacity(features.len());
        for (feature, only) in features {
            let indices = match only {
                Some(names) => self.only_indices(&table_name, &columns, &names)?,
                None => (0..columns.len()).collect(),
            };
            let selected: Vec<&ResolvedColumn> =
                indices.iter().filter_map(|&i| columns.get(i)).collect();
            if self.registry.get(feature.name())?.requires_text() {
                require_text(feature.name(), &selected)?;
            }
            feature.validate(&selected)?;
            compiled_features.push(CompiledFeature {
                feature,
                columns: indices,
            });
        }

        let rank = match &declaration.ranked_by {
            Some(expression) => {
                RankExpression::Custom(self.parse_ranked_by(expression, &compiled_features)?)
            }
            None => RankExpression::Combined(declaration.rank),
        };

        tracing::debug!(
            "Compiled search declaration for {}: {} columns, {} joins, features [{}]",
            model,
            columns.len(),
            joins.len(),
            compiled_features
                .iter()
                .map(|f| f.feature.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(CompiledConfiguration {
            model: model.to_string(),
            table_name,
            primary_key,
            primary_key_expr,
            columns,
            joins,
            features: compiled_features,
            normalizer,
            predicate_combination: declaration.predicate,
            rank,
            empty_query: self.config.empty_query,
            query_override: declaration.query.clone(),
            order_within_rank: declaration.order_within_rank.clone(),
        })
    }

    #[allow(clippy::type_complexity)]
    fn instantiate_features(
        &self,
        declaration: &SearchDeclaration,
    ) -> ConfigResult<Vec<(Arc<dyn Feature>, Option<Vec<String>>)>> {
        let default_spec = [FeatureSpec::new(DEFAULT_FEATURE)];
        let specs: &[FeatureSpec] = if declaration.using.is_empty() {
            &default_spec
        } else {
            &declaration.using
        };

        let mut seen = HashSet::new();
        let mut features = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigurationError::DuplicateFeature {
                    name: spec.name.clone(),
                });
            }
            let strategy = self.registry.get(&spec.name)?;
            let (only, options) = split_options(&spec.name, &spec.options)?;
            let feature = strategy.instantiate(&options, &self.config, self.quoter.as_ref())?;
            features.push((feature, only));
        }
        Ok(features)
    }

    /// Renders local columns and resolves each association once.
    fn resolve_columns(
        &self,
        model: &str,
        table_name: &str,
        primary_key_expr: &str,
        references: Vec<ColumnReference>,
    ) -> ConfigResult<(Vec<ResolvedColumn>, Vec<String>)> {
        let mut renderings: Vec<Option<ColumnRendering>> = vec![None; references.len()];
        let mut associations: Vec<(&str, Vec<usize>)> = Vec::new();

        for (i, reference) in references.iter().enumerate() {
            match &reference.owner {
                ColumnOwner::Model => {
                    renderings[i] = Some(self.render_local(table_name, reference)?);
                }
                ColumnOwner::Association(name) => {
                    match associations.iter_mut().find(|(n, _)| *n == name.as_str()) {
                        Some((_, indices)) => indices.push(i),
                        None => associations.push((name.as_str(), vec![i])),
                    }
                }
            }
        }

        let resolver = AssociationResolver::new(
            self.reflection.as_ref(),
            self.quoter.as_ref(),
            &self.config.alias_prefix,
        );
        let mut joins = Vec::with_capacity(associations.len());
        for (name, indices) in &associations {
            let columns = indices.iter().map(|&i| references[i].clone()).collect();
            let descriptor = resolver.resolve(model, name, primary_key_expr, columns)?;
            for (&i, rendering) in indices.iter().zip(descriptor.renderings()) {
                renderings[i] = Some(rendering.clone());
            }
            let join = descriptor.join_clause().to_string();
            if !joins.contains(&join) {
                joins.push(join);
            }
        }

        let columns = references
            .into_iter()
            .zip(renderings)
            .map(|(reference, rendering)| match rendering {
                Some(rendering) => Ok(ResolvedColumn {
                    reference,
                    rendering,
                }),
                None => Err(ConfigurationError::invalid(format!(
                    "column '{}' could not be resolved",
                    reference.name
                ))),
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok((columns, joins))
    }

    fn render_local(
        &self,
        table_name: &str,
        reference: &ColumnReference,
    ) -> ConfigResult<ColumnRendering> {
        let source = reference.source_column();
        if !self.reflection.has_column(table_name, &reference.name)
            || !self.reflection.has_column(table_name, source)
        {
            let missing: &str = if self.reflection.has_column(table_name, &reference.name) {
                source
            } else {
                &reference.name
            };
            return Err(ConfigurationError::UnknownColumn {
                table: table_name.to_string(),
                column: missing.to_string(),
            });
        }

        let qualified = self.quoter.qualified_column(table_name, source);
        Ok(if reference.vector_column.is_some() {
            ColumnRendering::Vector(qualified)
        } else {
            ColumnRendering::Text(format!("{}::text", qualified))
        })
    }

    fn only_indices(
        &self,
        table_name: &str,
        columns: &[ResolvedColumn],
        names: &[String],
    ) -> ConfigResult<Vec<usize>> {
        let mut indices = Vec::new();
        for name in names {
            let matched: Vec<usize> = columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.name() == name)
                .map(|(i, _)| i)
                .collect();
            if matched.is_empty() {
                return Err(ConfigurationError::UnknownColumn {
                    table: table_name.to_string(),
                    column: name.clone(),
                });
            }
            for i in matched {
                if !indices.contains(&i) {
                    indices.push(i);
                }
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Splits a `ranked_by` expression into SQL and `:feature` placeholders.
    fn parse_ranked_by(
        &self,
        expression: &str,
        features: &[CompiledFeature],
    ) -> ConfigResult<Vec<RankSegment>> {
        let mut segments = Vec::new();
        let mut last = 0;

        for captures in RANK_PLACEHOLDER.captures_iter(expression) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            // `::` is a cast, not a placeholder.
            if expression[..whole.start()].ends_with(':') {
                continue;
            }

            let name = name.as_str();
            let index = features
                .iter()
                .position(|f| f.feature.name() == name)
                .ok_or_else(|| {
                    if self.registry.contains(name) {
                        ConfigurationError::invalid(format!(
                            "ranked_by references :{} which is not in using",
                            name
                        ))
                    } else {
                        ConfigurationError::UnknownFeature {
                            name: name.to_string(),
                        }
                    }
                })?;

            if whole.start() > last {
                segments.push(RankSegment::Sql(expression[last..whole.start()].to_string()));
            }
            segments.push(RankSegment::Feature(index));
            last = whole.end();
        }
        if last < expression.len() {
            segments.push(RankSegment::Sql(expression[last..].to_string()));
        }

        if !segments.iter().any(|s| matches!(s, RankSegment::Feature(_))) {
            return Err(ConfigurationError::malformed(
                "ranked_by",
                "expression references no feature",
            ));
        }
        Ok(segments)
    }
}

/// Names of precomputed vector columns that normalization cannot reach.
fn unnormalized_vectors<'a>(columns: &'a [ResolvedColumn], normalizer: &Normalizer) -> Vec<&'a str> {
    if !normalizer.ignores(NormalizationRule::Accents) {
        return Vec::new();
    }
    columns
        .iter()
        .filter(|c| c.is_vector())
        .map(|c| c.name())
        .collect()
}

impl std::fmt::Debug for ConfigurationCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationCompiler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ColumnSpec;
    use crate::schema::{AssociationSchema, ModelSchema, StaticCatalog};
    use serde_json::json;

    #[test]
    fn test_unnormalized_vectors() {
        let columns = vec![
            ResolvedColumn {
                reference: ColumnReference::local("title"),
                rendering: ColumnRendering::Text("t".to_string()),
            },
            ResolvedColumn {
                reference: ColumnReference::local("content"),
                rendering: ColumnRendering::Vector("v".to_string()),
            },
        ];
        let accents = Normalizer::from_rules(&["accents"], &CompilerConfig::default()).unwrap();

        assert_eq!(unnormalized_vectors(&columns, &accents), vec!["content"]);
        assert!(unnormalized_vectors(&columns, &Normalizer::identity()).is_empty());
        assert!(unnormalized_vectors(&columns[..1], &accents).is_empty());
    }

    fn compiler() -> ConfigurationCompiler {
        let catalog = StaticCatalog::new()
            .with_model(
                "post",
                ModelSchema::new("posts")
                    .with_columns(["title", "content", "content_vector", "author_id"])
                    .with_association("author", AssociationSchema::belongs_to("user", "author_id"))
                    .with_association("comments", AssociationSchema::has_many("comment", "post_id")),
            )
            .with_model("user", ModelSchema::new("users").with_columns(["name"]))
            .with_model(
                "comment",
                ModelSchema::new("comments").with_columns(["body", "subject", "post_id"]),
            );
        ConfigurationCompiler::new(Arc::new(catalog))
    }

    #[test]
    fn test_local_columns_render_as_text() {
        let compiled = compiler()
            .compile_static("post", &SearchDeclaration::new().against(["title"]))
            .unwrap();
        assert_eq!(compiled.table_name(), "posts");
        assert_eq!(compiled.primary_key_expr(), "\"posts\".\"id\"");
        assert_eq!(
            compiled.columns()[0].text_sql(),
            Some("\"posts\".\"title\"::text")
        );
        assert_eq!(compiled.feature_names(), vec!["tsearch"]);
    }

    #[test]
    fn test_precomputed_local_column() {
        let declaration = SearchDeclaration::new().against([ColumnSpec::new("content").precomputed()]);
        let compiled = compiler().compile_static("post", &declaration).unwrap();
        assert!(compiled.columns()[0].is_vector());
        assert_eq!(
            compiled.columns()[0].rendering.sql(),
            "\"posts\".\"content_vector\""
        );
    }

    #[test]
    fn test_tsvector_column_option() {
        let declaration = SearchDeclaration::new()
            .against(["title", "content"])
            .using(FeatureSpec::with_options(
                "tsearch",
                json!({"tsvector_column": ["content_vector", "missing_vector"]}),
            ));
        let compiled = compiler().compile_static("post", &declaration).unwrap();
        assert!(!compiled.columns()[0].is_vector());
        assert!(compiled.columns()[1].is_vector());
    }

    #[test]
    fn test_missing_vector_column() {
        let declaration = SearchDeclaration::new().against([ColumnSpec::new("title").precomputed()]);
        let err = compiler().compile_static("post", &declaration).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownColumn {
                table: "posts".to_string(),
                column: "title_vector".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_feature() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .using("trigram")
            .using("trigram");
        let err = compiler().compile_static("post", &declaration).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateFeature { .. }));
    }

    #[test]
    fn test_trigram_rejects_vector_columns() {
        let declaration = SearchDeclaration::new()
            .against([ColumnSpec::new("content").precomputed()])
            .using("trigram");
        let err = compiler().compile_static("post", &declaration).unwrap_err();
        assert!(matches!(err, ConfigurationError::TextRequired { .. }));
    }

    #[test]
    fn test_only_restricts_columns() {
        let declaration = SearchDeclaration::new()
            .against(["title", "content"])
            .using("tsearch")
            .using(FeatureSpec::with_options("trigram", json!({"only": "title"})));
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("foo", 0);

        let (_, trigram) = fragment.predicate.split_once(") OR (").unwrap();
        assert!(trigram.contains("\"title\""));
        assert!(!trigram.contains("\"content\""));
    }

    #[test]
    fn test_only_unknown_column() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .using(FeatureSpec::with_options("tsearch", json!({"only": ["body"]})));
        let err = compiler().compile_static("post", &declaration).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownColumn { .. }));
    }

    #[test]
    fn test_predicates_and_ranks_combine() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .using("tsearch")
            .using("trigram");
        let compiled = compiler().compile_static("post", &declaration).unwrap();
        let fragment = compiled.fragment("foo", 0);
        assert!(fragment.predicate.contains(" @@ "));
        assert!(fragment.predicate.contains(") OR ("));
        assert!(fragment.rank.starts_with("(ts_rank("));
        assert!(fragment.rank.contains(") + (similarity("));

        let declaration = declaration
            .with_predicate(PredicateCombination::And)
            .with_rank(RankCombination::Max);
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("foo", 0);
        assert!(fragment.predicate.contains(") AND ("));
        assert!(fragment.rank.starts_with("GREATEST(ts_rank("));
    }

    #[test]
    fn test_placeholders_follow_offset() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .using("tsearch")
            .using("trigram");
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("foo bar", 3);
        assert!(fragment.predicate.contains("$4"));
        assert!(fragment.predicate.contains("$5"));
        assert!(fragment.predicate.contains("% $6"));
        assert_eq!(fragment.params.len(), 3);
        assert_eq!(fragment.params[2], SqlParam::text("foo bar"));
    }

    #[test]
    fn test_ranked_by() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .using("tsearch")
            .using("trigram")
            .ranked_by(":tsearch * 2 + :trigram::float8");
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("foo", 0);
        assert!(fragment.rank.starts_with("(ts_rank("));
        assert!(fragment.rank.contains(") * 2 + (similarity("));
        assert!(fragment.rank.ends_with(")::float8"));
    }

    #[test]
    fn test_ranked_by_errors() {
        let base = SearchDeclaration::new().against(["title"]).using("tsearch");

        let err = compiler()
            .compile_static("post", &base.clone().ranked_by(":soundex"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownFeature { .. }));

        let err = compiler()
            .compile_static("post", &base.clone().ranked_by(":trigram"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDeclaration { .. }));

        let err = compiler()
            .compile_static("post", &base.ranked_by("1::float8"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedOption { .. }));
    }

    #[test]
    fn test_query_override() {
        let declaration = SearchDeclaration::new().against(["title"]).with_query("  fixed ");
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("ignored", 0);
        assert_eq!(fragment.params, vec![SqlParam::text("fixed")]);
    }

    #[test]
    fn test_accents_wrap_document_and_query() {
        let declaration = SearchDeclaration::new().against(["title"]).ignoring("accents");
        let fragment = compiler()
            .compile_static("post", &declaration)
            .unwrap()
            .fragment("café", 0);
        assert!(fragment.predicate.contains("unaccent(coalesce(\"posts\".\"title\"::text, ''))"));
        assert!(fragment.predicate.contains("unaccent($1)"));
    }

    #[test]
    fn test_unknown_normalization() {
        let declaration = SearchDeclaration::new().against(["title"]).ignoring("case");
        let err = compiler().compile_static("post", &declaration).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownNormalization { .. }));
    }

    #[test]
    fn test_unsafe_aliases_are_rejected() {
        let catalog: Arc<dyn SchemaReflection> = Arc::new(StaticCatalog::new());
        let config = CompilerConfig {
            rank_alias: "rank; DROP".to_string(),
            ..Default::default()
        };
        let err = ConfigurationCompiler::with_parts(
            catalog,
            Arc::new(PostgresQuoter),
            FeatureRegistry::default(),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidDeclaration { .. }));
    }

    #[test]
    fn test_association_columns_share_join() {
        let declaration = SearchDeclaration::new()
            .against(["title"])
            .associated_against("comments", ["body", "subject"])
            .associated_against("author", ["name"]);
        let compiled = compiler().compile_static("post", &declaration).unwrap();
        assert_eq!(compiled.joins().len(), 2);
        assert_eq!(compiled.columns().len(), 4);
        assert!(compiled.joins()[0].contains("INNER JOIN \"comments\""));
        assert!(compiled.joins()[1].contains("INNER JOIN \"users\""));
    }
}
