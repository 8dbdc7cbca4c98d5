//! Search declarations.
//!
//! A [`SearchDeclaration`] names the columns to search (`against`), the
//! features to search with (`using`), and text normalization (`ignoring`). It
//! can be built in code or deserialized from JSON:
//!
//! ```
//! use helios_pgsearch::declaration::SearchDeclaration;
//!
//! let declaration: SearchDeclaration = serde_json::from_str(r#"{
//!     "against": ["title", {"column": "content", "weight": 0.5}, {"comments": ["body"]}],
//!     "using": ["tsearch", {"trigram": {"threshold": 0.2}}],
//!     "ignoring": ["accents"]
//! }"#).unwrap();
//!
//! assert_eq!(declaration.columns().len(), 3);
//! assert_eq!(declaration.feature_names(), vec!["tsearch", "trigram"]);
//! ```
//!
//! A [`Declaration`] wraps either a fixed declaration or a function that builds
//! one from the arguments of each call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ConfigResult;

/// Feature used when a declaration lists none.
pub const DEFAULT_FEATURE: &str = "tsearch";

/// How feature predicates are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredicateCombination {
    /// A row matches if any feature matches.
    #[default]
    Or,
    /// A row matches only if every feature matches.
    And,
}

impl PredicateCombination {
    /// The SQL operator for this combination.
    pub fn operator(&self) -> &'static str {
        match self {
            PredicateCombination::Or => "OR",
            PredicateCombination::And => "AND",
        }
    }
}

/// How feature ranks are combined when no `ranked_by` expression is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankCombination {
    /// Feature scores add up.
    #[default]
    Sum,
    /// The best feature score wins.
    Max,
}

/// One searched column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawColumnSpec")]
pub struct ColumnSpec {
    /// Column name on the owning table.
    pub column: String,
    /// Ranking weight; absent means uniform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Use the `<column>_vector` precomputed tsvector column.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub precomputed: bool,
    /// Explicit precomputed tsvector column; overrides `precomputed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_column: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumnSpec {
    Name(String),
    Detailed(DetailedColumnSpec),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedColumnSpec {
    column: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    precomputed: bool,
    #[serde(default)]
    vector_column: Option<String>,
}

impl From<RawColumnSpec> for ColumnSpec {
    fn from(raw: RawColumnSpec) -> Self {
        match raw {
            RawColumnSpec::Name(column) => ColumnSpec::new(column),
            RawColumnSpec::Detailed(detailed) => ColumnSpec {
                column: detailed.column,
                weight: detailed.weight,
                precomputed: detailed.precomputed,
                vector_column: detailed.vector_column,
            },
        }
    }
}

impl ColumnSpec {
    /// A plain, unweighted column.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            weight: None,
            precomputed: false,
            vector_column: None,
        }
    }

    /// Sets the ranking weight.
    pub fn weighted(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Reads the precomputed `<column>_vector` column instead of the raw text.
    pub fn precomputed(mut self) -> Self {
        self.precomputed = true;
        self
    }

    /// Reads an explicitly named precomputed vector column.
    pub fn with_vector_column(mut self, vector_column: impl Into<String>) -> Self {
        self.vector_column = Some(vector_column.into());
        self
    }
}

impl From<&str> for ColumnSpec {
    fn from(column: &str) -> Self {
        ColumnSpec::new(column)
    }
}

impl From<String> for ColumnSpec {
    fn from(column: String) -> Self {
        ColumnSpec::new(column)
    }
}

/// Columns of one association, written as a single spec or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSet {
    /// A list of columns.
    Many(Vec<ColumnSpec>),
    /// A single column.
    One(ColumnSpec),
}

impl ColumnSet {
    /// The columns in declaration order.
    pub fn specs(&self) -> &[ColumnSpec] {
        match self {
            ColumnSet::Many(specs) => specs,
            ColumnSet::One(spec) => std::slice::from_ref(spec),
        }
    }
}

/// One entry of `against`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgainstEntry {
    /// A column of the searched model.
    Column(ColumnSpec),
    /// Columns reached through associations, keyed by association name.
    ///
    /// Associations keep the order in which they were written.
    Association(#[serde(with = "ordered_associations")] Vec<(String, ColumnSet)>),
}

/// An association-name map read and written as a JSON object in entry order.
mod ordered_associations {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::ColumnSet;

    pub fn serialize<S>(entries: &[(String, ColumnSet)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (name, set) in entries {
            map.serialize_entry(name, set)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, ColumnSet)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, ColumnSet)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from association name to columns")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, ColumnSet>()? {
                    entries.push(entry);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Where a declared column lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredOwner<'a> {
    /// The searched model.
    Model,
    /// A named association.
    Association(&'a str),
}

/// One entry of `using`: a feature name and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureSpec", into = "RawFeatureSpec")]
pub struct FeatureSpec {
    /// Registered strategy name.
    pub name: String,
    /// Strategy-specific options; `Null` when none were given.
    pub options: Value,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawFeatureSpec {
    Name(String),
    WithOptions(BTreeMap<String, Value>),
}

impl TryFrom<RawFeatureSpec> for FeatureSpec {
    type Error = String;

    fn try_from(raw: RawFeatureSpec) -> Result<Self, Self::Error> {
        match raw {
            RawFeatureSpec::Name(name) => Ok(FeatureSpec::new(name)),
            RawFeatureSpec::WithOptions(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "feature entry must name exactly one feature, found {}",
                        map.len()
                    ));
                }
                let (name, options) = map.into_iter().next().ok_or("empty feature entry")?;
                Ok(FeatureSpec { name, options })
            }
        }
    }
}

impl From<FeatureSpec> for RawFeatureSpec {
    fn from(spec: FeatureSpec) -> Self {
        if spec.options.is_null() {
            RawFeatureSpec::Name(spec.name)
        } else {
            RawFeatureSpec::WithOptions(BTreeMap::from([(spec.name, spec.options)]))
        }
    }
}

impl FeatureSpec {
    /// A feature with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
        }
    }

    /// A feature with explicit options.
    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

impl From<&str> for FeatureSpec {
    fn from(name: &str) -> Self {
        FeatureSpec::new(name)
    }
}

/// A complete search declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchDeclaration {
    /// Columns to search.
    #[serde(default, deserialize_with = "one_or_many")]
    pub against: Vec<AgainstEntry>,

    /// Features to search with; empty means `tsearch`.
    #[serde(default, deserialize_with = "one_or_many")]
    pub using: Vec<FeatureSpec>,

    /// Normalization rules applied to documents and query.
    #[serde(default, deserialize_with = "one_or_many")]
    pub ignoring: Vec<String>,

    /// Custom rank expression with `:feature` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranked_by: Option<String>,

    /// Predicate combination across features.
    #[serde(default)]
    pub predicate: PredicateCombination,

    /// Rank combination across features.
    #[serde(default)]
    pub rank: RankCombination,

    /// Tie-breaking ORDER BY clause for rows of equal rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_within_rank: Option<String>,

    /// Query text that replaces the invocation query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

impl SearchDeclaration {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds columns of the searched model.
    pub fn against<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnSpec>,
    {
        self.against
            .extend(columns.into_iter().map(|c| AgainstEntry::Column(c.into())));
        self
    }

    /// Adds columns reached through an association.
    pub fn associated_against<I, C>(mut self, association: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnSpec>,
    {
        let specs = columns.into_iter().map(Into::into).collect();
        self.against.push(AgainstEntry::Association(vec![(
            association.into(),
            ColumnSet::Many(specs),
        )]));
        self
    }

    /// Adds a feature.
    pub fn using(mut self, feature: impl Into<FeatureSpec>) -> Self {
        self.using.push(feature.into());
        self
    }

    /// Adds a normalization rule.
    pub fn ignoring(mut self, rule: impl Into<String>) -> Self {
        self.ignoring.push(rule.into());
        self
    }

    /// Sets a custom rank expression.
    pub fn ranked_by(mut self, expression: impl Into<String>) -> Self {
        self.ranked_by = Some(expression.into());
        self
    }

    /// Sets the predicate combination.
    pub fn with_predicate(mut self, combination: PredicateCombination) -> Self {
        self.predicate = combination;
        self
    }

    /// Sets the rank combination.
    pub fn with_rank(mut self, combination: RankCombination) -> Self {
        self.rank = combination;
        self
    }

    /// Sets the tie-breaking order.
    pub fn order_within_rank(mut self, order: impl Into<String>) -> Self {
        self.order_within_rank = Some(order.into());
        self
    }

    /// Overrides the invocation query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// All declared columns with their owners, in declaration order.
    pub fn columns(&self) -> Vec<(DeclaredOwner<'_>, &ColumnSpec)> {
        let mut columns = Vec::new();
        for entry in &self.against {
            match entry {
                AgainstEntry::Column(spec) => columns.push((DeclaredOwner::Model, spec)),
                AgainstEntry::Association(entries) => {
                    for (association, set) in entries {
                        for spec in set.specs() {
                            columns.push((DeclaredOwner::Association(association.as_str()), spec));
                        }
                    }
                }
            }
        }
        columns
    }

    /// Feature names in declaration order, defaulting to `tsearch`.
    pub fn feature_names(&self) -> Vec<&str> {
        if self.using.is_empty() {
            vec![DEFAULT_FEATURE]
        } else {
            self.using.iter().map(|f| f.name.as_str()).collect()
        }
    }
}

/// Arguments of one scope invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvocationArgs {
    /// The raw query text.
    pub query: String,
    /// Extra positional arguments for dynamic declarations.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl InvocationArgs {
    /// Arguments carrying only a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
        }
    }

    /// Appends a positional argument.
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Positional argument at `index` read as a boolean; missing or non-boolean is `false`.
    pub fn flag(&self, index: usize) -> bool {
        self.arg(index).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Builds a declaration from the arguments of one call.
pub type DynamicDeclarationFn =
    dyn Fn(&InvocationArgs) -> ConfigResult<SearchDeclaration> + Send + Sync;

/// A fixed declaration or one computed per call.
#[derive(Clone)]
pub enum Declaration {
    /// Compiled once; joins and features are reused by every call.
    Static(SearchDeclaration),
    /// Recompiled from scratch on every call.
    Dynamic(Arc<DynamicDeclarationFn>),
}

impl Declaration {
    /// Wraps a per-call declaration builder.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&InvocationArgs) -> ConfigResult<SearchDeclaration> + Send + Sync + 'static,
    {
        Declaration::Dynamic(Arc::new(f))
    }

    /// Returns true for per-call declarations.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Declaration::Dynamic(_))
    }
}

impl From<SearchDeclaration> for Declaration {
    fn from(declaration: SearchDeclaration) -> Self {
        Declaration::Static(declaration)
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Static(declaration) => {
                f.debug_tuple("Static").field(declaration).finish()
            }
            Declaration::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}
