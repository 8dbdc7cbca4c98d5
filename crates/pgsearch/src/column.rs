//! Column references and their SQL renderings.

use crate::declaration::{ColumnSpec, DeclaredOwner};
use crate::error::{ConfigResult, ConfigurationError};

/// Suffix of precomputed tsvector columns: `content` is precomputed in `content_vector`.
pub const VECTOR_COLUMN_SUFFIX: &str = "_vector";

/// Where a column lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnOwner {
    /// The searched model's own table.
    Model,
    /// The table behind a named association.
    Association(String),
}

impl From<DeclaredOwner<'_>> for ColumnOwner {
    fn from(owner: DeclaredOwner<'_>) -> Self {
        match owner {
            DeclaredOwner::Model => ColumnOwner::Model,
            DeclaredOwner::Association(name) => ColumnOwner::Association(name.to_string()),
        }
    }
}

/// One searchable column, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReference {
    /// Owning table.
    pub owner: ColumnOwner,
    /// Column name.
    pub name: String,
    /// Ranking weight, always finite and positive when present.
    pub weight: Option<f64>,
    /// Precomputed tsvector column read instead of `name`.
    pub vector_column: Option<String>,
}

impl ColumnReference {
    /// A local, unweighted text column.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            owner: ColumnOwner::Model,
            name: name.into(),
            weight: None,
            vector_column: None,
        }
    }

    /// Builds a reference from a declared column.
    ///
    /// `vector_candidates` are precomputed column names offered by feature
    /// options; one applies only if it equals `<column>_vector` exactly.
    pub fn from_spec(
        owner: ColumnOwner,
        spec: &ColumnSpec,
        vector_candidates: &[String],
    ) -> ConfigResult<Self> {
        if spec.column.is_empty() {
            return Err(ConfigurationError::invalid("column name must not be empty"));
        }

        if let Some(weight) = spec.weight {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(ConfigurationError::malformed(
                    "against",
                    format!(
                        "weight of column '{}' must be a positive number, got {}",
                        spec.column, weight
                    ),
                ));
            }
        }

        let conventional = vector_column_for(&spec.column);
        let vector_column = match (&spec.vector_column, spec.precomputed) {
            (Some(explicit), _) => Some(explicit.clone()),
            (None, true) => Some(conventional),
            (None, false) => vector_candidates
                .iter()
                .find(|candidate| **candidate == conventional)
                .cloned(),
        };

        Ok(Self {
            owner,
            name: spec.column.clone(),
            weight: spec.weight,
            vector_column,
        })
    }

    /// The association this column is reached through, if any.
    pub fn association(&self) -> Option<&str> {
        match &self.owner {
            ColumnOwner::Model => None,
            ColumnOwner::Association(name) => Some(name),
        }
    }

    /// Name of the column actually read: the vector column when precomputed.
    pub fn source_column(&self) -> &str {
        self.vector_column.as_deref().unwrap_or(&self.name)
    }
}

/// Conventional precomputed-vector column name for `column`.
pub fn vector_column_for(column: &str) -> String {
    format!("{}{}", column, VECTOR_COLUMN_SUFFIX)
}

/// How a resolved column appears in the outer query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRendering {
    /// A text-typed expression.
    Text(String),
    /// A tsvector-typed expression.
    Vector(String),
}

impl ColumnRendering {
    /// The SQL expression.
    pub fn sql(&self) -> &str {
        match self {
            ColumnRendering::Text(sql) | ColumnRendering::Vector(sql) => sql,
        }
    }
}

/// A column reference together with its authoritative SQL rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumn {
    /// The reference.
    pub reference: ColumnReference,
    /// Its rendering in the outer query.
    pub rendering: ColumnRendering,
}

impl ResolvedColumn {
    /// The text expression, or `None` for precomputed vectors.
    pub fn text_sql(&self) -> Option<&str> {
        match &self.rendering {
            ColumnRendering::Text(sql) => Some(sql),
            ColumnRendering::Vector(_) => None,
        }
    }

    /// Returns true if the column renders as a precomputed vector.
    pub fn is_vector(&self) -> bool {
        matches!(self.rendering, ColumnRendering::Vector(_))
    }

    /// Column name as declared.
    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Declared weight.
    pub fn weight(&self) -> Option<f64> {
        self.reference.weight
    }
}
