//! In-memory schema catalog.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigResult, ConfigurationError};

use super::{AssociationKind, AssociationReflection, SchemaReflection};

/// An association as declared on a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationSchema {
    /// Name of the related model.
    pub model: String,
    /// Declared kind.
    pub kind: AssociationKind,
    /// Foreign key column.
    pub foreign_key: String,
}

impl AssociationSchema {
    /// A `belongs_to` association whose foreign key lives on the parent.
    pub fn belongs_to(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kind: AssociationKind::BelongsTo,
            foreign_key: foreign_key.into(),
        }
    }

    /// A `has_one` association whose foreign key lives on the related table.
    pub fn has_one(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kind: AssociationKind::HasOne,
            foreign_key: foreign_key.into(),
        }
    }

    /// A `has_many` association whose foreign key lives on the related table.
    pub fn has_many(model: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kind: AssociationKind::HasMany,
            foreign_key: foreign_key.into(),
        }
    }
}

/// One model: its table, key, columns, and associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Table name, optionally schema-qualified.
    pub table: String,
    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// All columns of the table, including the primary key.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Associations by name.
    #[serde(default)]
    pub associations: BTreeMap<String, AssociationSchema>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ModelSchema {
    /// Creates a model stored in `table` with primary key `id`.
    pub fn new(table: impl Into<String>) -> Self {
        let primary_key = default_primary_key();
        Self {
            table: table.into(),
            columns: vec![primary_key.clone()],
            primary_key,
            associations: BTreeMap::new(),
        }
    }

    /// Adds columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    /// Adds an association.
    pub fn with_association(mut self, name: impl Into<String>, schema: AssociationSchema) -> Self {
        self.associations.insert(name.into(), schema);
        self
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// A [`SchemaReflection`] backed by a fixed set of model definitions.
///
/// ```
/// use helios_pgsearch::schema::{
///     AssociationSchema, ModelSchema, SchemaReflection, StaticCatalog,
/// };
///
/// let catalog = StaticCatalog::new()
///     .with_model("post", ModelSchema::new("posts")
///         .with_columns(["title", "author_id"])
///         .with_association("author", AssociationSchema::belongs_to("user", "author_id")))
///     .with_model("user", ModelSchema::new("users").with_columns(["name"]));
///
/// let author = catalog.association("post", "author").unwrap();
/// assert_eq!(author.table_name, "users");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCatalog {
    /// Models by name.
    #[serde(default)]
    pub models: BTreeMap<String, ModelSchema>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model.
    pub fn with_model(mut self, name: impl Into<String>, model: ModelSchema) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    fn model(&self, model: &str) -> ConfigResult<&ModelSchema> {
        self.models
            .get(model)
            .ok_or_else(|| ConfigurationError::UnknownModel {
                model: model.to_string(),
            })
    }
}

impl SchemaReflection for StaticCatalog {
    fn table_name(&self, model: &str) -> ConfigResult<String> {
        Ok(self.model(model)?.table.clone())
    }

    fn primary_key(&self, model: &str) -> ConfigResult<String> {
        Ok(self.model(model)?.primary_key.clone())
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.models
            .values()
            .filter(|m| m.table == table)
            .any(|m| m.has_column(column))
    }

    fn association(&self, model: &str, name: &str) -> ConfigResult<AssociationReflection> {
        let parent = self.model(model)?;
        let declared =
            parent
                .associations
                .get(name)
                .ok_or_else(|| ConfigurationError::UnknownAssociation {
                    model: model.to_string(),
                    association: name.to_string(),
                })?;

        // A dangling target is reported against the association, not as a missing model.
        let related = self.models.get(&declared.model).ok_or_else(|| {
            ConfigurationError::UnknownAssociation {
                model: model.to_string(),
                association: name.to_string(),
            }
        })?;

        Ok(AssociationReflection {
            name: name.to_string(),
            table_name: related.table.clone(),
            primary_key: related.primary_key.clone(),
            foreign_key: declared.foreign_key.clone(),
            kind: declared.kind,
        })
    }
}
