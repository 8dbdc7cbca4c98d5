//! Schema reflection.
//!
//! The compiler never inspects the database itself. It asks a
//! [`SchemaReflection`] implementation which table a model lives in, what its
//! primary key is, and where its associations point. [`StaticCatalog`] is an
//! in-memory implementation that can be built in code or loaded from JSON.

mod catalog;

pub use catalog::{AssociationSchema, ModelSchema, StaticCatalog};

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;

/// The declared kind of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// The parent row holds a foreign key to one related row.
    BelongsTo,
    /// One related row holds a foreign key to the parent.
    HasOne,
    /// Any number of related rows hold a foreign key to the parent.
    HasMany,
}

/// How many related rows a parent row can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one related row.
    Single,
    /// Zero or more related rows.
    Multiple,
}

impl AssociationKind {
    /// Returns the cardinality implied by this kind.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            AssociationKind::BelongsTo | AssociationKind::HasOne => Cardinality::Single,
            AssociationKind::HasMany => Cardinality::Multiple,
        }
    }
}

/// A resolved association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationReflection {
    /// Association name as declared on the parent model.
    pub name: String,
    /// Table of the related model.
    pub table_name: String,
    /// Primary key column of the related table.
    pub primary_key: String,
    /// Foreign key column; on the parent for `BelongsTo`, on the related table otherwise.
    pub foreign_key: String,
    /// Declared kind.
    pub kind: AssociationKind,
}

impl AssociationReflection {
    /// Returns the cardinality of this association.
    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }
}

/// Answers schema questions for the compiler.
///
/// Lookups for unknown models or associations return a configuration error.
pub trait SchemaReflection: Send + Sync {
    /// Table name of a model.
    fn table_name(&self, model: &str) -> ConfigResult<String>;

    /// Primary key column of a model.
    fn primary_key(&self, model: &str) -> ConfigResult<String>;

    /// Returns true if the table has the column.
    fn has_column(&self, table: &str, column: &str) -> bool;

    /// Resolves a named association of a model.
    fn association(&self, model: &str, name: &str) -> ConfigResult<AssociationReflection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_from_kind() {
        assert_eq!(AssociationKind::BelongsTo.cardinality(), Cardinality::Single);
        assert_eq!(AssociationKind::HasOne.cardinality(), Cardinality::Single);
        assert_eq!(AssociationKind::HasMany.cardinality(), Cardinality::Multiple);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&AssociationKind::HasMany).unwrap();
        assert_eq!(json, "\"has_many\"");
        let kind: AssociationKind = serde_json::from_str("\"belongs_to\"").unwrap();
        assert_eq!(kind, AssociationKind::BelongsTo);
    }
}
