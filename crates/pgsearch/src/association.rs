//! Association join synthesis.
//!
//! Columns on a related table are exposed through a derived table with one row
//! per parent primary key:
//!
//! ```text
//! LEFT OUTER JOIN (
//!     SELECT "posts"."id" AS id, string_agg(<related>."body"::text, ' ') AS <column alias>
//!     FROM "posts" INNER JOIN "comments" <related> ON <related>."post_id" = "posts"."id"
//!     GROUP BY "posts"."id"
//! ) <subselect alias> ON <subselect alias>.id = "posts"."id"
//! ```
//!
//! Single-valued associations skip the aggregate and the GROUP BY. The outer
//! join keeps parents without related rows; their search columns are NULL.

use crate::column::{ColumnRendering, ColumnReference};
use crate::error::{ConfigResult, ConfigurationError};
use crate::schema::{AssociationKind, AssociationReflection, Cardinality, SchemaReflection};
use crate::sql::{SqlQuoter, alias};

/// Purpose tag of association subselect aliases.
const SUBSELECT_PURPOSE: &str = "subselect";
/// Purpose tag of the related table alias inside a subselect.
const RELATED_PURPOSE: &str = "related";

/// A resolved association with its rendered join.
///
/// The join depends only on schema, so it is rendered once and reused for
/// every invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationDescriptor {
    reflection: AssociationReflection,
    columns: Vec<ColumnReference>,
    subselect_alias: String,
    renderings: Vec<ColumnRendering>,
    join: String,
}

impl AssociationDescriptor {
    /// Association name.
    pub fn name(&self) -> &str {
        &self.reflection.name
    }

    /// Related table name.
    pub fn table_name(&self) -> &str {
        &self.reflection.table_name
    }

    /// Cardinality from the declared association kind.
    pub fn cardinality(&self) -> Cardinality {
        self.reflection.cardinality()
    }

    /// Alias of the derived table.
    pub fn subselect_alias(&self) -> &str {
        &self.subselect_alias
    }

    /// The `LEFT OUTER JOIN` clause.
    pub fn join_clause(&self) -> &str {
        &self.join
    }

    /// Exposed columns in declaration order.
    pub fn columns(&self) -> &[ColumnReference] {
        &self.columns
    }

    /// Outer-query renderings, parallel to [`columns`](Self::columns).
    pub fn renderings(&self) -> &[ColumnRendering] {
        &self.renderings
    }
}

/// Turns association columns into a joinable derived table.
pub struct AssociationResolver<'a> {
    reflection: &'a dyn SchemaReflection,
    quoter: &'a dyn SqlQuoter,
    alias_prefix: &'a str,
}

impl<'a> AssociationResolver<'a> {
    /// Creates a resolver.
    pub fn new(
        reflection: &'a dyn SchemaReflection,
        quoter: &'a dyn SqlQuoter,
        alias_prefix: &'a str,
    ) -> Self {
        Self {
            reflection,
            quoter,
            alias_prefix,
        }
    }

    /// Derives the subselect alias for an association.
    pub fn subselect_alias(&self, table_name: &str, association: &str) -> String {
        alias(self.alias_prefix, [table_name, association, SUBSELECT_PURPOSE])
    }

    /// Resolves `association` on `model` and renders its join.
    ///
    /// `primary_key_expr` is the parent's qualified primary key in the outer
    /// query. Every column must exist on the related table, including its
    /// precomputed vector column when one is configured.
    pub fn resolve(
        &self,
        model: &str,
        association: &str,
        primary_key_expr: &str,
        columns: Vec<ColumnReference>,
    ) -> ConfigResult<AssociationDescriptor> {
        let reflection = self.reflection.association(model, association)?;
        let parent_table = self.reflection.table_name(model)?;
        let parent_primary_key = self.reflection.primary_key(model)?;

        let foreign_key_table = match reflection.kind {
            AssociationKind::BelongsTo => &parent_table,
            AssociationKind::HasOne | AssociationKind::HasMany => &reflection.table_name,
        };
        if !self
            .reflection
            .has_column(foreign_key_table, &reflection.foreign_key)
        {
            return Err(ConfigurationError::UnknownColumn {
                table: foreign_key_table.clone(),
                column: reflection.foreign_key.clone(),
            });
        }

        for column in &columns {
            self.check_column(&reflection.table_name, &column.name)?;
            if let Some(vector) = &column.vector_column {
                self.check_column(&reflection.table_name, vector)?;
            }
        }

        let subselect_alias = self.subselect_alias(&reflection.table_name, association);
        let related_alias = alias(
            self.alias_prefix,
            [&reflection.table_name, association, RELATED_PURPOSE],
        );

        let parent_pk = self
            .quoter
            .qualified_column(&parent_table, &parent_primary_key);
        let on = self.association_condition(&reflection, &related_alias, &parent_table, &parent_pk);

        let mut selects = vec![format!("{} AS id", parent_pk)];
        let mut renderings = Vec::with_capacity(columns.len());
        for column in &columns {
            let source = column.source_column();
            let column_alias = alias(self.alias_prefix, [subselect_alias.as_str(), source]);
            let qualified = format!("{}.{}", related_alias, self.quoter.quote_identifier(source));

            let expr = match (reflection.cardinality(), column.vector_column.is_some()) {
                (Cardinality::Single, false) => format!("{}::text", qualified),
                (Cardinality::Single, true) => format!("{}::tsvector", qualified),
                (Cardinality::Multiple, false) => format!("string_agg({}::text, ' ')", qualified),
                (Cardinality::Multiple, true) => {
                    format!("string_agg({}::text, ' ')::tsvector", qualified)
                }
            };
            let item = format!("{} AS {}", expr, column_alias);
            // A column declared twice is exposed once.
            if !selects.contains(&item) {
                selects.push(item);
            }

            let outer = format!("{}.{}", subselect_alias, column_alias);
            renderings.push(if column.vector_column.is_some() {
                ColumnRendering::Vector(outer)
            } else {
                ColumnRendering::Text(outer)
            });
        }

        let mut subselect = format!(
            "SELECT {} FROM {} INNER JOIN {} {} ON {}",
            selects.join(", "),
            self.quoter.quote_table_name(&parent_table),
            self.quoter.quote_table_name(&reflection.table_name),
            related_alias,
            on
        );
        if reflection.cardinality() == Cardinality::Multiple {
            subselect.push_str(&format!(" GROUP BY {}", parent_pk));
        }

        let join = format!(
            "LEFT OUTER JOIN ({}) {} ON {}.id = {}",
            subselect, subselect_alias, subselect_alias, primary_key_expr
        );

        Ok(AssociationDescriptor {
            reflection,
            columns,
            subselect_alias,
            renderings,
            join,
        })
    }

    fn check_column(&self, table: &str, column: &str) -> ConfigResult<()> {
        if self.reflection.has_column(table, column) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    fn association_condition(
        &self,
        reflection: &AssociationReflection,
        related_alias: &str,
        parent_table: &str,
        parent_pk: &str,
    ) -> String {
        let q = self.quoter;
        match reflection.kind {
            AssociationKind::BelongsTo => format!(
                "{}.{} = {}",
                related_alias,
                q.quote_identifier(&reflection.primary_key),
                q.qualified_column(parent_table, &reflection.foreign_key)
            ),
            AssociationKind::HasOne | AssociationKind::HasMany => format!(
                "{}.{} = {}",
                related_alias,
                q.quote_identifier(&reflection.foreign_key),
                parent_pk
            ),
        }
    }
}
