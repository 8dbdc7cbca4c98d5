//! Helios PostgreSQL Search Scopes
//!
//! This crate compiles declarative full-text search definitions into SQL for
//! PostgreSQL. A declaration names the columns to search, local or reached
//! through associations, and the search features to use. Compiling it yields
//! join clauses, a predicate, and a rank expression that attach to a base query.
//!
//! # Features
//!
//! - **Full text search** (`tsearch`): `tsvector @@ tsquery` with prefix
//!   matching, negation, column weights, and `ts_headline` highlights
//! - **Trigram similarity** (`trigram`): `pg_trgm` similarity and word similarity
//! - **Phonetic matching** (`dmetaphone`): Double Metaphone codes from `fuzzystrmatch`
//! - **Associations**: columns of related tables are aggregated into one
//!   derived table per association
//! - **Dynamic declarations**: declarations computed from each call's arguments
//!
//! User query text is always bound as a `$N` parameter and never interpolated.
//!
//! # Crate Features
//!
//! - `postgres` - executes scopes through a `deadpool-postgres` pool
//!
//! # Architecture
//!
//! - [`schema`] - Schema reflection: tables, primary keys, associations
//! - [`declaration`] - Search declarations and invocation arguments
//! - [`column`] - Column references and their SQL renderings
//! - [`association`] - Association join synthesis
//! - [`features`] - Search feature strategies and their registry
//! - [`compiler`] - Declaration compilation and fragment rendering
//! - [`scope`] - Named scopes producing complete ranked queries
//! - [`sql`] - Parameter binding, quoting, and alias derivation
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use helios_pgsearch::{ConfigurationCompiler, InvocationArgs, SearchDeclaration, SearchScope};
//! use helios_pgsearch::schema::{AssociationSchema, ModelSchema, StaticCatalog};
//!
//! let catalog = StaticCatalog::new()
//!     .with_model("post", ModelSchema::new("posts")
//!         .with_columns(["title", "content"])
//!         .with_association("comments", AssociationSchema::has_many("comment", "post_id")))
//!     .with_model("comment", ModelSchema::new("comments").with_columns(["body", "post_id"]));
//! let compiler = Arc::new(ConfigurationCompiler::new(Arc::new(catalog)));
//!
//! let declaration = SearchDeclaration::new()
//!     .against(["title", "content"])
//!     .associated_against("comments", ["body"])
//!     .using("tsearch")
//!     .using("trigram");
//! let scope = SearchScope::new("search_posts", "post", declaration, compiler).unwrap();
//!
//! let query = scope.invoke(&InvocationArgs::new("rust borrow")).unwrap();
//! assert!(query.sql.contains("LEFT OUTER JOIN"));
//! assert!(query.sql.contains("ORDER BY pg_search_rank DESC"));
//! assert_eq!(query.params.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod association;
pub mod column;
pub mod compiler;
pub mod config;
pub mod declaration;
pub mod error;
#[cfg(feature = "postgres")]
pub mod executor;
pub mod features;
pub mod normalize;
pub mod schema;
pub mod scope;
pub mod sql;

// Re-export commonly used types at crate root
pub use compiler::{CompiledConfiguration, CompiledQueryFragment, ConfigurationCompiler};
pub use config::{CompilerConfig, EmptyQueryPolicy};
pub use declaration::{Declaration, InvocationArgs, SearchDeclaration};
pub use error::{ConfigResult, ConfigurationError, SearchError, SearchResult};
pub use scope::{ScopeRegistry, ScopedQuery, SearchScope};
pub use sql::SqlParam;

#[cfg(feature = "postgres")]
pub use executor::{PostgresConfig, PostgresSearchExecutor, SearchExecutor};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
