//! Shared fixtures for the integration tests.
//!
//! The schema is a small blog: posts with a precomputed `content_vector`, an
//! author (`belongs_to`), and comments (`has_many`).

#![allow(dead_code)]

use std::sync::Arc;

use helios_pgsearch::schema::{AssociationSchema, ModelSchema, StaticCatalog};
use helios_pgsearch::{CompilerConfig, ConfigurationCompiler};

/// Table names of one blog schema instance.
#[derive(Debug, Clone)]
pub struct BlogTables {
    pub posts: String,
    pub users: String,
    pub comments: String,
}

impl BlogTables {
    /// The unsuffixed table names.
    pub fn plain() -> Self {
        Self::with_suffix("")
    }

    /// Table names ending in `suffix`, for tests sharing one database.
    pub fn with_suffix(suffix: &str) -> Self {
        Self {
            posts: format!("posts{}", suffix),
            users: format!("users{}", suffix),
            comments: format!("comments{}", suffix),
        }
    }

    /// The catalog describing these tables.
    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new()
            .with_model(
                "post",
                ModelSchema::new(&self.posts)
                    .with_columns(["title", "content", "content_vector", "author_id"])
                    .with_association("author", AssociationSchema::belongs_to("user", "author_id"))
                    .with_association("comments", AssociationSchema::has_many("comment", "post_id")),
            )
            .with_model("user", ModelSchema::new(&self.users).with_columns(["name"]))
            .with_model(
                "comment",
                ModelSchema::new(&self.comments).with_columns(["body", "post_id"]),
            )
    }

    /// A compiler over these tables with default settings.
    pub fn compiler(&self) -> Arc<ConfigurationCompiler> {
        Arc::new(ConfigurationCompiler::new(Arc::new(self.catalog())))
    }

    /// A compiler over these tables with custom settings.
    pub fn compiler_with(&self, config: CompilerConfig) -> Arc<ConfigurationCompiler> {
        Arc::new(
            ConfigurationCompiler::with_parts(
                Arc::new(self.catalog()),
                Arc::new(helios_pgsearch::sql::PostgresQuoter),
                helios_pgsearch::features::FeatureRegistry::default(),
                config,
            )
            .expect("default aliases are valid"),
        )
    }

    /// DDL creating these tables.
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE {users} (id SERIAL PRIMARY KEY, name TEXT);
             CREATE TABLE {posts} (
                 id SERIAL PRIMARY KEY,
                 title TEXT,
                 content TEXT,
                 content_vector TSVECTOR,
                 author_id INTEGER REFERENCES {users}(id)
             );
             CREATE TABLE {comments} (
                 id SERIAL PRIMARY KEY,
                 post_id INTEGER REFERENCES {posts}(id),
                 body TEXT
             );",
            users = self.users,
            posts = self.posts,
            comments = self.comments,
        )
    }
}
