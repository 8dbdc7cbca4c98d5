//! PostgreSQL execution of search scopes.
//!
//! Compiled SQL needs the `pg_trgm`, `fuzzystrmatch`, and `unaccent`
//! extensions for the `trigram`, `dmetaphone`, and `ignoring: accents`
//! features; [`PostgresSearchExecutor::ensure_extensions`] creates them.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime, SslMode};
use postgres_types::ToSql;
use serde::{Deserialize, Serialize};
use tokio_postgres::{NoTls, Row};

use crate::declaration::InvocationArgs;
use crate::error::{ExecutionError, SearchResult};
use crate::scope::SearchScope;
use crate::sql::SqlParam;

/// Extensions used by the built-in features.
pub const REQUIRED_EXTENSIONS: [&str; 3] = ["pg_trgm", "fuzzystrmatch", "unaccent"];

/// Configuration for the PostgreSQL connection pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// PostgreSQL host.
    #[serde(default = "default_host")]
    pub host: String,

    /// PostgreSQL port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// Database user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password.
    #[serde(default)]
    pub password: Option<String>,

    /// SSL mode.
    #[serde(default)]
    pub ssl_mode: PostgresSslMode,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

/// SSL mode for PostgreSQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostgresSslMode {
    /// Disable SSL.
    Disable,
    /// Prefer SSL, but allow non-SSL.
    #[default]
    Prefer,
    /// Require SSL.
    Require,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "pgsearch".to_string()
}

fn default_user() -> String {
    "pgsearch".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_statement_timeout_ms() -> u64 {
    30000
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: None,
            ssl_mode: PostgresSslMode::default(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

impl PostgresConfig {
    /// Reads the configuration from `PGSEARCH_PG_*` environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PGSEARCH_PG_HOST` | `localhost` |
    /// | `PGSEARCH_PG_PORT` | `5432` |
    /// | `PGSEARCH_PG_DBNAME` | `pgsearch` |
    /// | `PGSEARCH_PG_USER` | `pgsearch` |
    /// | `PGSEARCH_PG_PASSWORD` | none |
    /// | `PGSEARCH_PG_SSL_MODE` | `prefer` |
    /// | `PGSEARCH_PG_MAX_CONNECTIONS` | `10` |
    /// | `PGSEARCH_PG_STATEMENT_TIMEOUT_MS` | `30000` |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.parse().ok())
        }

        let defaults = Self::default();
        Self {
            host: var("PGSEARCH_PG_HOST").unwrap_or(defaults.host),
            port: parsed(var("PGSEARCH_PG_PORT")).unwrap_or(defaults.port),
            dbname: var("PGSEARCH_PG_DBNAME").unwrap_or(defaults.dbname),
            user: var("PGSEARCH_PG_USER").unwrap_or(defaults.user),
            password: var("PGSEARCH_PG_PASSWORD"),
            ssl_mode: var("PGSEARCH_PG_SSL_MODE")
                .and_then(|mode| serde_json::from_value(serde_json::Value::String(mode)).ok())
                .unwrap_or(defaults.ssl_mode),
            max_connections: parsed(var("PGSEARCH_PG_MAX_CONNECTIONS"))
                .unwrap_or(defaults.max_connections),
            statement_timeout_ms: parsed(var("PGSEARCH_PG_STATEMENT_TIMEOUT_MS"))
                .unwrap_or(defaults.statement_timeout_ms),
            ..defaults
        }
    }
}

/// Runs search scopes against a database.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    /// Invokes the scope and returns the ranked rows.
    async fn search(&self, scope: &SearchScope, args: &InvocationArgs) -> SearchResult<Vec<Row>>;
}

/// [`SearchExecutor`] backed by a `deadpool-postgres` pool.
pub struct PostgresSearchExecutor {
    pool: Pool,
    config: PostgresConfig,
}

impl Debug for PostgresSearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSearchExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostgresSearchExecutor {
    /// Creates an executor and its connection pool.
    ///
    /// Connections are opened lazily, so this does not touch the database.
    pub fn new(config: PostgresConfig) -> SearchResult<Self> {
        let pool = Self::create_pool(&config)?;
        tracing::info!(
            "PostgreSQL search executor pool created for {}:{}/{} (max {} connections)",
            config.host,
            config.port,
            config.dbname,
            config.max_connections
        );
        Ok(Self { pool, config })
    }

    fn create_pool(config: &PostgresConfig) -> SearchResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = config.password.clone();
        cfg.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
        cfg.options = Some(format!("-c statement_timeout={}", config.statement_timeout_ms));
        cfg.ssl_mode = Some(match config.ssl_mode {
            PostgresSslMode::Disable => SslMode::Disable,
            PostgresSslMode::Prefer => SslMode::Prefer,
            PostgresSslMode::Require => SslMode::Require,
        });

        let pool = cfg
            .builder(NoTls)
            .map_err(|e| ExecutionError::Pool {
                message: format!("Failed to create pool builder: {}", e),
            })?
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| ExecutionError::Pool {
                message: e.to_string(),
            })?;

        Ok(pool)
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    async fn get_client(&self) -> SearchResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(|e| {
            ExecutionError::Pool {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Creates the extensions the built-in features depend on.
    pub async fn ensure_extensions(&self) -> SearchResult<()> {
        let client = self.get_client().await?;
        for extension in REQUIRED_EXTENSIONS {
            client
                .batch_execute(&format!("CREATE EXTENSION IF NOT EXISTS {}", extension))
                .await
                .map_err(|e| ExecutionError::Query {
                    scope: format!("extension {}", extension),
                    message: e.to_string(),
                })?;
        }
        tracing::debug!("Ensured extensions: {}", REQUIRED_EXTENSIONS.join(", "));
        Ok(())
    }
}

fn to_sql_params(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|param| match param {
            SqlParam::Text(s) => Box::new(s.clone()) as Box<dyn ToSql + Sync + Send>,
        })
        .collect()
}

#[async_trait]
impl SearchExecutor for PostgresSearchExecutor {
    async fn search(&self, scope: &SearchScope, args: &InvocationArgs) -> SearchResult<Vec<Row>> {
        let query = scope.invoke(args)?;
        let client = self.get_client().await?;

        let params = to_sql_params(&query.params);
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        tracing::debug!(
            "Executing search scope {} with {} parameters",
            scope.name(),
            param_refs.len()
        );

        let rows = client
            .query(query.sql.as_str(), &param_refs)
            .await
            .map_err(|e| ExecutionError::Query {
                scope: scope.name().to_string(),
                message: e.to_string(),
            })?;
        Ok(rows)
    }
}
