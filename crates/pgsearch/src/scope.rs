//! Named search scopes.
//!
//! A [`SearchScope`] binds a declaration to a model and attaches the compiled
//! fragment to a base query:
//!
//! ```text
//! SELECT "posts".*, (<rank>) AS pg_search_rank
//! FROM "posts" <joins>
//! WHERE (<predicate>)
//! ORDER BY pg_search_rank DESC, "posts"."id" ASC
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::compiler::{CompiledConfiguration, CompiledQueryFragment, ConfigurationCompiler};
use crate::declaration::{Declaration, InvocationArgs};
use crate::error::{ConfigResult, ConfigurationError};
use crate::sql::SqlParam;

/// A complete statement and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    /// The `SELECT` statement.
    pub sql: String,
    /// Values for `$1..$N`.
    pub params: Vec<SqlParam>,
}

/// A named, invocable search over one model.
#[derive(Debug)]
pub struct SearchScope {
    name: String,
    model: String,
    declaration: Declaration,
    compiler: Arc<ConfigurationCompiler>,
    compiled: Option<CompiledConfiguration>,
}

impl SearchScope {
    /// Defines a scope.
    ///
    /// Static declarations are compiled here, so their configuration errors
    /// surface immediately. Dynamic ones are compiled on each invocation.
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        declaration: impl Into<Declaration>,
        compiler: Arc<ConfigurationCompiler>,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let model = model.into();
        let declaration = declaration.into();

        let compiled = match &declaration {
            Declaration::Static(declaration) => {
                Some(compiler.compile_static(&model, declaration)?)
            }
            Declaration::Dynamic(_) => None,
        };

        Ok(Self {
            name,
            model,
            declaration,
            compiler,
            compiled,
        })
    }

    /// Scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Searched model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns true if the declaration is rebuilt per call.
    pub fn is_dynamic(&self) -> bool {
        self.declaration.is_dynamic()
    }

    /// Renders the fragment for one invocation.
    pub fn fragment(&self, args: &InvocationArgs, offset: usize) -> ConfigResult<CompiledQueryFragment> {
        match &self.compiled {
            Some(compiled) => Ok(compiled.fragment(&args.query, offset)),
            None => self
                .compiler
                .compile(&self.model, &self.declaration, args, offset),
        }
    }

    /// Builds the full ranked `SELECT` for one invocation.
    pub fn invoke(&self, args: &InvocationArgs) -> ConfigResult<ScopedQuery> {
        match &self.compiled {
            Some(compiled) => Ok(self.render(compiled, &args.query)),
            None => {
                let Declaration::Dynamic(build) = &self.declaration else {
                    return Err(ConfigurationError::invalid(format!(
                        "scope {} has no compiled declaration",
                        self.name
                    )));
                };
                let declaration = build(args)?;
                tracing::debug!(
                    "Recompiling dynamic search scope {} for {}",
                    self.name,
                    self.model
                );
                let compiled = self.compiler.compile_static(&self.model, &declaration)?;
                Ok(self.render(&compiled, &args.query))
            }
        }
    }

    fn render(&self, compiled: &CompiledConfiguration, query: &str) -> ScopedQuery {
        let fragment = compiled.fragment(query, 0);
        let quoter = self.compiler.quoter();
        let config = self.compiler.config();
        let table = quoter.quote_table_name(compiled.table_name());

        let mut selects = vec![
            format!("{}.*", table),
            format!("({}) AS {}", fragment.rank, config.rank_alias),
        ];
        selects.extend(fragment.extra_selects.iter().cloned());

        let mut sql = format!("SELECT {} FROM {}", selects.join(", "), table);
        if !fragment.joins.is_empty() {
            sql.push(' ');
            sql.push_str(&fragment.join_sql());
        }

        let tie_break = compiled
            .order_within_rank()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} ASC", compiled.primary_key_expr()));
        sql.push_str(&format!(
            " WHERE ({}) ORDER BY {} DESC, {}",
            fragment.predicate, config.rank_alias, tie_break
        ));

        ScopedQuery {
            sql,
            params: fragment.params,
        }
    }
}

/// Scopes by name.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<HashMap<String, Arc<SearchScope>>>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scope; its name must be unused.
    pub fn define(&self, scope: SearchScope) -> ConfigResult<Arc<SearchScope>> {
        let mut scopes = self.scopes.write();
        if scopes.contains_key(scope.name()) {
            return Err(ConfigurationError::DuplicateScope {
                name: scope.name().to_string(),
            });
        }
        let scope = Arc::new(scope);
        scopes.insert(scope.name().to_string(), Arc::clone(&scope));
        Ok(scope)
    }

    /// Looks up a scope.
    pub fn get(&self, name: &str) -> ConfigResult<Arc<SearchScope>> {
        self.scopes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownScope {
                name: name.to_string(),
            })
    }

    /// Invokes a scope by name.
    pub fn invoke(&self, name: &str, args: &InvocationArgs) -> ConfigResult<ScopedQuery> {
        self.get(name)?.invoke(args)
    }

    /// Defined scope names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
