//! Feature strategy registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigResult, ConfigurationError};

use super::{DmetaphoneStrategy, FeatureStrategy, TrigramStrategy, TsearchStrategy};

/// Maps feature names to strategies.
#[derive(Clone)]
pub struct FeatureRegistry {
    strategies: HashMap<String, Arc<dyn FeatureStrategy>>,
}

impl FeatureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Creates a registry with `tsearch`, `trigram`, and `dmetaphone`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for strategy in [
            Arc::new(TsearchStrategy) as Arc<dyn FeatureStrategy>,
            Arc::new(TrigramStrategy),
            Arc::new(DmetaphoneStrategy),
        ] {
            registry.strategies.insert(strategy.name().to_string(), strategy);
        }
        registry
    }

    /// Registers a strategy under its own name.
    pub fn register(&mut self, strategy: Arc<dyn FeatureStrategy>) -> ConfigResult<()> {
        let name = strategy.name();
        if self.strategies.contains_key(name) {
            return Err(ConfigurationError::DuplicateFeature {
                name: name.to_string(),
            });
        }
        self.strategies.insert(name.to_string(), strategy);
        Ok(())
    }

    /// Looks up a strategy.
    pub fn get(&self, name: &str) -> ConfigResult<Arc<dyn FeatureStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownFeature {
                name: name.to_string(),
            })
    }

    /// Returns true if a strategy is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::features::{Feature, FeatureInput, FeatureSql};
    use crate::sql::{ParamBinder, SqlQuoter};
    use serde_json::Value;

    #[derive(Debug)]
    struct Exact;

    impl Feature for Exact {
        fn name(&self) -> &str {
            "exact"
        }

        fn compile(&self, input: &FeatureInput<'_>, binder: &mut ParamBinder) -> FeatureSql {
            let q = input.bind(binder, input.query);
            FeatureSql {
                predicate: format!("({}) = {}", input.combined_text(), q),
                rank: "1".to_string(),
                extra_selects: Vec::new(),
            }
        }
    }

    struct ExactStrategy;

    impl FeatureStrategy for ExactStrategy {
        fn name(&self) -> &'static str {
            "exact"
        }

        fn instantiate(
            &self,
            _options: &Value,
            _config: &CompilerConfig,
            _quoter: &dyn SqlQuoter,
        ) -> ConfigResult<Arc<dyn Feature>> {
            Ok(Arc::new(Exact))
        }
    }

    #[test]
    fn test_builtins() {
        let registry = FeatureRegistry::default();
        assert_eq!(registry.names(), vec!["dmetaphone", "trigram", "tsearch"]);
        assert!(registry.get("tsearch").unwrap().supports_weighting());
        assert!(registry.get("trigram").unwrap().requires_text());
    }

    #[test]
    fn test_unknown_feature() {
        let err = FeatureRegistry::default().get("soundex").err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::UnknownFeature {
                name: "soundex".to_string()
            }
        );
    }

    #[test]
    fn test_register_custom_strategy() {
        let mut registry = FeatureRegistry::with_builtins();
        registry.register(Arc::new(ExactStrategy)).unwrap();
        assert!(registry.contains("exact"));

        let err = registry.register(Arc::new(ExactStrategy)).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateFeature { .. }));
    }

    #[test]
    fn test_empty_registry() {
        let registry = FeatureRegistry::new();
        assert!(registry.names().is_empty());
        assert!(!registry.contains("tsearch"));
    }
}
