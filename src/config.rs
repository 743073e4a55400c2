//! Configuration for rule processors.
//!
//! Controls how rule sets are indexed, whether batches are processed in
//! parallel, and carries the regex mapping table and the additional grok
//! patterns that rule definitions may reference.

use crate::error::{EngineError, Result};
use crate::normalizer::{GrokLibrary, RegexMapping};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Matching structure built for each rule partition.
///
/// | Strategy | Build cost | Match cost | Use Case |
/// |----------|------------|------------|----------|
/// | `Flat` | None | Every filter evaluated | Few rules, debugging |
/// | `Tree` | Clause expansion | Shared leaves tested once | Large rule sets |
/// | `Auto` | Depends | Depends | Default |
///
/// Both structures return the same rules in the same order.
///
/// # Examples
///
/// ```rust
/// use logrule_engine::{EngineConfig, IndexStrategy};
///
/// let config = EngineConfig::new().with_index_strategy(IndexStrategy::Flat);
/// assert_eq!(config.index.strategy, IndexStrategy::Flat);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Evaluate every rule's filter in declaration order.
    Flat,
    /// Discrimination tree over the leaf conditions shared by rules.
    Tree,
    /// Tree once a partition holds at least `tree_threshold` rules.
    #[default]
    Auto,
}

/// Rule index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub strategy: IndexStrategy,
    /// Minimum partition size for which `Auto` builds a tree.
    pub tree_threshold: usize,
    /// Upper bound on the clauses one filter may expand into. Larger filters
    /// are kept whole and evaluated as a single condition.
    pub max_dnf_clauses: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            strategy: IndexStrategy::Auto,
            tree_threshold: 16,
            max_dnf_clauses: 64,
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Process the documents of a batch on the rayon thread pool.
    pub enable_event_parallelism: bool,
    /// Smaller batches are processed sequentially.
    pub min_batch_size_for_parallelism: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enable_event_parallelism: true,
            min_batch_size_for_parallelism: 32,
        }
    }
}

/// Complete processor configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexConfig,
    pub parallel: ParallelConfig,
    /// Regex identifiers usable in substitution targets.
    pub regex_mapping: HashMap<String, String>,
    /// Grok patterns added to (or overriding) the default library.
    pub grok_patterns: HashMap<String, String>,
}

impl EngineConfig {
    /// Create a new engine configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always build trees and process batches in parallel.
    pub fn high_throughput() -> Self {
        Self {
            index: IndexConfig {
                strategy: IndexStrategy::Tree,
                max_dnf_clauses: 256,
                ..Default::default()
            },
            parallel: ParallelConfig {
                enable_event_parallelism: true,
                min_batch_size_for_parallelism: 8,
            },
            ..Default::default()
        }
    }

    /// Linear matching and sequential batches, for tracing rule behavior.
    pub fn development() -> Self {
        Self {
            index: IndexConfig {
                strategy: IndexStrategy::Flat,
                ..Default::default()
            },
            parallel: ParallelConfig {
                enable_event_parallelism: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse a YAML configuration and validate it.
    ///
    /// ```rust
    /// use logrule_engine::EngineConfig;
    ///
    /// let config = EngineConfig::from_yaml_str(
    ///     "index:\n  strategy: tree\nregex_mapping:\n  RE_WHOLE: '^(.*)$'\n",
    /// )?;
    /// assert_eq!(config.regex_mapping.len(), 1);
    /// # Ok::<(), logrule_engine::EngineError>(())
    /// ```
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Reject settings that cannot produce a working processor.
    pub fn validate(&self) -> Result<()> {
        if self.index.tree_threshold == 0 {
            return Err(EngineError::Config(
                "index.tree_threshold must be at least 1".to_string(),
            ));
        }
        if self.index.max_dnf_clauses == 0 {
            return Err(EngineError::Config(
                "index.max_dnf_clauses must be at least 1".to_string(),
            ));
        }
        self.regex_mapping()?;

        let library = self.grok_library();
        for name in self.grok_patterns.keys() {
            library
                .compile(&format!("%{{{name}}}"))
                .map_err(|e| EngineError::Config(format!("grok pattern '{name}': {e}")))?;
        }
        Ok(())
    }

    /// Compile the regex mapping table.
    pub fn regex_mapping(&self) -> Result<RegexMapping> {
        RegexMapping::from_patterns(&self.regex_mapping)
    }

    /// Default grok patterns extended by the configured ones.
    pub fn grok_library(&self) -> GrokLibrary {
        GrokLibrary::with_patterns(self.grok_patterns.clone())
    }

    // Builder methods

    pub fn with_index_strategy(mut self, strategy: IndexStrategy) -> Self {
        self.index.strategy = strategy;
        self
    }

    pub fn with_tree_threshold(mut self, threshold: usize) -> Self {
        self.index.tree_threshold = threshold;
        self
    }

    pub fn with_max_dnf_clauses(mut self, max: usize) -> Self {
        self.index.max_dnf_clauses = max;
        self
    }

    /// Register a regex under `id` for substitution targets.
    pub fn with_regex(mut self, id: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.regex_mapping.insert(id.into(), pattern.into());
        self
    }

    pub fn with_grok_pattern(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.grok_patterns.insert(name.into(), definition.into());
        self
    }

    pub fn with_event_parallelism(mut self, enable: bool) -> Self {
        self.parallel.enable_event_parallelism = enable;
        self
    }

    pub fn with_min_batch_size_for_parallelism(mut self, min_size: usize) -> Self {
        self.parallel.min_batch_size_for_parallelism = min_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.index.strategy, IndexStrategy::Auto);
        assert_eq!(config.index.tree_threshold, 16);
        assert_eq!(config.index.max_dnf_clauses, 64);
        assert!(config.parallel.enable_event_parallelism);
        assert!(config.regex_mapping.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_high_throughput_config() {
        let config = EngineConfig::high_throughput();

        assert_eq!(config.index.strategy, IndexStrategy::Tree);
        assert_eq!(config.index.max_dnf_clauses, 256);
        assert_eq!(config.parallel.min_batch_size_for_parallelism, 8);
    }

    #[test]
    fn test_development_config() {
        let config = EngineConfig::development();

        assert_eq!(config.index.strategy, IndexStrategy::Flat);
        assert!(!config.parallel.enable_event_parallelism);
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::new()
            .with_index_strategy(IndexStrategy::Tree)
            .with_tree_threshold(4)
            .with_max_dnf_clauses(8)
            .with_regex("RE_DIGITS", r"\d+")
            .with_grok_pattern("TICKET", r"[A-Z]+-\d+")
            .with_event_parallelism(false)
            .with_min_batch_size_for_parallelism(100);

        assert_eq!(config.index.strategy, IndexStrategy::Tree);
        assert_eq!(config.index.tree_threshold, 4);
        assert_eq!(config.index.max_dnf_clauses, 8);
        assert_eq!(config.regex_mapping["RE_DIGITS"], r"\d+");
        assert!(config.grok_library().contains("TICKET"));
        assert!(!config.parallel.enable_event_parallelism);
        assert_eq!(config.parallel.min_batch_size_for_parallelism, 100);
        assert_eq!(config.regex_mapping().unwrap().len(), 1);
    }

    #[test]
    fn test_from_yaml_str() {
        let config = EngineConfig::from_yaml_str(
            r#"
index:
  strategy: flat
  tree_threshold: 2
parallel:
  enable_event_parallelism: false
regex_mapping:
  RE_DOMAIN_BACKSLASH_USERNAME: '^[^\\]+\\(.+)$'
grok_patterns:
  TICKET: '[A-Z]+-\d+'
"#,
        )
        .unwrap();

        assert_eq!(config.index.strategy, IndexStrategy::Flat);
        assert_eq!(config.index.tree_threshold, 2);
        assert_eq!(config.index.max_dnf_clauses, 64);
        assert!(!config.parallel.enable_event_parallelism);
        assert!(config.regex_mapping.contains_key("RE_DOMAIN_BACKSLASH_USERNAME"));
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            EngineConfig::new().with_tree_threshold(0).validate(),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::new().with_max_dnf_clauses(0).validate(),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::new().with_regex("BROKEN", "(").validate(),
            Err(EngineError::InvalidRegex { .. })
        ));
        assert!(matches!(
            EngineConfig::new()
                .with_grok_pattern("BAD", "%{MISSING}")
                .validate(),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("index: [1, 2]"),
            Err(EngineError::Yaml(_))
        ));
    }
}
