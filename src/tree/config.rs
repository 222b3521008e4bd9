//! Tree configuration

use crate::{Error, Result, MAX_DEPTH};
use serde::{Deserialize, Serialize};

/// Whether leaves may be replaced after insertion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeMode {
    /// Leaves are only ever appended
    #[default]
    AppendOnly,
    /// Inserted leaves may also be replaced in place (size unchanged)
    Indexed,
}

/// Shape and tuning of a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Tree name, recorded in the persisted metadata
    pub name: String,
    /// Number of levels above the leaves; capacity is `2^depth`
    pub depth: u32,
    pub mode: TreeMode,
    /// Committed nodes kept by the read-through cache
    pub cache_capacity: usize,
    /// Levels with at least this many parent nodes are hashed in parallel
    pub parallel_threshold: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            name: "tree".to_string(),
            depth: 32,
            mode: TreeMode::AppendOnly,
            cache_capacity: 65_536,
            parallel_threshold: 64,
        }
    }
}

impl TreeConfig {
    pub fn new(name: impl Into<String>, depth: u32) -> Self {
        TreeConfig {
            name: name.into(),
            depth,
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: TreeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(Error::Config(format!(
                "depth must be between 1 and {MAX_DEPTH}, got {}",
                self.depth
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be at least 1".into()));
        }
        if self.parallel_threshold == 0 {
            return Err(Error::Config("parallel_threshold must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TreeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_depth_bounds() {
        assert!(TreeConfig::new("t", 0).validate().is_err());
        assert!(TreeConfig::new("t", MAX_DEPTH).validate().is_ok());
        assert!(TreeConfig::new("t", MAX_DEPTH + 1).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TreeConfig = serde_json::from_str(r#"{"depth": 20, "mode": "indexed"}"#).unwrap();
        assert_eq!(config.depth, 20);
        assert_eq!(config.mode, TreeMode::Indexed);
        assert_eq!(config.cache_capacity, TreeConfig::default().cache_capacity);
    }
}
