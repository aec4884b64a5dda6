//! # Runtime Configuration
//!
//! `RuntimeConfig` holds the tunables of the linkage runtime and is read
//! from YAML. Every key has a default, so an empty document is a valid
//! configuration:
//!
//! ```yaml
//! idle_threshold_secs: 300        # sweep idleness threshold
//! auto_unload: false              # whether maintenance runs the sweep
//! direct_dependency_boost: 1000   # priority bonus for a direct dependency
//! default_priority: 10            # priority of symbols declared in manifests
//! search_paths: []                # directories searched for libraries
//! ```
//!
//! Unknown keys are rejected so a misspelled option fails loudly instead
//! of silently falling back to its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::DEFAULT_DIRECT_DEPENDENCY_BOOST;

pub fn default_idle_threshold_secs() -> u64 {
    300
}

pub fn default_direct_dependency_boost() -> i32 {
    DEFAULT_DIRECT_DEPENDENCY_BOOST
}

pub fn default_priority() -> i32 {
    10
}

/// Tunables for `Runtime`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Seconds a handle must sit unused before a sweep may close it.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    /// Run the sweep from `Runtime::maintain`.
    #[serde(default)]
    pub auto_unload: bool,
    #[serde(default = "default_direct_dependency_boost")]
    pub direct_dependency_boost: i32,
    /// Priority given to symbols registered from declarations.
    #[serde(default = "default_priority")]
    pub default_priority: i32,
    /// Directories searched, in order, for relative library paths.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold_secs(),
            auto_unload: false,
            direct_dependency_boost: default_direct_dependency_boost(),
            default_priority: default_priority(),
            search_paths: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// Resolve a library path against `search_paths`.
    ///
    /// Absolute paths are returned unchanged. A relative path is joined to
    /// the first search path under which it exists; if none has it, the path
    /// is returned as given and left to the platform loader's own search.
    pub fn locate_library(&self, library: &Path) -> PathBuf {
        if library.is_absolute() {
            return library.to_path_buf();
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(library))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| library.to_path_buf())
    }
}

/// Parse a YAML document into a `RuntimeConfig`.
pub fn parse(yaml_content: &str) -> Result<RuntimeConfig> {
    let blank = yaml_content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if blank {
        return Ok(RuntimeConfig::default());
    }
    Ok(serde_yaml::from_str(yaml_content)?)
}

/// Parse a `RuntimeConfig` from a YAML file path
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}
