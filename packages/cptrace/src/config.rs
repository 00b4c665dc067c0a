//! Configuration loading for cptrace
//!
//! Loads configuration from `cptrace.toml`, or from the `[tool.cptrace]` section
//! of the nearest `pyproject.toml`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "cptrace.toml";
pub const TOOL_SECTION: &str = "cptrace";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum number of history entries kept per variable
    pub history_cap: usize,

    /// Maximum depth of serialized tree structures
    pub tree_depth: usize,

    /// Rendered container values are truncated to this many characters
    pub max_render_len: usize,

    /// Attribute names tried, in order, when abbreviating objects
    pub primary_fields: Vec<String>,

    /// Random inputs generated by `cptrace test --stress`
    pub stress_iterations: usize,

    /// Paths to exclude when collecting files for analysis
    pub exclude: Vec<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            history_cap: 50,
            tree_depth: 6,
            max_render_len: 120,
            primary_fields: ["val", "value", "key", "data", "name", "id"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stress_iterations: 100,
            exclude: Vec::new(),
        }
    }
}

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub history_cap: Option<usize>,
    pub stress_iterations: Option<usize>,
    pub exclude: Vec<String>,
}

impl TraceConfig {
    pub fn apply(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(history_cap) = overrides.history_cap {
            self.history_cap = history_cap;
        }
        if let Some(iterations) = overrides.stress_iterations {
            self.stress_iterations = iterations;
        }
        self.exclude.extend(overrides.exclude.iter().cloned());
        for default in DEFAULT_EXCLUDES {
            if !self.exclude.iter().any(|e| e == default) {
                self.exclude.push(default.to_string());
            }
        }
        self
    }
}

const DEFAULT_EXCLUDES: &[&str] = &[
    ".venv",
    "venv",
    "__pycache__",
    ".git",
    ".tox",
    "build",
    "dist",
    "node_modules",
];

fn has_tool_section(pyproject: &Path) -> bool {
    std::fs::read_to_string(pyproject)
        .ok()
        .and_then(|content| toml::from_str::<toml::Value>(&content).ok())
        .and_then(|value| value.get("tool").and_then(|tool| tool.get(TOOL_SECTION)).cloned())
        .is_some()
}

/// Find `cptrace.toml`, or a `pyproject.toml` with a `[tool.cptrace]` section,
/// starting from a path and walking up
pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    loop {
        let dedicated = current.join(CONFIG_FILE_NAME);
        if dedicated.exists() {
            return Some(dedicated);
        }
        let pyproject = current.join("pyproject.toml");
        if pyproject.exists() && has_tool_section(&pyproject) {
            return Some(pyproject);
        }

        current = current.parent()?;
    }
}

fn parse_config(path: &Path, content: &str) -> Result<TraceConfig, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        path: path.display().to_string(),
        message,
    };
    let value: toml::Value = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
    let table = if path.file_name().map_or(false, |n| n == "pyproject.toml") {
        match value.get("tool").and_then(|tool| tool.get(TOOL_SECTION)) {
            Some(section) => section.clone(),
            None => return Ok(TraceConfig::default()),
        }
    } else {
        value
    };
    table.try_into().map_err(|e: toml::de::Error| invalid(e.to_string()))
}

/// Load configuration from an explicit file, or discover one from the
/// working directory. Returns `None` when no configuration file exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<TraceConfig>, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let Ok(cwd) = std::env::current_dir() else {
                return Ok(None);
            };
            match find_config_file(&cwd) {
                Some(found) => found,
                None => return Ok(None),
            }
        }
    };

    let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.display().to_string(),
        source,
    })?;
    log::debug!("loading configuration from {}", config_path.display());
    parse_config(&config_path, &content).map(Some)
}
