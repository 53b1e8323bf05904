//! Configuration management for exectest.
//!
//! The configuration lives in a JSON file that tolerates `//` and `/* */`
//! comments and trailing commas. It is read once per discovery pass and is
//! either accepted as a whole or rejected as a whole.

use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::debug::DebuggerBackend;

mod defaults;
mod jsonc;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Config file I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at line {line}, column {column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid configuration at {location}: {message}")]
    Invalid { location: String, message: String },
}

impl ConfigError {
    fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Where a root lives, as written in the configuration.
///
/// Both kinds resolve the same way; the kind only changes the default label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootLocation {
    /// `workspacePath`: a directory relative to the workspace root.
    Workspace(String),
    /// `path`: an absolute, relative or `~/` directory.
    Path(String),
}

impl RootLocation {
    /// The raw path string from the configuration.
    pub fn raw(&self) -> &str {
        match self {
            RootLocation::Workspace(path) | RootLocation::Path(path) => path,
        }
    }
}

/// One configured search root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpec {
    /// Display name for the root.
    pub label: Option<String>,
    /// Nest roots sharing a label under one group.
    pub group_by_label: bool,
    /// Directory to scan.
    pub location: RootLocation,
    /// Basename wildcard selecting test binaries.
    pub pattern: String,
}

/// A fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    /// Search roots in configuration order.
    pub roots: Vec<RootSpec>,
    /// Extensions (without leading dot) searched by the source mapper.
    pub source_extensions: Vec<String>,
    /// Debugger used by the debug command.
    pub debugger: DebuggerBackend,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            source_extensions: DEFAULT_SOURCE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debugger: DebuggerBackend::default(),
        }
    }
}

impl TestConfig {
    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let value = jsonc::parse(text)?;

        let Value::Object(top) = value else {
            return Err(ConfigError::invalid("<root>", "expected a top-level object"));
        };

        let mut config = TestConfig::default();

        match top.get("testRoots") {
            None | Some(Value::Null) => {}
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    config.roots.push(parse_root(index, entry)?);
                }
            }
            Some(_) => return Err(ConfigError::invalid("testRoots", "expected an array")),
        }

        if let Some(extensions) = top.get("sourceExtensions") {
            config.source_extensions = parse_extensions(extensions)?;
        }

        if let Some(debugger) = top.get("debugger") {
            let name = debugger
                .as_str()
                .ok_or_else(|| ConfigError::invalid("debugger", "expected a string"))?;
            config.debugger = name
                .parse()
                .map_err(|message: String| ConfigError::invalid("debugger", message))?;
        }

        Ok(config)
    }
}

fn parse_root(index: usize, entry: &Value) -> Result<RootSpec, ConfigError> {
    let location = format!("testRoots[{index}]");
    let Value::Object(fields) = entry else {
        return Err(ConfigError::invalid(location, "expected an object"));
    };

    let workspace_path = optional_string(fields, "workspacePath", &location)?;
    let path = optional_string(fields, "path", &location)?;
    let root_location = match (workspace_path, path) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::invalid(
                location,
                "`workspacePath` and `path` are mutually exclusive",
            ))
        }
        (None, None) => {
            return Err(ConfigError::invalid(
                location,
                "one of `workspacePath` or `path` is required",
            ))
        }
        (Some(p), None) => RootLocation::Workspace(p),
        (None, Some(p)) => RootLocation::Path(p),
    };

    let pattern = match fields.get("pattern") {
        Some(Value::String(p)) if !p.is_empty() => p.clone(),
        _ => {
            return Err(ConfigError::invalid(
                location,
                "`pattern` must be a non-empty string",
            ))
        }
    };

    let label = optional_string(fields, "label", &location)?;
    let group_by_label = match fields.get("groupByLabel") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(ConfigError::invalid(
                location,
                "`groupByLabel` must be a boolean",
            ))
        }
    };

    Ok(RootSpec {
        label,
        group_by_label,
        location: root_location,
        pattern,
    })
}

fn optional_string(
    fields: &Map<String, Value>,
    key: &str,
    location: &str,
) -> Result<Option<String>, ConfigError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::invalid(
            location,
            format!("`{key}` must be a string"),
        )),
    }
}

fn parse_extensions(value: &Value) -> Result<Vec<String>, ConfigError> {
    let Value::Array(items) = value else {
        return Err(ConfigError::invalid("sourceExtensions", "expected an array"));
    };

    let mut extensions = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let ext = item
            .as_str()
            .map(|s| s.trim().trim_start_matches('.'))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConfigError::invalid(
                    format!("sourceExtensions[{index}]"),
                    "expected a non-empty string",
                )
            })?;
        extensions.push(ext.to_string());
    }

    Ok(extensions)
}

/// Writes the default configuration template.
///
/// Never overwrites an existing file. Returns `true` if a file was created.
pub fn create_default_config(path: impl AsRef<Path>) -> Result<bool, ConfigError> {
    let path = path.as_ref();
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(io_err(e)),
    };

    file.write_all(DEFAULT_CONFIG_TEMPLATE.as_bytes())
        .map_err(io_err)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_is_valid() {
        let config = TestConfig::parse(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.roots.len(), 1);
        assert_eq!(
            config.roots[0].location,
            RootLocation::Workspace("build".to_string())
        );
        assert_eq!(config.roots[0].pattern, "test_*");
    }

    #[test]
    fn test_missing_test_roots_is_empty() {
        let config = TestConfig::parse("{}").unwrap();
        assert!(config.roots.is_empty());
        assert_eq!(config.source_extensions, DEFAULT_SOURCE_EXTENSIONS);
    }

    #[test]
    fn test_rejects_both_paths() {
        let text = r#"{ "testRoots": [
            { "workspacePath": "a", "pattern": "t*" },
            { "workspacePath": "b", "path": "/c", "pattern": "t*" }
        ] }"#;
        let err = TestConfig::parse(text).unwrap_err();
        match err {
            ConfigError::Invalid { location, .. } => assert_eq!(location, "testRoots[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_missing_path() {
        let err = TestConfig::parse(r#"{ "testRoots": [ { "pattern": "t*" } ] }"#).unwrap_err();
        assert!(err.to_string().contains("is required"));
    }

    #[test]
    fn test_path_checked_before_pattern() {
        let err = TestConfig::parse(r#"{ "testRoots": [ { "pattern": "" } ] }"#).unwrap_err();
        assert!(err.to_string().contains("workspacePath"));
    }

    #[test]
    fn test_rejects_empty_pattern() {
        let err = TestConfig::parse(r#"{ "testRoots": [ { "path": "/x", "pattern": "  " } ] }"#)
            .unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }

    #[test]
    fn test_rejects_non_bool_group_by_label() {
        let text = r#"{ "testRoots": [ { "path": "/x", "pattern": "t*", "groupByLabel": "yes" } ] }"#;
        assert!(matches!(
            TestConfig::parse(text),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_source_extensions_and_debugger() {
        let text = r#"{ "sourceExtensions": [".c", "cpp"], "debugger": "lldb" }"#;
        let config = TestConfig::parse(text).unwrap();
        assert_eq!(config.source_extensions, vec!["c", "cpp"]);
        assert_eq!(config.debugger, DebuggerBackend::Lldb);
    }

    #[test]
    fn test_create_default_never_overwrites() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(DEFAULT_CONFIG_FILE);

        assert!(create_default_config(&path).unwrap());
        std::fs::write(&path, "{}").unwrap();
        assert!(!create_default_config(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
