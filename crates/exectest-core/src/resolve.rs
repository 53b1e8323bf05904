//! Root resolution: configured paths to absolute directories.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::config::{RootLocation, RootSpec};

/// Errors that make a single root unusable.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Cannot resolve {0}: home directory is unknown")]
    NoHomeDir(String),

    #[error("Root directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// A root whose directory exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    /// Position of the root in the configuration.
    pub index: usize,
    /// The configured root.
    pub spec: RootSpec,
    /// Absolute, normalized directory.
    pub dir: PathBuf,
}

impl ResolvedRoot {
    /// Resolves a root and checks that its directory exists.
    pub fn resolve(
        index: usize,
        spec: RootSpec,
        workspace_root: &Path,
    ) -> Result<Self, ResolutionError> {
        let dir = resolve_path(spec.location.raw(), workspace_root)?;

        match std::fs::metadata(&dir) {
            Err(_) => Err(ResolutionError::NotFound(dir)),
            Ok(meta) if !meta.is_dir() => Err(ResolutionError::NotADirectory(dir)),
            Ok(_) => Ok(Self { index, spec, dir }),
        }
    }

    /// Label shown for this root.
    ///
    /// An explicit non-blank label wins; otherwise workspace roots show their
    /// configured path and path roots show their absolute directory.
    pub fn effective_label(&self) -> String {
        if let Some(label) = self.spec.label.as_deref().map(str::trim) {
            if !label.is_empty() {
                return label.to_string();
            }
        }

        match &self.spec.location {
            RootLocation::Workspace(raw) => {
                let raw = raw.trim();
                if raw.is_empty() || raw == "." {
                    "(workspace)".to_string()
                } else {
                    format!("{raw} (workspace)")
                }
            }
            RootLocation::Path(_) => self.dir.display().to_string(),
        }
    }
}

/// Turns a configured path into an absolute, normalized path.
///
/// `~` expands to the home directory, absolute paths are normalized as-is and
/// everything else is taken relative to `base`.
pub fn resolve_path(raw: &str, base: &Path) -> Result<PathBuf, ResolutionError> {
    let raw = raw.trim();

    let joined = if let Some(rest) = strip_home_prefix(raw) {
        let home = dirs::home_dir().ok_or_else(|| ResolutionError::NoHomeDir(raw.to_string()))?;
        home.join(rest)
    } else if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base.join(raw)
    };

    Ok(normalize(&joined))
}

fn strip_home_prefix(raw: &str) -> Option<&str> {
    if raw == "~" {
        return Some("");
    }
    raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\"))
}

/// Lexically collapses `.` and `..` segments.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
