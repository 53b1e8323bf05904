//! Recursive scan of one root for pattern-matching files.

use ignore::WalkBuilder;
use nix::unistd::{access, AccessFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::pattern::BasenamePattern;

/// A file under a root whose basename matched the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the root directory.
    pub relative: PathBuf,
    /// Whether the current user may execute the file.
    pub executable: bool,
}

/// Everything one root scan found.
#[derive(Debug, Clone, Default)]
pub struct RootScan {
    /// Pattern matches in traversal order, executable or not.
    pub matches: Vec<ScanEntry>,
    /// Entries that could not be read and were skipped.
    pub unreadable: usize,
}

impl RootScan {
    /// Matches that can run as tests.
    pub fn binaries(&self) -> impl Iterator<Item = &ScanEntry> {
        self.matches.iter().filter(|entry| entry.executable)
    }

    /// Matches skipped for lacking execute permission.
    pub fn non_executable(&self) -> impl Iterator<Item = &ScanEntry> {
        self.matches.iter().filter(|entry| !entry.executable)
    }
}

/// Recursively scans `root` for regular files matching `pattern`.
///
/// Entries are visited in file-name order. Ignore files are not honoured,
/// since test binaries usually live in ignored build directories. Unreadable
/// directories are skipped.
pub fn scan_root(root: &Path, pattern: &BasenamePattern) -> RootScan {
    let mut scan = RootScan::default();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), err);
                scan.unreadable += 1;
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !pattern.is_match(&name) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let executable = is_executable(&path);
        if !executable {
            debug!("Skipping non-executable match {}", path.display());
        }

        scan.matches.push(ScanEntry {
            path,
            relative,
            executable,
        });
    }

    scan
}

/// Whether the current user may execute `path`.
pub fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}
