//! Maps test binaries to the source files they were probably built from.
//!
//! A binary `build/a/b/test_x` is looked up as `test_x.<ext>` anywhere in the
//! workspace. When several files share that name the candidates are scored:
//!
//! - trailing directory segments shared with the binary's root-relative
//!   directory, ×1000
//! - +50 if the candidate sits under a `test`/`tests` folder
//! - +depth of the candidate directory, capped at 20
//!
//! Equal scores go to the shorter absolute path. This is a naming convention,
//! not a build-system query: binaries that break the convention map wrongly.

use async_trait::async_trait;
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{MAX_DEPTH_BONUS, SUFFIX_MATCH_WEIGHT, TEST_FOLDER_BONUS, TEST_FOLDER_NAMES};

/// File lookup over the whole workspace.
#[async_trait]
pub trait WorkspaceFiles: Send + Sync {
    /// All workspace files whose name is exactly `file_name`.
    async fn find_by_name(&self, file_name: &str) -> Vec<PathBuf>;
}

/// Walks the workspace once and answers name lookups from that index.
///
/// Hidden files and git-ignored paths are not indexed. Create a new scanner
/// for every discovery pass so moved files are picked up.
pub struct WorkspaceScanner {
    root: PathBuf,
    index: OnceCell<HashMap<String, Vec<PathBuf>>>,
}

impl WorkspaceScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> &HashMap<String, Vec<PathBuf>> {
        self.index
            .get_or_init(|| async {
                let root = self.root.clone();
                tokio::task::spawn_blocking(move || build_name_index(&root))
                    .await
                    .unwrap_or_default()
            })
            .await
    }
}

#[async_trait]
impl WorkspaceFiles for WorkspaceScanner {
    async fn find_by_name(&self, file_name: &str) -> Vec<PathBuf> {
        self.index()
            .await
            .get(file_name)
            .cloned()
            .unwrap_or_default()
    }
}

fn build_name_index(root: &Path) -> HashMap<String, Vec<PathBuf>> {
    let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        index.entry(name).or_default().push(entry.into_path());
    }

    debug!("Indexed {} distinct file names under {}", index.len(), root.display());
    index
}

/// Source lookups made during one discovery pass.
///
/// Keyed by binary base name and root-relative directory. Negative results
/// are cached too.
#[derive(Debug, Default)]
pub struct SourceMapCache {
    entries: HashMap<(String, PathBuf), Option<PathBuf>>,
}

impl SourceMapCache {
    pub fn get(&self, base_name: &str, relative_dir: &Path) -> Option<&Option<PathBuf>> {
        self.entries
            .get(&(base_name.to_string(), relative_dir.to_path_buf()))
    }

    pub fn insert(&mut self, base_name: &str, relative_dir: &Path, source: Option<PathBuf>) {
        self.entries
            .insert((base_name.to_string(), relative_dir.to_path_buf()), source);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves binaries to source files, caching per pass.
pub struct SourceMapper {
    files: Arc<dyn WorkspaceFiles>,
    workspace_root: PathBuf,
    extensions: Vec<String>,
    cache: SourceMapCache,
}

impl SourceMapper {
    pub fn new(
        files: Arc<dyn WorkspaceFiles>,
        workspace_root: impl Into<PathBuf>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            files,
            workspace_root: workspace_root.into(),
            extensions,
            cache: SourceMapCache::default(),
        }
    }

    /// Forgets every cached lookup. Called at the start of each pass.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &SourceMapCache {
        &self.cache
    }

    /// Maps a binary given its path relative to its root.
    pub async fn map_binary(&mut self, relative: &Path) -> Option<PathBuf> {
        let base_name = relative.file_stem()?.to_string_lossy().to_string();
        let relative_dir = relative.parent().unwrap_or(Path::new("")).to_path_buf();
        self.map(&base_name, &relative_dir).await
    }

    /// Finds the most likely `<base_name>.<ext>` for a binary in `relative_dir`.
    pub async fn map(&mut self, base_name: &str, relative_dir: &Path) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get(base_name, relative_dir) {
            return cached.clone();
        }

        let mut candidates = Vec::new();
        for ext in &self.extensions {
            let name = format!("{base_name}.{ext}");
            candidates.extend(self.files.find_by_name(&name).await);
        }

        let chosen = choose_candidate(&candidates, &self.workspace_root, relative_dir);
        self.cache.insert(base_name, relative_dir, chosen.clone());
        chosen
    }
}

/// Picks the best candidate for a binary in `binary_dir`.
pub fn choose_candidate(
    candidates: &[PathBuf],
    workspace_root: &Path,
    binary_dir: &Path,
) -> Option<PathBuf> {
    match candidates {
        [] => None,
        [only] => Some(only.clone()),
        _ => {
            let mut scored: Vec<(u64, &PathBuf)> = candidates
                .iter()
                .map(|c| (score_candidate(c, workspace_root, binary_dir), c))
                .collect();
            // stable sort keeps discovery order for full ties
            scored.sort_by(|(sa, pa), (sb, pb)| {
                sb.cmp(sa)
                    .then_with(|| pa.as_os_str().len().cmp(&pb.as_os_str().len()))
            });

            let (best_score, best) = scored[0];
            let alternatives: Vec<String> = scored
                .iter()
                .skip(1)
                .take(3)
                .map(|(score, path)| format!("{} ({score})", path.display()))
                .collect();
            info!(
                "Resolved ambiguous source for {}: {} (score {}); alternatives: {}",
                binary_dir.display(),
                best.display(),
                best_score,
                alternatives.join(", ")
            );

            Some(best.clone())
        }
    }
}

/// Scores a candidate source file against a binary's root-relative directory.
pub fn score_candidate(candidate: &Path, workspace_root: &Path, binary_dir: &Path) -> u64 {
    let candidate_dir = candidate.parent().unwrap_or(Path::new(""));
    let candidate_dir = candidate_dir
        .strip_prefix(workspace_root)
        .unwrap_or(candidate_dir);

    let candidate_segments = segments(candidate_dir);
    let binary_segments = segments(binary_dir);

    let suffix = candidate_segments
        .iter()
        .rev()
        .zip(binary_segments.iter().rev())
        .take_while(|(a, b)| a == b)
        .count() as u64;

    let in_tests_folder = candidate_segments.iter().any(|segment| {
        TEST_FOLDER_NAMES
            .iter()
            .any(|name| segment.eq_ignore_ascii_case(name))
    });

    let depth = (candidate_segments.len() as u64).min(MAX_DEPTH_BONUS);

    suffix * SUFFIX_MATCH_WEIGHT + if in_tests_folder { TEST_FOLDER_BONUS } else { 0 } + depth
}

fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect()
}
