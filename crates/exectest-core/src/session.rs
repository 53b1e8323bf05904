//! The session: one workspace, its configuration and its current test tree.
//!
//! A session is created once per host process and every command goes
//! through it. Discovery passes rebuild the tree from scratch; a pass that
//! fails on configuration leaves the previous tree in place.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{create_default_config, ConfigError, TestConfig, DEFAULT_CONFIG_FILE};
use crate::debug::{debug_leaf, Debugger};
use crate::discovery::scan_roots;
use crate::exec::{CancelToken, Executor, RunResult};
use crate::resolve::ResolvedRoot;
use crate::source_map::{SourceMapper, WorkspaceFiles, WorkspaceScanner};
use crate::tree::{TestLeaf, TestTree, TreeBuilder};

/// Errors that abort a whole session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No workspace open: {} is not a directory", .0.display())]
    NoWorkspace(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Receives run lifecycle events for presentation.
pub trait RunReporter: Send {
    /// A leaf was queued for this run.
    fn enqueued(&mut self, _leaf: &TestLeaf) {}

    /// A leaf started executing.
    fn started(&mut self, leaf: &TestLeaf);

    /// Output text, attributed to the leaf that produced it when known.
    fn output(&mut self, leaf: Option<&TestLeaf>, text: &str);

    /// A leaf produced its result.
    fn finished(&mut self, leaf: &TestLeaf, result: &RunResult);

    /// A queued leaf was not started because the run was cancelled.
    fn skipped(&mut self, _leaf: &TestLeaf) {}
}

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub roots_scanned: usize,
    pub roots_skipped: usize,
    pub leaves: usize,
    pub non_executable: usize,
    pub unreadable: usize,
}

/// Counts from one run or debug pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &RunResult) {
        match result {
            RunResult::Passed { .. } => self.passed += 1,
            RunResult::Failed { .. } => self.failed += 1,
            RunResult::Errored { .. } => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.skipped
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0 && self.skipped == 0
    }
}

/// A workspace with its discovered tests.
pub struct Session {
    workspace_root: PathBuf,
    config_path: PathBuf,
    config: TestConfig,
    tree: TestTree,
    executor: Executor,
}

impl Session {
    /// Opens a session on `workspace_root`.
    ///
    /// The configuration defaults to `.exectest.jsonc` in the workspace root.
    pub fn open(
        workspace_root: impl AsRef<Path>,
        config_path: Option<PathBuf>,
    ) -> Result<Self, SessionError> {
        let workspace_root = workspace_root.as_ref();
        if !workspace_root.is_dir() {
            return Err(SessionError::NoWorkspace(workspace_root.to_path_buf()));
        }
        let workspace_root = workspace_root
            .canonicalize()
            .map_err(|_| SessionError::NoWorkspace(workspace_root.to_path_buf()))?;

        let config_path = match config_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => workspace_root.join(path),
            None => workspace_root.join(DEFAULT_CONFIG_FILE),
        };

        Ok(Self {
            executor: Executor::new(&workspace_root),
            workspace_root,
            config_path,
            config: TestConfig::default(),
            tree: TestTree::default(),
        })
    }

    /// Replaces the executor, e.g. to change the kill policy.
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Configuration from the last successful discovery pass.
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Writes the default configuration unless one exists.
    pub fn create_default_config(&self) -> Result<bool, ConfigError> {
        create_default_config(&self.config_path)
    }

    /// Watches this session's configuration file.
    pub fn config_watcher(&self) -> ConfigWatcher {
        ConfigWatcher::new(&self.config_path)
    }

    /// Runs a discovery pass using a fresh workspace scanner.
    pub async fn discover(&mut self) -> Result<DiscoveryReport, SessionError> {
        let files = Arc::new(WorkspaceScanner::new(&self.workspace_root));
        self.discover_with(files).await
    }

    /// Runs a discovery pass with the given workspace file lookup.
    pub async fn discover_with(
        &mut self,
        files: Arc<dyn WorkspaceFiles>,
    ) -> Result<DiscoveryReport, SessionError> {
        let config = TestConfig::from_file(&self.config_path).inspect_err(|err| {
            warn!("Discovery aborted: {}", err);
        })?;

        let mut report = DiscoveryReport::default();
        let mut resolved = Vec::new();
        for (index, spec) in config.roots.iter().cloned().enumerate() {
            match ResolvedRoot::resolve(index, spec, &self.workspace_root) {
                Ok(root) => resolved.push(root),
                Err(err) => {
                    warn!("Skipping root {}: {}", index, err);
                    report.roots_skipped += 1;
                }
            }
        }

        let mut mapper = SourceMapper::new(
            files,
            &self.workspace_root,
            config.source_extensions.clone(),
        );
        mapper.reset();

        let mut builder = TreeBuilder::new();
        for outcome in scan_roots(resolved).await {
            let discovery = match outcome {
                Ok(discovery) => discovery,
                Err(err) => {
                    warn!("Skipping root: {}", err);
                    report.roots_skipped += 1;
                    continue;
                }
            };

            report.roots_scanned += 1;
            report.unreadable += discovery.scan.unreadable;
            report.non_executable += discovery.scan.non_executable().count();

            let group = builder.add_root(&discovery.root);
            for entry in discovery.scan.binaries() {
                let source = mapper.map_binary(&entry.relative).await;
                builder.add_leaf(group, TestLeaf::new(entry.path.clone(), &entry.relative, source));
            }
        }

        self.tree = builder.build();
        self.config = config;
        report.leaves = self.tree.leaves().len();

        info!(
            "Discovered {} tests in {} roots ({} skipped)",
            report.leaves, report.roots_scanned, report.roots_skipped
        );
        Ok(report)
    }

    /// Runs the selected tests one after another.
    ///
    /// An empty selection runs every test. After cancellation the remaining
    /// tests are reported as skipped.
    pub async fn run(
        &self,
        selection: &[String],
        reporter: &mut dyn RunReporter,
        cancel: &CancelToken,
    ) -> RunSummary {
        let leaves: Vec<TestLeaf> = self.tree.select(selection).into_iter().cloned().collect();
        for leaf in &leaves {
            reporter.enqueued(leaf);
        }

        let mut summary = RunSummary::default();
        for leaf in &leaves {
            if cancel.is_cancelled() {
                reporter.skipped(leaf);
                summary.skipped += 1;
                continue;
            }

            reporter.started(leaf);
            let result = self
                .executor
                .run(&leaf.executable, cancel.clone(), |chunk| {
                    reporter.output(Some(leaf), chunk.text())
                })
                .await;
            summary.record(&result);
            reporter.finished(leaf, &result);
        }

        summary
    }

    /// Starts a debugger for each selected test.
    pub async fn debug(
        &self,
        selection: &[String],
        debugger: &dyn Debugger,
        reporter: &mut dyn RunReporter,
    ) -> RunSummary {
        let leaves: Vec<TestLeaf> = self.tree.select(selection).into_iter().cloned().collect();
        let mut summary = RunSummary::default();

        for leaf in &leaves {
            reporter.enqueued(leaf);
            reporter.started(leaf);
            let result = debug_leaf(debugger, leaf, &self.workspace_root, self.config.debugger).await;
            summary.record(&result);
            reporter.finished(leaf, &result);
        }

        summary
    }
}

/// Detects configuration changes by polling file metadata.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last: Option<(SystemTime, u64)>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = stamp(&path);
        Self { path, last }
    }

    /// Returns true once per observed change, creation or removal.
    pub fn poll(&mut self) -> bool {
        let current = stamp(&self.path);
        if current == self.last {
            return false;
        }
        self.last = current;
        true
    }
}

fn stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}
