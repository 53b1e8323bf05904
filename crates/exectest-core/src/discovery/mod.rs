//! Discovery of test binaries under resolved roots.
//!
//! Each root is scanned on the blocking pool so roots proceed concurrently,
//! but results are returned in root order so the tree never depends on which
//! scan finished first.

mod pattern;
mod walker;

pub use pattern::{BasenamePattern, PatternError};
pub use walker::{is_executable, scan_root, RootScan, ScanEntry};

use futures::future::join_all;
use thiserror::Error;

use crate::resolve::ResolvedRoot;

/// Errors that skip one root during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid pattern for root {index}: {source}")]
    Pattern {
        index: usize,
        #[source]
        source: PatternError,
    },

    #[error("Scan of root {index} did not complete: {message}")]
    Aborted { index: usize, message: String },
}

/// Scan results for one root.
#[derive(Debug, Clone)]
pub struct RootDiscovery {
    pub root: ResolvedRoot,
    pub scan: RootScan,
}

/// Scans every root concurrently, returning results in input order.
pub async fn scan_roots(roots: Vec<ResolvedRoot>) -> Vec<Result<RootDiscovery, DiscoveryError>> {
    let tasks = roots.into_iter().map(|root| async move {
        let index = root.index;
        let pattern = BasenamePattern::new(&root.spec.pattern)
            .map_err(|source| DiscoveryError::Pattern { index, source })?;

        let dir = root.dir.clone();
        let scan = tokio::task::spawn_blocking(move || scan_root(&dir, &pattern))
            .await
            .map_err(|e| DiscoveryError::Aborted {
                index,
                message: e.to_string(),
            })?;

        Ok::<_, DiscoveryError>(RootDiscovery { root, scan })
    });

    join_all(tasks).await
}
