//! Default values for exectest configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

use std::time::Duration;

// ============================================================================
// Configuration File
// ============================================================================

/// Configuration file name, looked up at the workspace root.
pub const DEFAULT_CONFIG_FILE: &str = ".exectest.jsonc";

/// Template written by `create_default_config`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"{
  // Each entry describes one directory to scan for prebuilt test executables.
  //
  //   label         display name for the root (optional)
  //   groupByLabel  nest roots that share a label under one group (optional, default false)
  //   workspacePath directory relative to the workspace root
  //   path          absolute, relative or ~/ directory (use instead of workspacePath)
  //   pattern       basename wildcard, `*` matches any run of characters
  "testRoots": [
    {
      "label": "Tests",
      "workspacePath": "build",
      "pattern": "test_*"
    }
  ]
}
"#;

/// Documentation opened by the `docs` command.
pub const DOCUMENTATION_URL: &str = "https://docs.rs/exectest-core";

// ============================================================================
// Source Mapping Defaults
// ============================================================================

/// Source file extensions searched for `<binary>.<ext>`.
pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];

/// Directory names that earn the conventional-folder bonus.
pub const TEST_FOLDER_NAMES: &[&str] = &["test", "tests"];

/// Weight of each agreeing trailing directory segment.
pub const SUFFIX_MATCH_WEIGHT: u64 = 1000;

/// Bonus for a candidate living under a conventional tests folder.
pub const TEST_FOLDER_BONUS: u64 = 50;

/// Cap on the directory depth bonus.
pub const MAX_DEPTH_BONUS: u64 = 20;

// ============================================================================
// Execution Defaults
// ============================================================================

/// Characters of stdout/stderr kept for failure diagnostics.
pub const DEFAULT_OUTPUT_TAIL_CHARS: usize = 4000;

/// Time between SIGINT and SIGTERM when cancelling.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_millis(300);

/// Time from SIGINT until SIGKILL when cancelling.
pub const DEFAULT_KILL_DEADLINE: Duration = Duration::from_millis(1500);

/// How often the process group is checked while escalating.
pub const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long output readers may drain after the test process exits.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Read buffer size for child output pipes.
pub const OUTPUT_READ_BUFFER: usize = 8 * 1024;

// ============================================================================
// Watch Defaults
// ============================================================================

/// Poll interval for configuration change detection.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(1000);
