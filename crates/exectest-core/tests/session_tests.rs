use async_trait::async_trait;
use exectest_core::config::DEFAULT_CONFIG_FILE;
use exectest_core::debug::{DebugError, LaunchDescriptor};
use exectest_core::{
    CancelToken, ConfigError, Debugger, DebuggerBackend, RunReporter, RunResult, Session,
    SessionError, TestLeaf, TestNode,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

fn script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn source(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "int main(void) { return 0; }\n").unwrap();
}

const CONFIG: &str = r#"{
    "testRoots": [
        { "label": "Unit", "workspacePath": "build", "pattern": "test_*" },
    ],
    "debugger": "lldb",
}"#;

/// A workspace with one passing and one failing test under `build/unit`.
fn create_workspace() -> (TempDir, Session) {
    let temp = TempDir::new().unwrap();
    let ws = temp.path();

    script(&ws.join("build/unit/test_pass"), "echo ok");
    script(&ws.join("build/unit/test_fail"), "echo nope >&2\nexit 1");
    fs::write(ws.join("build/unit/test_notes.txt"), "not a test").unwrap();
    script(&ws.join("build/unit/helper"), "exit 0");
    source(&ws.join("src/test_pass.c"));
    source(&ws.join("tests/unit/test_pass.c"));
    fs::write(ws.join(DEFAULT_CONFIG_FILE), CONFIG).unwrap();

    let session = Session::open(ws, None).unwrap();
    (temp, session)
}

#[derive(Default)]
struct RecordingReporter {
    events: Vec<String>,
    output: String,
}

impl RunReporter for RecordingReporter {
    fn enqueued(&mut self, leaf: &TestLeaf) {
        self.events.push(format!("enqueued {}", leaf.label));
    }

    fn started(&mut self, leaf: &TestLeaf) {
        self.events.push(format!("started {}", leaf.label));
    }

    fn output(&mut self, _leaf: Option<&TestLeaf>, text: &str) {
        self.output.push_str(text);
    }

    fn finished(&mut self, leaf: &TestLeaf, result: &RunResult) {
        let status = match result {
            RunResult::Passed { .. } => "passed",
            RunResult::Failed { .. } => "failed",
            RunResult::Errored { .. } => "errored",
        };
        self.events.push(format!("{status} {}", leaf.label));
    }

    fn skipped(&mut self, leaf: &TestLeaf) {
        self.events.push(format!("skipped {}", leaf.label));
    }
}

#[tokio::test]
async fn test_discover_builds_tree() {
    let (_temp, mut session) = create_workspace();
    let report = session.discover().await.unwrap();

    assert_eq!(report.roots_scanned, 1);
    assert_eq!(report.roots_skipped, 0);
    assert_eq!(report.leaves, 2);
    assert_eq!(report.non_executable, 1);

    let tree = session.tree();
    assert_eq!(tree.roots.len(), 1);
    assert_eq!(tree.roots[0].label(), "Unit");
    let TestNode::Group(root) = &tree.roots[0] else {
        panic!("expected group");
    };
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].label(), "unit");

    let labels: Vec<_> = tree.leaves().iter().map(|l| l.label.clone()).collect();
    assert_eq!(labels, vec!["test_fail", "test_pass"]);
}

#[tokio::test]
async fn test_discover_maps_sources() {
    let (temp, mut session) = create_workspace();
    session.discover().await.unwrap();

    let ws = temp.path().canonicalize().unwrap();
    let leaves = session.tree().leaves();
    let pass = leaves.iter().find(|l| l.label == "test_pass").unwrap();
    let fail = leaves.iter().find(|l| l.label == "test_fail").unwrap();

    assert_eq!(pass.source, Some(ws.join("tests/unit/test_pass.c")));
    assert_eq!(pass.relative_path, "unit/test_pass");
    assert_eq!(fail.source, None);
}

#[tokio::test]
async fn test_rediscovery_is_stable() {
    let (_temp, mut session) = create_workspace();
    session.discover().await.unwrap();
    let first = session.tree().clone();

    session.discover().await.unwrap();
    assert_eq!(session.tree(), &first);
}

#[tokio::test]
async fn test_config_error_keeps_previous_tree() {
    let (temp, mut session) = create_workspace();
    session.discover().await.unwrap();
    let before = session.tree().clone();

    fs::write(temp.path().join(DEFAULT_CONFIG_FILE), "{ \"testRoots\": [ { } ] }").unwrap();
    let err = session.discover().await.unwrap_err();

    assert!(matches!(err, SessionError::Config(ConfigError::Invalid { .. })));
    assert_eq!(session.tree(), &before);
}

#[tokio::test]
async fn test_missing_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let mut session = Session::open(temp.path(), None).unwrap();

    let err = session.discover().await.unwrap_err();
    assert!(matches!(err, SessionError::Config(ConfigError::Missing(_))));
    assert!(session.tree().is_empty());

    assert!(session.create_default_config().unwrap());
    assert!(!session.create_default_config().unwrap());
    script(&temp.path().join("build/test_x"), "exit 0");
    assert_eq!(session.discover().await.unwrap().leaves, 1);
}

#[tokio::test]
async fn test_unresolvable_root_is_skipped() {
    let (temp, mut session) = create_workspace();
    fs::write(
        temp.path().join(DEFAULT_CONFIG_FILE),
        r#"{ "testRoots": [
            { "workspacePath": "missing", "pattern": "*" },
            { "path": "./build", "pattern": "test_p*" },
        ] }"#,
    )
    .unwrap();

    let report = session.discover().await.unwrap();
    assert_eq!(report.roots_skipped, 1);
    assert_eq!(report.leaves, 1);
    assert_eq!(
        session.tree().roots[0].label(),
        session.workspace_root().join("build").display().to_string()
    );
}

#[tokio::test]
async fn test_run_all_reports_each_test() {
    let (_temp, mut session) = create_workspace();
    session.discover().await.unwrap();

    let mut reporter = RecordingReporter::default();
    let summary = session.run(&[], &mut reporter, &CancelToken::new()).await;

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.all_passed());
    assert_eq!(
        reporter.events,
        vec![
            "enqueued test_fail",
            "enqueued test_pass",
            "started test_fail",
            "failed test_fail",
            "started test_pass",
            "passed test_pass",
        ]
    );
    assert!(reporter.output.contains("nope\r\n"));
    assert!(reporter.output.contains("ok\r\n"));
}

#[tokio::test]
async fn test_run_selection() {
    let (_temp, mut session) = create_workspace();
    session.discover().await.unwrap();

    let pass = session
        .tree()
        .leaves()
        .into_iter()
        .find(|l| l.label == "test_pass")
        .unwrap()
        .id
        .clone();
    let group = session.tree().roots[0].id().to_string();

    let mut reporter = RecordingReporter::default();
    let summary = session
        .run(&[pass.clone()], &mut reporter, &CancelToken::new())
        .await;
    assert_eq!(summary.total(), 1);
    assert!(summary.all_passed());

    // overlapping selections run each test once
    let mut reporter = RecordingReporter::default();
    let summary = session
        .run(&[pass, group, "unknown".to_string()], &mut reporter, &CancelToken::new())
        .await;
    assert_eq!(summary.total(), 2);
}

#[tokio::test]
async fn test_cancelled_run_skips_remaining() {
    let (_temp, mut session) = create_workspace();
    session.discover().await.unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut reporter = RecordingReporter::default();
    let summary = session.run(&[], &mut reporter, &cancel).await;

    assert_eq!(summary.skipped, 2);
    assert!(reporter.events.iter().all(|e| !e.starts_with("started")));
}

#[derive(Default)]
struct RecordingDebugger {
    launched: Mutex<Vec<LaunchDescriptor>>,
}

#[async_trait]
impl Debugger for RecordingDebugger {
    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), DebugError> {
        self.launched.lock().unwrap().push(descriptor.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_debug_uses_configured_backend() {
    let (_temp, mut session) = create_workspace();
    session.discover().await.unwrap();
    let ids: Vec<String> = session.tree().leaves().iter().map(|l| l.id.clone()).collect();

    let debugger = RecordingDebugger::default();
    let mut reporter = RecordingReporter::default();
    let summary = session.debug(&ids[..1], &debugger, &mut reporter).await;

    assert_eq!(summary.passed, 1);
    let launched = debugger.launched.lock().unwrap();
    assert_eq!(launched.len(), 1);
    assert_eq!(launched[0].backend, DebuggerBackend::Lldb);
    assert_eq!(launched[0].cwd, session.workspace_root());
    assert_eq!(
        launched[0].program,
        PathBuf::from(&session.tree().leaves()[0].executable)
    );
}
