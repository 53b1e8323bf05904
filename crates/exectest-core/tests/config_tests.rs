use exectest_core::config::{DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_TEMPLATE, DEFAULT_SOURCE_EXTENSIONS};
use exectest_core::{create_default_config, ConfigError, DebuggerBackend, RootLocation, TestConfig};
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = TestConfig::default();
    assert!(config.roots.is_empty());
    assert_eq!(config.source_extensions, DEFAULT_SOURCE_EXTENSIONS);
    assert_eq!(config.debugger, DebuggerBackend::Gdb);
}

#[test]
fn test_config_from_jsonc() {
    let text = r#"
{
    // unit tests
    "testRoots": [
        {
            "label": "Unit",
            "groupByLabel": true,
            "workspacePath": "build/unit", /* relative */
            "pattern": "test_*",
        },
        { "path": "~/out", "pattern": "*_check" },
    ],
    "sourceExtensions": [".c", "cpp"],
    "debugger": "lldb",
}
"#;
    let config = TestConfig::parse(text).unwrap();

    assert_eq!(config.roots.len(), 2);
    assert_eq!(config.roots[0].label.as_deref(), Some("Unit"));
    assert!(config.roots[0].group_by_label);
    assert_eq!(
        config.roots[0].location,
        RootLocation::Workspace("build/unit".to_string())
    );
    assert_eq!(config.roots[1].location, RootLocation::Path("~/out".to_string()));
    assert!(!config.roots[1].group_by_label);
    assert_eq!(config.source_extensions, vec!["c", "cpp"]);
    assert_eq!(config.debugger, DebuggerBackend::Lldb);
}

#[test]
fn test_comment_markers_inside_strings_are_kept() {
    let text = r#"{ "testRoots": [ { "path": "/srv//builds/*", "pattern": "t/*x*/" } ] }"#;
    // pattern ends in a separator, which is a discovery error, not a config one
    let config = TestConfig::parse(text).unwrap();
    assert_eq!(config.roots[0].location.raw(), "/srv//builds/*");
    assert_eq!(config.roots[0].pattern, "t/*x*/");
}

#[test]
fn test_syntax_error_reports_position() {
    let err = TestConfig::parse("{\n  \"testRoots\": [\n    { \"pattern\" \"x\" }\n  ]\n}").unwrap_err();
    match err {
        ConfigError::ParseError { line, .. } => assert_eq!(line, 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_wrong_field_types_are_rejected() {
    let cases = [
        r#"{ "testRoots": {} }"#,
        r#"{ "testRoots": [ 3 ] }"#,
        r#"{ "testRoots": [ { "workspacePath": 1, "pattern": "t*" } ] }"#,
        r#"{ "testRoots": [ { "workspacePath": "b", "pattern": "" } ] }"#,
        r#"{ "testRoots": [ { "workspacePath": "b", "pattern": "t*", "label": 2 } ] }"#,
        r#"{ "testRoots": [ { "workspacePath": "b", "pattern": "t*", "groupByLabel": "yes" } ] }"#,
        r#"{ "sourceExtensions": "c" }"#,
        r#"{ "debugger": "windbg" }"#,
        r#"[]"#,
    ];

    for text in cases {
        assert!(
            matches!(TestConfig::parse(text), Err(ConfigError::Invalid { .. })),
            "accepted {text}"
        );
    }
}

#[test]
fn test_whitespace_pattern_is_kept_verbatim() {
    let config =
        TestConfig::parse(r#"{ "testRoots": [ { "workspacePath": "b", "pattern": " " } ] }"#)
            .unwrap();
    assert_eq!(config.roots[0].pattern, " ");
}

#[test]
fn test_one_bad_root_rejects_whole_config() {
    let text = r#"{ "testRoots": [
        { "workspacePath": "good", "pattern": "t*" },
        { "workspacePath": "bad" }
    ] }"#;
    let err = TestConfig::parse(text).unwrap_err();
    assert!(err.to_string().contains("testRoots[1]"));
}

#[test]
fn test_from_file_missing() {
    let temp = TempDir::new().unwrap();
    let err = TestConfig::from_file(temp.path().join(DEFAULT_CONFIG_FILE)).unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[test]
fn test_create_default_config_never_overwrites() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join(DEFAULT_CONFIG_FILE);

    assert!(create_default_config(&path).unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_TEMPLATE);

    std::fs::write(&path, "{ \"testRoots\": [] }").unwrap();
    assert!(!create_default_config(&path).unwrap());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ \"testRoots\": [] }");

    let config = TestConfig::from_file(&path).unwrap();
    assert!(config.roots.is_empty());
}
