use exectest_core::config::DEFAULT_SOURCE_EXTENSIONS;
use exectest_core::source_map::{score_candidate, SourceMapper, WorkspaceScanner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn write(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "int main(void) { return 0; }\n").unwrap();
}

fn mapper(ws: &Path) -> SourceMapper {
    SourceMapper::new(
        Arc::new(WorkspaceScanner::new(ws)),
        ws,
        DEFAULT_SOURCE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_maps_unique_source() {
    let temp = TempDir::new().unwrap();
    let ws = temp.path();
    write(&ws.join("src/test_one.cpp"));

    let mut mapper = mapper(ws);
    assert_eq!(
        mapper.map_binary(Path::new("test_one")).await,
        Some(ws.join("src/test_one.cpp"))
    );
    assert_eq!(mapper.map_binary(Path::new("test_two")).await, None);
}

#[tokio::test]
async fn test_directory_agreement_wins() {
    let temp = TempDir::new().unwrap();
    let ws = temp.path();
    write(&ws.join("tests/test_a.c"));
    write(&ws.join("modules/net/test_a.c"));
    write(&ws.join("modules/disk/test_a.c"));

    let mut mapper = mapper(ws);
    assert_eq!(
        mapper.map_binary(Path::new("net/test_a")).await,
        Some(ws.join("modules/net/test_a.c"))
    );
    assert_eq!(
        mapper.map_binary(Path::new("disk/test_a")).await,
        Some(ws.join("modules/disk/test_a.c"))
    );
    // no agreeing segment: the tests folder bonus decides
    assert_eq!(
        mapper.map_binary(Path::new("other/test_a")).await,
        Some(ws.join("tests/test_a.c"))
    );
}

#[tokio::test]
async fn test_ignored_and_hidden_sources_are_not_candidates() {
    let temp = TempDir::new().unwrap();
    let ws = temp.path();
    fs::create_dir_all(ws.join(".git")).unwrap();
    fs::write(ws.join(".gitignore"), "vendor/\n").unwrap();
    write(&ws.join("vendor/test_v.c"));
    write(&ws.join(".cache/test_h.c"));

    let mut mapper = mapper(ws);
    assert_eq!(mapper.map_binary(Path::new("test_v")).await, None);
    assert_eq!(mapper.map_binary(Path::new("test_h")).await, None);
}

#[tokio::test]
async fn test_reset_clears_cached_lookups() {
    let temp = TempDir::new().unwrap();
    let ws = temp.path();
    write(&ws.join("test_c.cc"));

    let mut mapper = mapper(ws);
    mapper.map_binary(Path::new("test_c")).await;
    mapper.map_binary(Path::new("test_missing")).await;
    assert_eq!(mapper.cache().len(), 2);

    mapper.reset();
    assert!(mapper.cache().is_empty());
}

#[test]
fn test_score_weights() {
    let ws = PathBuf::from("/ws");
    let binary_dir = Path::new("lib/math");

    // two agreeing segments, no tests folder, depth 2
    assert_eq!(score_candidate(&ws.join("lib/math/t.c"), &ws, binary_dir), 2002);
    // one agreeing segment plus tests folder, depth 2
    assert_eq!(score_candidate(&ws.join("tests/math/t.c"), &ws, binary_dir), 1052);
    // depth bonus is capped
    let deep: PathBuf = (0..30).map(|i| format!("d{i}")).collect();
    assert_eq!(score_candidate(&ws.join(deep).join("t.c"), &ws, binary_dir), 20);
}
