//! Include resolution across several documents.

mod common;

use common::init_logger;
use kiln_materials::{DocumentLoader, MaterialError, MemorySource};
use rstest::rstest;

fn material_ids(source: &MemorySource, root: &str) -> Vec<String> {
    let document = DocumentLoader::new(source).load(root).unwrap();
    document
        .materials()
        .iter()
        .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
        .map(str::to_string)
        .collect()
}

fn diamond() -> MemorySource {
    let source = MemorySource::new();
    source.insert_str(
        "root.json",
        r#"{"includes": ["left.json", "right.json"], "materials": [{"id": "root"}]}"#,
    );
    source.insert_str(
        "left.json",
        r#"{"includes": ["common/base.json"], "materials": [{"id": "left"}]}"#,
    );
    source.insert_str(
        "right.json",
        r#"{"includes": ["common/base.json"], "materials": [{"id": "right"}]}"#,
    );
    source.insert_str(
        "common/base.json",
        r#"{"materials": [{"id": "base"}], "renderPasses": []}"#,
    );
    source
}

#[test]
fn test_transitive_cycle() {
    init_logger();
    let source = MemorySource::new();
    source.insert_str("a.json", r#"{"includes": ["b.json"]}"#);
    source.insert_str("b.json", r#"{"includes": ["nested/c.json"]}"#);
    source.insert_str("nested/c.json", r#"{"includes": ["../a.json"]}"#);

    let failure = DocumentLoader::new(&source).load("a.json").unwrap_err();
    match &failure.errors[..] {
        [MaterialError::IncludeCycle { chain }] => {
            assert_eq!(chain, &["a.json", "b.json", "nested/c.json", "a.json"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn test_diamond_is_not_a_cycle() {
    init_logger();
    let source = diamond();
    let document = DocumentLoader::new(&source).load("root.json").unwrap();
    assert_eq!(document.files().len(), 4);
    assert_eq!(material_ids(&source, "root.json"), ["base", "left", "right", "root"]);
}

#[test]
fn test_order_is_deterministic() {
    init_logger();
    let source = diamond();
    let first = material_ids(&source, "root.json");
    for _ in 0..8 {
        assert_eq!(material_ids(&source, "root.json"), first);
    }
}

#[rstest]
#[case::missing_include(r#"{"includes": ["missing.json"]}"#)]
#[case::escaping_include(r#"{"includes": ["../../outside.json"]}"#)]
fn test_bad_include_fails_load(#[case] root: &str) {
    init_logger();
    let source = MemorySource::new();
    source.insert_str("root.json", root);

    let failure = DocumentLoader::new(&source).load("root.json").unwrap_err();
    assert_eq!(failure.errors.len(), 1);
    assert!(matches!(
        failure.errors[0],
        MaterialError::FileNotFound(_) | MaterialError::InvalidPath { .. }
    ));
}
