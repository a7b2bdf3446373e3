#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use kiln_ir::lowered::ContainerSpec;
use kiln_ir::{ContainerKind, ContentHash, IrBuilder, Span};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lowers any source to an empty struct; `!!` is a parse error.
#[derive(Default)]
struct CountingLowerer {
    lowered: AtomicUsize,
}

impl Lowerer for CountingLowerer {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        if let Some(offset) = source.find("!!") {
            return Err(ParseError {
                message: "unexpected '!'".to_owned(),
                byte_offset: u32::try_from(offset).unwrap(),
            });
        }
        let mut tree = SyntaxTree::new();
        tree.push(Span::new(0, u32::try_from(source.len()).unwrap()));
        Ok(tree)
    }

    fn lower(&self, source: &str, _tree: &SyntaxTree) -> LoweredIr {
        self.lowered.fetch_add(1, Ordering::SeqCst);
        let mut builder = IrBuilder::new();
        builder.set_main_struct(&ContainerSpec {
            kind: ContainerKind::Struct,
            fields_hash: ContentHash::of_bytes(source.as_bytes()),
            src_node: 0,
            fields: &[],
            decls: &[],
        });
        builder.finish()
    }
}

fn input(path: &Path) -> LoadInput {
    LoadInput {
        file: FileIndex::new(0),
        path: path.to_path_buf(),
        prev_stat: None,
        has_current_ir: false,
    }
}

fn lowered(outcome: LoadOutcome) -> Lowered {
    match outcome {
        LoadOutcome::Lowered(lowered) => lowered,
        other => panic!("expected lowered IR, got {other:?}"),
    }
}

#[test]
fn unchanged_stat_skips_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const a = 1;").unwrap();
    let lowerer = CountingLowerer::default();

    let first = lowered(load_file(&input(&path), &lowerer, None));
    let again = LoadInput {
        prev_stat: Some(first.stat),
        has_current_ir: true,
        ..input(&path)
    };

    assert!(matches!(load_file(&again, &lowerer, None), LoadOutcome::Unchanged));
    assert_eq!(lowerer.lowered.load(Ordering::SeqCst), 1);
}

#[test]
fn second_load_hits_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const a = 1;").unwrap();
    let cache = IrCache::new(&dir.path().join("cache"), ContentHash::new(7));
    let lowerer = CountingLowerer::default();

    let first = lowered(load_file(&input(&path), &lowerer, Some(&cache)));
    assert!(first.source.is_some());

    let second = lowered(load_file(&input(&path), &lowerer, Some(&cache)));

    assert_eq!(lowerer.lowered.load(Ordering::SeqCst), 1);
    assert!(second.source.is_none());
    assert_eq!(*second.ir, *first.ir);
}

#[test]
fn edited_file_is_lowered_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const a = 1;").unwrap();
    let cache = IrCache::new(dir.path(), ContentHash::new(7));
    let lowerer = CountingLowerer::default();

    let first = lowered(load_file(&input(&path), &lowerer, Some(&cache)));
    std::fs::write(&path, "const a = 12345;").unwrap();
    let second = lowered(load_file(&input(&path), &lowerer, Some(&cache)));

    assert_eq!(lowerer.lowered.load(Ordering::SeqCst), 2);
    assert_ne!(first.stat, second.stat);
    assert_ne!(*first.ir, *second.ir);
}

#[test]
fn compiler_hash_separates_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    let a = IrCache::new(dir.path(), ContentHash::new(1));
    let b = IrCache::new(dir.path(), ContentHash::new(2));
    assert_ne!(a.entry_path(&path), b.entry_path(&path));
}

#[test]
fn parse_failure_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const !! = 1;").unwrap();
    let cache = IrCache::new(dir.path(), ContentHash::ZERO);
    let lowerer = CountingLowerer::default();

    let outcome = load_file(&input(&path), &lowerer, Some(&cache));

    match outcome {
        LoadOutcome::ParseFailed { error, .. } => assert_eq!(error.byte_offset, 6),
        other => panic!("expected a parse failure, got {other:?}"),
    }
    let entry = std::fs::metadata(cache.entry_path(&path)).unwrap();
    assert_eq!(entry.len(), 0);
}

#[test]
fn corrupt_entry_is_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const a = 1;").unwrap();
    let cache = IrCache::new(dir.path(), ContentHash::ZERO);
    std::fs::create_dir_all(cache.entry_path(&path).parent().unwrap()).unwrap();
    std::fs::write(cache.entry_path(&path), b"not a cache file at all").unwrap();
    let lowerer = CountingLowerer::default();

    lowered(load_file(&input(&path), &lowerer, Some(&cache)));
    lowered(load_file(&input(&path), &lowerer, Some(&cache)));

    assert_eq!(lowerer.lowered.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_file_is_a_read_failure() {
    let dir = tempfile::tempdir().unwrap();
    let lowerer = CountingLowerer::default();
    let outcome = load_file(&input(&dir.path().join("nope.kn")), &lowerer, None);
    assert!(matches!(outcome, LoadOutcome::ReadFailed(LoadError::Io { .. })));
}
