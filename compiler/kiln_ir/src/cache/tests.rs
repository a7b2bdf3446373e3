#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use crate::lowered::{ContainerSpec, DeclName, DeclSpec, IrBuilder};
use crate::{ContainerKind, ContentHash, InstIndex};
use pretty_assertions::assert_eq;
use std::io::Cursor;

fn sample_ir() -> LoweredIr {
    let mut b = IrBuilder::new();
    let name = b.string("answer");
    let value = b.add_int(42);
    let decl = b.add_declaration(&DeclSpec {
        name: DeclName::Named(name),
        is_pub: true,
        is_export: false,
        src_hash: ContentHash::new(0xdead_beef),
        src_node: 1,
        body: &[value],
    });
    b.set_main_struct(&ContainerSpec {
        kind: ContainerKind::Struct,
        fields_hash: ContentHash::ZERO,
        src_node: 0,
        fields: &[],
        decls: &[decl],
    });
    b.finish()
}

fn stat() -> FileStat {
    FileStat {
        size: 18,
        inode: 77,
        mtime: 1_700_000_000_000_000_000,
    }
}

#[test]
fn written_ir_reads_back_identically() {
    let ir = sample_ir();
    let mut bytes = Vec::new();
    write_ir(&mut bytes, &ir, stat()).unwrap();

    let mut reader = Cursor::new(bytes);
    let header = read_header(&mut reader).unwrap();
    assert_eq!(header.stat, stat());
    assert_eq!(header.instructions_len as usize, ir.tags.len());
    let decoded = read_body(&mut reader, &header).unwrap();
    assert_eq!(decoded, ir);
    assert_eq!(decoded.decl_names(InstIndex::MAIN_STRUCT), vec!["answer"]);
}

#[test]
fn wrong_magic_is_rejected() {
    let mut bytes = Vec::new();
    write_ir(&mut bytes, &sample_ir(), stat()).unwrap();
    bytes[0] = b'X';
    let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, IrCacheError::BadMagic));
}

#[test]
fn truncated_body_is_an_error() {
    let mut bytes = Vec::new();
    write_ir(&mut bytes, &sample_ir(), stat()).unwrap();
    bytes.truncate(bytes.len() - 3);
    let mut reader = Cursor::new(bytes);
    let header = read_header(&mut reader).unwrap();
    let err = read_body(&mut reader, &header).unwrap_err();
    assert!(matches!(err, IrCacheError::Io(_)));
}

#[test]
fn invalid_tag_is_rejected() {
    let ir = sample_ir();
    let mut bytes = Vec::new();
    write_ir(&mut bytes, &ir, stat()).unwrap();
    let header_len = bincode::serialized_size(&CacheHeader::for_ir(&ir, stat()).unwrap()).unwrap();
    bytes[usize::try_from(header_len).unwrap()] = 200;
    let mut reader = Cursor::new(bytes);
    let header = read_header(&mut reader).unwrap();
    let err = read_body(&mut reader, &header).unwrap_err();
    assert!(matches!(err, IrCacheError::InvalidTag { index: 0, tag: 200 }));
}

#[test]
fn stat_of_real_file_tracks_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.kn");
    std::fs::write(&path, "const A = 1;").unwrap();
    let metadata = std::fs::metadata(&path).unwrap();
    let stat = FileStat::from_metadata(&metadata);
    assert_eq!(stat.size, 12);
}
