#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use crate::parser::parse;
use kiln_ir::IrCompileError;
use pretty_assertions::assert_eq;

fn lower_source(source: &str) -> LoweredIr {
    lower(&parse(source).unwrap())
}

fn main_decls(ir: &LoweredIr) -> Vec<InstIndex> {
    ir.container(InstIndex::MAIN_STRUCT).unwrap().decls().collect()
}

/// Tag of the value instruction of the `n`th top-level declaration.
fn value_tag(ir: &LoweredIr, n: usize) -> InstTag {
    let decl = ir.declaration(main_decls(ir)[n]).unwrap();
    ir.tag(decl.value().unwrap()).unwrap()
}

#[test]
fn declarations_keep_names_flags_and_hashes() {
    let source = "pub const a = 1;\nexport const b: u8 = a;\ntest \"t\" {}\ncomptime {}\n";
    let file = parse(source).unwrap();
    let ir = lower(&file);

    assert!(!ir.has_compile_errors());
    let decls: Vec<_> = main_decls(&ir)
        .into_iter()
        .map(|inst| ir.declaration(inst).unwrap())
        .collect();
    assert_eq!(decls.len(), 4);
    assert!(matches!(decls[0].name, DeclName::Named(s) if ir.string(s) == "a"));
    assert!(decls[0].is_pub && !decls[0].is_export);
    assert!(decls[1].is_export);
    assert!(matches!(decls[2].name, DeclName::NamedTest(s) if ir.string(s) == "t"));
    assert_eq!(decls[3].name, DeclName::Comptime);
    assert_eq!(decls[0].src_hash, file.root.members[0].src_hash);
    assert_eq!(decls[1].src_node, file.root.members[1].node);

    // Type annotation first, then the value.
    let body: Vec<InstIndex> = decls[1].body_insts().collect();
    assert_eq!(ir.tag(body[0]), Some(InstTag::IntType));
    assert_eq!(ir.tag(body[1]), Some(InstTag::DeclVal));
    assert_eq!(ir.string(NullTerminatedString(ir.data(body[1]).a)), "a");
}

#[test]
fn identifiers_naming_types_lower_to_types() {
    let ir = lower_source("const a = u7;\nconst b = usize;\nconst c = type;\nconst d = u7x;\n");
    assert_eq!(value_tag(&ir, 0), InstTag::IntType);
    assert_eq!(value_tag(&ir, 1), InstTag::IntType);
    assert_eq!(value_tag(&ir, 2), InstTag::PrimType);
    assert_eq!(value_tag(&ir, 3), InstTag::DeclVal);

    let a = ir.declaration(main_decls(&ir)[0]).unwrap().value().unwrap();
    assert_eq!(ir.data(a).b, 7);
    let b = ir.declaration(main_decls(&ir)[1]).unwrap().value().unwrap();
    assert_eq!((ir.data(b).a, ir.data(b).b), (0, 64));
}

#[test]
fn functions_and_tests_lower_to_func() {
    let ir = lower_source("fn f() !i32 { g(); return error.Bad; }\ntest { f(); }\n");
    let decls = main_decls(&ir);

    let f = ir.func(ir.declaration(decls[0]).unwrap().value().unwrap()).unwrap();
    assert!(f.inferred_error_set);
    assert_eq!(ir.tag(f.ret_type.unwrap()), Some(InstTag::IntType));
    let body: Vec<InstTag> = f.body_insts().map(|i| ir.tag(i).unwrap()).collect();
    assert_eq!(body, vec![InstTag::Call, InstTag::Return]);

    let t = ir.func(ir.declaration(decls[1]).unwrap().value().unwrap()).unwrap();
    assert!(t.inferred_error_set);
    assert_eq!(t.ret_type, None);
}

#[test]
fn nested_containers_are_found_from_their_declaration() {
    let ir = lower_source(
        "const S = struct { inner: struct { x: u8 }, const T = enum { a, b }; };\n",
    );
    let decl = main_decls(&ir)[0];
    let found = ir.find_decls(decl);
    // `S` and its field's anonymous struct; `T` belongs to S's namespace.
    assert_eq!(found.len(), 2);
    assert_eq!(ir.tag(found[0]), Some(InstTag::StructDecl));
    let s = ir.container(found[0]).unwrap();
    assert_eq!(s.fields_len(), 1);
    assert_eq!(s.decls_len(), 1);
}

#[test]
fn export_builtin_records_name_and_section() {
    let ir = lower_source("comptime { @export(a, \"sym\", \".data\"); }\n");
    let decl = ir.declaration(main_decls(&ir)[0]).unwrap();
    let export = ir.export(decl.value().unwrap()).unwrap();
    assert_eq!(ir.string(export.name), "sym");
    assert_eq!(export.section.map(|s| ir.string(s)), Some(".data"));
    assert_eq!(export.linkage, Linkage::Strong);
    assert_eq!(ir.tag(export.operand), Some(InstTag::DeclVal));
}

#[test]
fn lowering_problems_become_compile_errors() {
    let source = "const a = 99999999999999999999;\nconst b = @nope(1);\nconst c = @sizeOf();\nconst S = struct { x };\ncomptime { return; }\n";
    let ir = lower_source(source);

    assert_eq!(
        ir.compile_errors(),
        vec![
            IrCompileError {
                message: "integer literal '99999999999999999999' is too large".to_owned(),
                byte_offset: 10,
            },
            IrCompileError {
                message: "invalid builtin function: '@nope'".to_owned(),
                byte_offset: 42,
            },
            IrCompileError {
                message: "expected 1 argument(s), found 0".to_owned(),
                byte_offset: 62,
            },
            IrCompileError {
                message: "struct field 'x' needs a type".to_owned(),
                byte_offset: 92,
            },
            IrCompileError {
                message: "'return' outside of a function body".to_owned(),
                byte_offset: 108,
            },
        ]
    );
}
