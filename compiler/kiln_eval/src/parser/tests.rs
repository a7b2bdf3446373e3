#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use super::*;
use kiln_ir::ContentHash;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn member_hashes(source: &str) -> Vec<ContentHash> {
    parse(source)
        .unwrap()
        .root
        .members
        .iter()
        .map(|m| m.src_hash)
        .collect()
}

/// The first member's value, which must be a container expression.
fn first_container(file: &SourceFile) -> &ContainerAst {
    let MemberValue::Const { value, .. } = &file.root.members[0].value else {
        panic!("not a const");
    };
    match &file.arena.get(*value).kind {
        ExprKind::Container(container) => container,
        other => panic!("not a container: {other:?}"),
    }
}

#[test]
fn members_of_every_kind() {
    let file = parse(
        r#"
const a = 1;
pub export fn f() !void { return error.Oops; }
test "math" { a; }
test {}
comptime { @export(a, "a"); }
pub usingnamespace struct { x: i32, pub const y = 2; };
"#,
    )
    .unwrap();

    let summary: Vec<(MemberName, bool, bool)> = file
        .root
        .members
        .iter()
        .map(|m| (m.name.clone(), m.is_pub, m.is_export))
        .collect();
    assert_eq!(
        summary,
        vec![
            (MemberName::Named("a".to_owned()), false, false),
            (MemberName::Named("f".to_owned()), true, true),
            (MemberName::Test(Some("math".to_owned())), false, false),
            (MemberName::Test(None), false, false),
            (MemberName::Comptime, false, false),
            (MemberName::Usingnamespace, true, false),
        ]
    );
    let MemberValue::Func(func) = &file.root.members[1].value else {
        panic!("not a function");
    };
    assert!(func.inferred_error_set);
    assert!(matches!(func.body.as_slice(), [Stmt::Return { value: Some(_), .. }]));
}

#[test]
fn fields_and_members_mix_in_containers() {
    let file = parse("const S = struct { a: u8, b: *const S, pub const c = 1; d: i32 };").unwrap();
    let container = first_container(&file);

    let names: Vec<&str> = container.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "d"]);
    assert_eq!(container.members.len(), 1);
    let b_ty = container.fields[1].ty.unwrap();
    assert!(matches!(
        file.arena.get(b_ty).kind,
        ExprKind::PtrType { is_const: true, .. }
    ));
}

#[test]
fn nodes_span_their_source() {
    let source = "const a = 1;\nconst b = a + @sizeOf(u8);\n";
    let file = parse(source).unwrap();
    let span_text = |node: u32| {
        let span = file.tree.node_span(node).unwrap();
        &source[span.to_range()]
    };

    assert_eq!(span_text(0), source);
    let b = &file.root.members[1];
    assert_eq!(span_text(b.node), "const b = a + @sizeOf(u8);");
    let MemberValue::Const { value, .. } = b.value else {
        panic!("not a const");
    };
    assert_eq!(span_text(file.arena.get(value).node), "a + @sizeOf(u8)");
}

#[test]
fn hashes_ignore_layout() {
    let compact = member_hashes("const a = 1; const b = a;");
    let spread = member_hashes("// header\nconst a =\n    1;\n\nconst b = a; // same\n");
    assert_eq!(compact, spread);
}

#[test]
fn hashes_change_with_tokens() {
    let before = member_hashes("const a = 1; const b = a;");
    let after = member_hashes("const a = 01; const b = a;");
    assert_ne!(before[0], after[0]);
    assert_eq!(before[1], after[1]);
}

#[test]
fn nested_members_do_not_change_the_outer_hash() {
    let before = parse("const S = struct { x: u8, const inner = 1; };").unwrap();
    let after = parse("const S = struct { x: u8, const inner = 2; };").unwrap();
    assert_eq!(before.root.members[0].src_hash, after.root.members[0].src_hash);
    assert_eq!(first_container(&before).fields_hash, first_container(&after).fields_hash);
    assert_ne!(
        first_container(&before).members[0].src_hash,
        first_container(&after).members[0].src_hash
    );
}

#[test]
fn fields_change_the_outer_hash() {
    let before = parse("const S = struct { x: u8, const inner = 1; };").unwrap();
    let after = parse("const S = struct { x: u16, const inner = 1; };").unwrap();
    assert_ne!(before.root.members[0].src_hash, after.root.members[0].src_hash);
    assert_ne!(first_container(&before).fields_hash, first_container(&after).fields_hash);
}

#[test]
fn errors_point_at_the_offending_token() {
    let err = parse("const a = 1").unwrap_err();
    assert_eq!(err.message, "expected ';', found end of file");
    assert_eq!(err.byte_offset, 11);

    let err = parse("const a = 1;\n+").unwrap_err();
    assert_eq!(err.message, "expected declaration or field, found '+'");
    assert_eq!(err.byte_offset, 13);

    let err = parse("pub comptime {}").unwrap_err();
    assert_eq!(err.message, "expected declaration, found 'comptime'");
}

#[test]
fn invalid_characters_are_parse_errors() {
    let err = parse("const a = $;").unwrap_err();
    assert_eq!(err.message, "invalid character '$'");
    assert_eq!(err.byte_offset, 10);
}

#[test]
fn strings_are_unescaped() {
    assert_eq!(unescape(r#""a\"b\n""#), "a\"b\n");
    assert_eq!(unescape(r#""plain""#), "plain");
}

proptest! {
    #[test]
    fn hashes_survive_any_spacing(values in prop::collection::vec(0u32..1000, 1..6), gap in "[ \n\t]{1,4}") {
        let tight: String = values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("const d{i} = {v};"))
            .collect();
        let loose: String = values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{gap}const{gap}d{i}{gap}={gap}{v}{gap};{gap}"))
            .collect();
        prop_assert_eq!(member_hashes(&tight), member_hashes(&loose));
    }
}
