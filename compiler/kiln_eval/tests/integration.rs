//! Integration tests for the Kiln reference language.
//!
//! These run whole compilations (load, lower, analyze, codegen) over files
//! on disk and check the resulting values and diagnostics.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

mod common;

use common::Harness;

// =============================================================================
// Evaluation
// =============================================================================

mod evaluation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integers_coerce_to_annotated_types() {
        let h = Harness::new("const a = 40;\nconst b: u8 = a + 2;\nexport const c = b + 1;\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 0);
        assert_eq!(h.value("main.c"), "43");
        assert_eq!(h.type_of("main.c"), "u8");
        assert_eq!(h.type_of("main.a"), "comptime_int");
    }

    #[test]
    fn sizes_of_types() {
        let h = Harness::new(
            r#"
const Pair = struct { a: u8, b: u32 };
const Either = union { a: u8, b: u64 };
const Color = enum { red, green, blue };
const Node = struct { next: *const Node, tag: Color };
export const pair: usize = @sizeOf(Pair);
export const either: usize = @sizeOf(Either);
export const color: usize = @sizeOf(Color);
export const node: usize = @sizeOf(Node);
export const wide: usize = @sizeOf(u24);
"#,
        );

        h.comp.update();

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.pair"), "5");
        assert_eq!(h.value("main.either"), "8");
        assert_eq!(h.value("main.color"), "1");
        assert_eq!(h.value("main.node"), "9");
        assert_eq!(h.value("main.wide"), "4");
        assert_eq!(h.type_of("main.wide"), "u64");
    }

    #[test]
    fn only_referenced_declarations_are_analyzed() {
        let h = Harness::new("const used = 1;\nconst unused = missing;\nexport const e: u8 = used;\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.analyzed, vec!["main", "main.e", "main.used"]);
    }

    #[test]
    fn pointers_to_declarations() {
        let h = Harness::new("const x: u8 = 5;\nexport const p = &x;\n");

        h.comp.update();

        assert_eq!(h.value("main.p"), "&main.x");
        assert_eq!(h.type_of("main.p"), "*const u8");
    }

    #[test]
    fn usingnamespace_brings_in_public_members() {
        let h = Harness::new(
            "const lib = struct { pub const limit = 7; const hidden = 1; };\nusingnamespace lib;\nexport const e: u8 = limit;\n",
        );

        h.comp.update();

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.e"), "7");
    }

    #[test]
    fn private_members_stay_hidden() {
        let h = Harness::new(
            "const lib = struct { pub const limit = 7; const hidden = 1; };\nusingnamespace lib;\nexport const e: u8 = hidden;\n",
        );

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:3:22: use of undeclared identifier 'hidden'"]
        );
    }

    #[test]
    fn error_sets_are_inferred_through_calls() {
        let h = Harness::new(
            "fn fail() !void { return error.Bad; }\nfn other() !void { return error.Worse; fail(); }\nexport fn run() !void { other(); }\n",
        );

        h.comp.update();

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.error_set("main.fail"), "error{Bad}");
        let run = h.error_set("main.run");
        assert!(run.contains("Bad") && run.contains("Worse"), "{run}");
    }

    #[test]
    fn nested_declarations_have_qualified_names() {
        let h = Harness::new(
            "const outer = struct { pub const inner = struct { pub const n = 3; }; };\nexport const e: u8 = @sizeOf(outer) + 1;\n",
        );

        h.comp.update();

        assert_eq!(h.value("main.e"), "1");
        assert!(h.has_decl("main.outer.inner"));
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

mod diagnostics {
    use super::*;
    use pretty_assertions::assert_eq;
    use kiln_diagnostic::ErrorCode;
    use kiln_sema::ExportStatus;

    fn codes(h: &Harness) -> Vec<ErrorCode> {
        h.comp.all_errors().iter().map(|d| d.code).collect()
    }

    #[test]
    fn undeclared_identifiers() {
        let h = Harness::new("const a = 1;\nexport const e = missing;\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 1);
        assert_eq!(
            h.error_lines(),
            vec!["main.kn:2:18: use of undeclared identifier 'missing'"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1001]);
    }

    #[test]
    fn dependency_loops() {
        let h = Harness::new("const a = b;\nconst b = a;\nexport const e = a;\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 1);
        assert_eq!(
            h.error_lines(),
            vec!["main.kn:2:11: dependency loop detected: 'main.a' depends on its own value"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1002]);
    }

    #[test]
    fn types_containing_themselves() {
        let h = Harness::new("const S = struct { inner: S };\nexport const n: usize = @sizeOf(S);\n");

        h.comp.update();

        assert_eq!(codes(&h), vec![ErrorCode::E1002]);
    }

    #[test]
    fn annotation_overflow() {
        let h = Harness::new("export const e: u8 = 256;\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:1: type 'u8' cannot represent integer value '256'"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1006]);
    }

    #[test]
    fn arithmetic_overflow() {
        let h = Harness::new("const a: i8 = 100;\nexport const e = a + 100;\n");

        h.comp.update();

        assert_eq!(h.error_lines(), vec!["main.kn:2:1: overflow of integer type 'i8'"]);
    }

    #[test]
    fn compile_error_builtin() {
        let h = Harness::new("comptime { @compileError(\"unsupported target\"); }\n");

        h.comp.update();

        assert_eq!(h.error_lines(), vec!["main.kn:1:12: unsupported target"]);
        assert_eq!(codes(&h), vec![ErrorCode::E1005]);
    }

    #[test]
    fn returning_an_error_without_an_error_set() {
        let h = Harness::new("export fn f() u8 { return error.Bad; }\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:20: expected type 'u8', found 'error{Bad}'"]
        );
    }

    #[test]
    fn calling_a_non_function() {
        let h = Harness::new("const n = 1;\nexport fn f() void { n(); }\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:2:22: type 'comptime_int' is not a function"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1010]);
    }

    #[test]
    fn usingnamespace_of_a_non_container() {
        let h = Harness::new("usingnamespace u8;\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:1: usingnamespace operand must be a container type, found 'u8'"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1008]);
    }

    #[test]
    fn duplicate_fields() {
        let h = Harness::new("const S = struct { a: u8, a: u16 };\nexport const n: usize = @sizeOf(S);\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:11: duplicate struct field name 'a'"]
        );
        assert_eq!(codes(&h), vec![ErrorCode::E1004]);
    }

    #[test]
    fn syntax_errors() {
        let h = Harness::new("const a = 1\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 1);
        assert_eq!(h.error_lines(), vec!["main.kn:2:1: expected ';', found end of file"]);
        assert_eq!(codes(&h), vec![ErrorCode::E0001]);
    }

    #[test]
    fn lowering_errors() {
        let h = Harness::new("const a = @nope(1);\nconst b = u99999;\n");

        h.comp.update();

        assert_eq!(
            h.error_lines(),
            vec![
                "main.kn:1:11: invalid builtin function: '@nope'",
                "main.kn:2:11: type 'u99999' exceeds the maximum bit width",
            ]
        );
    }

    #[test]
    fn exporting_a_type() {
        let h = Harness::new("export const T = struct {};\n");

        h.comp.update();

        assert_eq!(h.error_lines(), vec!["main.kn:1:1: unable to export type 'main.T'"]);
        assert_eq!(codes(&h), vec![ErrorCode::E1009]);
    }

    #[test]
    fn colliding_exports() {
        let h = Harness::new(
            "const a: u8 = 1;\nconst b: u8 = 2;\ncomptime { @export(a, \"sym\"); }\ncomptime { @export(b, \"sym\"); }\n",
        );

        h.comp.update();

        let errors = h.comp.all_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::E2001);
        assert_eq!(errors[0].message, "exported symbol collision: 'sym'");
    }

    #[test]
    fn function_and_variable_claiming_one_symbol() {
        let h = Harness::new(
            "export fn foo() void { }\nconst v: u8 = 1;\ncomptime { @export(v, \"foo\"); }\n",
        );

        h.comp.update();

        let statuses: Vec<ExportStatus> = h.comp.with_db(|db| {
            let exports = db.exports();
            exports
                .ordered()
                .into_iter()
                .filter_map(|index| exports.get(index).map(|e| e.status))
                .collect()
        });
        assert_eq!(statuses, vec![ExportStatus::Complete, ExportStatus::FailedRetryable]);
        let errors = h.comp.all_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::E2001);
        assert_eq!(errors[0].notes, vec!["main.kn:1:1: other symbol here".to_owned()]);
    }

    #[test]
    fn container_types_in_function_bodies() {
        let h = Harness::new("export fn f() void { struct {}; }\n");

        h.comp.update();

        assert_eq!(codes(&h), vec![ErrorCode::E1007]);
    }
}
