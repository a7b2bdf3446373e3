//! Incremental update tests.
//!
//! Each test compiles a program, edits it, and checks which units the
//! next update re-analyzed and what the results became.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

mod common;

use common::{sorted, Harness};
use kiln_sema::testing::BackendEvent;
use kiln_sema::CompilationConfig;

// =============================================================================
// Propagation
// =============================================================================

mod propagation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn edits_reach_dependers() {
        let h = Harness::new("const a = 1;\nexport const e: u8 = a + 1;\n");
        h.comp.update();
        assert_eq!(h.value("main.e"), "2");

        let summary = h.edit("const a = 10;\nexport const e: u8 = a + 1;\n");

        assert_eq!(summary.analyzed, vec!["main.a", "main.e"]);
        assert_eq!(h.value("main.e"), "11");
    }

    #[test]
    fn equal_values_stop_propagation() {
        let h = Harness::new("const a = 1 + 1;\nexport const e: u8 = a;\n");
        h.comp.update();

        let summary = h.edit("const a = 2;\nexport const e: u8 = a;\n");

        assert_eq!(summary.analyzed, vec!["main.a"]);
        assert_eq!(h.value("main.e"), "2");
    }

    #[test]
    fn layout_edits_do_nothing() {
        let h = Harness::new("const a = 1;\nexport const e: u8 = a;\n");
        h.comp.update();

        let summary = h.edit("// values\nconst a =  1;\n\nexport const e: u8 = a;\n");

        assert_eq!(summary.analyzed, Vec::<String>::new());
    }

    #[test]
    fn field_changes_reach_size_queries() {
        let h = Harness::new(
            "const S = struct { a: u8, b: u16 };\nconst n: usize = @sizeOf(S);\nexport const e = n;\n",
        );
        h.comp.update();
        assert_eq!(h.value("main.e"), "3");

        let summary = h.edit(
            "const S = struct { a: u8, b: u32 };\nconst n: usize = @sizeOf(S);\nexport const e = n;\n",
        );

        assert_eq!(sorted(&summary), vec!["main.S", "main.e", "main.n"]);
        assert_eq!(h.value("main.e"), "5");
    }

    #[test]
    fn field_types_follow_the_declarations_they_name() {
        let h = Harness::new(
            "const T = u8;\nconst S = struct { a: T, b: T };\nexport const n: usize = @sizeOf(S);\n",
        );
        h.comp.update();
        assert_eq!(h.value("main.n"), "2");

        h.edit("const T = u64;\nconst S = struct { a: T, b: T };\nexport const n: usize = @sizeOf(S);\n");

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.n"), "16");
    }

    #[test]
    fn self_referential_types_survive_field_changes() {
        let h = Harness::new(
            "const T = u8;\nconst Node = struct { next: *const Node, v: T };\nexport const n: usize = @sizeOf(Node);\n",
        );
        h.comp.update();
        assert_eq!(h.value("main.n"), "9");

        h.edit("const T = u16;\nconst Node = struct { next: *const Node, v: T };\nexport const n: usize = @sizeOf(Node);\n");

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.n"), "10");
    }
}

// =============================================================================
// Functions
// =============================================================================

mod functions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn body_edits_reanalyze_only_the_body() {
        let h = Harness::new("export fn f() i32 { return 1; }\nexport fn g() void { f(); }\n");
        let first = h.comp.update();
        assert_eq!(first.error_count, 0);
        let f = h.decl("main.f");

        let summary = h.edit("export fn f() i32 { return 20; }\nexport fn g() void { f(); }\n");

        assert_eq!(summary.analyzed, vec!["main.f", "main.f (body)"]);
        assert_eq!(h.decl("main.f"), f);
        assert!(h.log.take().contains(&BackendEvent::UpdateFunc("main.f".to_owned())));
    }

    #[test]
    fn error_set_changes_reach_callers() {
        let h = Harness::new(
            "fn fail() !void { return error.Bad; }\nexport fn run() !void { fail(); }\n",
        );
        h.comp.update();
        assert_eq!(h.error_set("main.run"), "error{Bad}");

        let summary = h.edit(
            "fn fail() !void { return error.Worse; }\nexport fn run() !void { fail(); }\n",
        );

        assert_eq!(
            sorted(&summary),
            vec!["main.fail", "main.fail (body)", "main.run (body)"]
        );
        assert_eq!(h.error_set("main.run"), "error{Worse}");
    }

    #[test]
    fn equal_error_sets_stop_at_the_callee() {
        let h = Harness::new(
            "fn fail() !void { return error.Bad; }\nexport fn run() !void { fail(); }\n",
        );
        h.comp.update();

        let summary = h.edit(
            "fn fail() !void { return error.Bad; return error.Bad; }\nexport fn run() !void { fail(); }\n",
        );

        assert_eq!(summary.analyzed, vec!["main.fail", "main.fail (body)"]);
        assert_eq!(h.error_set("main.run"), "error{Bad}");
    }

    #[test]
    fn replaced_functions_are_deleted() {
        let h = Harness::new("export fn f() u8 { return 1; }\n");
        h.comp.update();
        let old = h.func("main.f");
        h.log.take();

        h.edit("export fn f() u16 { return 1; }\n");

        assert!(h.log.take().contains(&BackendEvent::DeleteFunc(old)));
        assert_ne!(h.func("main.f"), old);
        assert_eq!(h.comp.with_db(|db| db.live_funcs().count()), 1);
    }

    #[test]
    fn signature_changes_reach_callers() {
        let h = Harness::new("fn f() u8 { return 1; }\nexport fn g() void { f(); }\n");
        h.comp.update();

        let summary = h.edit("fn f() u16 { return 1; }\nexport fn g() void { f(); }\n");

        assert!(summary.analyzed.contains(&"main.g (body)".to_owned()));
        assert_eq!(summary.error_count, 0);
    }
}

// =============================================================================
// Declarations coming and going
// =============================================================================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deleted_declarations_fail_their_users() {
        let h = Harness::new("const a = 1;\nexport const e: u8 = a;\n");
        h.comp.update();

        h.edit("export const e: u8 = a;\n");

        assert!(!h.has_decl("main.a"));
        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:22: use of undeclared identifier 'a'"]
        );

        h.edit("const a = 3;\nexport const e: u8 = a;\n");
        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.e"), "3");
    }

    #[test]
    fn added_declarations_satisfy_failed_lookups() {
        let h = Harness::new("export const e: u8 = a;\n");
        h.comp.update();
        assert_eq!(
            h.error_lines(),
            vec!["main.kn:1:22: use of undeclared identifier 'a'"]
        );

        h.edit("const a = 5;\nexport const e: u8 = a;\n");

        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.value("main.e"), "5");
    }

    #[test]
    fn fixing_a_syntax_error_resumes_analysis() {
        let h = Harness::new("const a = 1;\nexport const e: u8 = a;\n");
        h.comp.update();
        let e = h.decl("main.e");

        h.edit("const a = 1;\nexport const e: u8 = a\n");
        assert_eq!(h.error_lines().len(), 1);
        assert_eq!(h.decl("main.e"), e);

        h.edit("const a = 7;\nexport const e: u8 = a;\n");
        assert_eq!(h.error_lines(), Vec::<String>::new());
        assert_eq!(h.decl("main.e"), e);
        assert_eq!(h.value("main.e"), "7");
    }

    #[test]
    fn removing_export_deletes_the_symbol() {
        let h = Harness::new("export const e: u8 = 1;\n");
        h.comp.update();
        h.log.take();

        h.edit("const e: u8 = 1;\n");

        assert!(h.log.take().contains(&BackendEvent::DeleteExport("e".to_owned())));
    }

    #[test]
    fn export_builtin_follows_comptime_blocks() {
        let h = Harness::new("const a: u8 = 1;\ncomptime { @export(a, \"first\"); }\n");
        h.comp.update();
        h.log.take();

        h.edit("const a: u8 = 1;\ncomptime { @export(a, \"second\"); }\n");

        let events = h.log.take();
        assert!(events.contains(&BackendEvent::DeleteExport("first".to_owned())));
        let a = h.decl("main.a");
        assert!(events.contains(&BackendEvent::UpdateExports(
            kiln_sema::Exported::Decl(a),
            vec!["second".to_owned()]
        )));
    }

    #[test]
    fn compile_errors_clear_when_removed() {
        let h = Harness::new("comptime { @compileError(\"not yet\"); }\n");
        h.comp.update();
        assert_eq!(h.error_lines(), vec!["main.kn:1:12: not yet"]);

        h.edit("comptime { }\n");

        assert_eq!(h.error_lines(), Vec::<String>::new());
    }
}

// =============================================================================
// Tests
// =============================================================================

mod test_decls {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filters_select_named_tests() {
        let h = Harness::with_config(
            CompilationConfig::new().with_tests(["fast"]),
            "test \"fast math\" { }\ntest \"slow io\" { }\ntest { }\n",
        );

        let summary = h.comp.update();

        let tests: Vec<String> = h
            .comp
            .with_db(|db| db.test_functions().map(|d| db.fqn(d).to_owned()).collect());
        assert_eq!(tests, vec!["main.test.fast math", "main.test"]);
        assert!(summary.analyzed.contains(&"main.test.fast math (body)".to_owned()));
        assert!(!summary.analyzed.iter().any(|u| u.contains("slow")));
    }

    #[test]
    fn tests_are_ignored_outside_test_builds() {
        let h = Harness::new("test \"t\" { missing; }\n");

        let summary = h.comp.update();

        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.analyzed, vec!["main"]);
    }
}

// =============================================================================
// Multiple files
// =============================================================================

mod files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn files_are_independent_roots() {
        let h = Harness::new("export const a: u8 = 1;\n");
        h.add_file("other.kn", "export const b: u8 = 2;\n");
        h.comp.update();

        h.write("other.kn", "export const b: u8 = 20;\n");
        let summary = h.comp.update();

        assert_eq!(summary.changed_files, 1);
        assert_eq!(summary.analyzed, vec!["other.b"]);
    }

    #[test]
    fn edits_to_several_files_land_in_one_update() {
        let h = Harness::new("export const a: u8 = 1;\n");
        h.add_file("other.kn", "export const b: u8 = 2;\n");
        h.comp.update();

        h.write("main.kn", "export const a: u8 = 10;\n");
        h.write("other.kn", "export const b: u8 = 20;\n");
        let summary = h.comp.update();

        assert_eq!(summary.changed_files, 2);
        assert_eq!(sorted(&summary), vec!["main.a", "other.b"]);
        assert_eq!(h.value("main.a"), "10");
        assert_eq!(h.value("other.b"), "20");
    }

    #[test]
    fn without_incremental_tracking_everything_is_reanalyzed() {
        let h = Harness::with_config(
            CompilationConfig::new().with_incremental(false),
            "const a = 1;\nexport const e: u8 = a;\n",
        );
        let first = h.comp.update();

        let second = h.comp.update();

        assert_eq!(second.analyzed, first.analyzed);
    }
}
