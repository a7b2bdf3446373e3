use super::*;
use pretty_assertions::assert_eq;

#[test]
fn builder_collects_labels_and_notes() {
    let diag = Diagnostic::error(ErrorCode::E2001)
        .with_message("exported symbol collision: 'foo'")
        .with_label(Span::new(4, 7), "exported here")
        .with_secondary_label(Span::new(20, 23), "")
        .with_note("other symbol here");

    assert!(diag.is_error());
    assert_eq!(diag.primary_span(), Some(Span::new(4, 7)));
    assert_eq!(diag.labels.len(), 2);
    assert_eq!(diag.notes, vec!["other symbol here".to_owned()]);
}

#[test]
fn display_includes_location_code_and_notes() {
    let diag = Diagnostic::error(ErrorCode::E1002)
        .with_message("dependency loop detected")
        .with_location(SourceLocation {
            path: "main.kn".to_owned(),
            line: 3,
            column: 7,
        })
        .with_note("referenced here");

    assert_eq!(
        diag.to_string(),
        "main.kn:3:7: error [E1002]: dependency loop detected\n  = note: referenced here"
    );
}

#[test]
fn warnings_are_not_errors() {
    let diag = Diagnostic::warning(ErrorCode::E9001).with_message("odd");
    assert!(!diag.is_error());
    assert_eq!(diag.primary_span(), None);
}
