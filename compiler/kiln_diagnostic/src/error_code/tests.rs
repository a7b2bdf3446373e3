use super::*;
use pretty_assertions::assert_eq;

#[test]
fn display_matches_variant_name() {
    assert_eq!(ErrorCode::E1002.to_string(), "E1002");
    assert_eq!(format!("{:?}", ErrorCode::E2001), ErrorCode::E2001.as_str());
}

#[test]
fn phase_comes_from_first_digit() {
    assert_eq!(ErrorCode::E0001.phase(), 0);
    assert_eq!(ErrorCode::E1007.phase(), 1);
    assert_eq!(ErrorCode::E5001.phase(), 5);
    assert!(ErrorCode::E1001.is_analysis_error());
    assert!(!ErrorCode::E2001.is_analysis_error());
}
