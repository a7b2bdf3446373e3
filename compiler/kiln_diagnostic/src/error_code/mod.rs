//! Error codes for all compiler diagnostics.

use std::fmt;

/// Error codes for all compiler diagnostics.
///
/// Format: E#### where the first digit indicates the phase:
/// - E0xxx: File loading and lowering
/// - E1xxx: Semantic analysis
/// - E2xxx: Exports
/// - E5xxx: Code generation
/// - E9xxx: Internal compiler errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Loading and lowering (E0xxx)
    /// Syntax or lowering error reported by the front-end
    E0001,
    /// Source file could not be read
    E0002,

    // Semantic analysis (E1xxx)
    /// Use of undeclared identifier
    E1001,
    /// Dependency loop
    E1002,
    /// Expected a type
    E1003,
    /// Duplicate field name
    E1004,
    /// User-requested compile error
    E1005,
    /// Integer overflow in comptime arithmetic
    E1006,
    /// Unexpected failure while analyzing (retried next update)
    E1007,
    /// `usingnamespace` operand is not a container type
    E1008,
    /// Value cannot be exported
    E1009,
    /// Call of a non-function value
    E1010,

    // Exports (E2xxx)
    /// Exported symbol collision
    E2001,

    // Code generation (E5xxx)
    /// Backend rejected a declaration or function
    E5001,

    // Internal (E9xxx)
    /// Internal compiler error
    E9001,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E0001 => "E0001",
            ErrorCode::E0002 => "E0002",
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E1007 => "E1007",
            ErrorCode::E1008 => "E1008",
            ErrorCode::E1009 => "E1009",
            ErrorCode::E1010 => "E1010",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E5001 => "E5001",
            ErrorCode::E9001 => "E9001",
        }
    }

    /// Phase digit of the code.
    pub fn phase(&self) -> u8 {
        self.as_str().as_bytes()[1] - b'0'
    }

    pub fn is_analysis_error(&self) -> bool {
        self.phase() == 1
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E0001 => "syntax error",
            ErrorCode::E0002 => "unable to load source file",
            ErrorCode::E1001 => "use of undeclared identifier",
            ErrorCode::E1002 => "dependency loop detected",
            ErrorCode::E1003 => "expected type",
            ErrorCode::E1004 => "duplicate field",
            ErrorCode::E1005 => "compile error",
            ErrorCode::E1006 => "integer overflow",
            ErrorCode::E1007 => "unable to analyze",
            ErrorCode::E1008 => "usingnamespace of non-container",
            ErrorCode::E1009 => "invalid export",
            ErrorCode::E1010 => "call of non-function",
            ErrorCode::E2001 => "exported symbol collision",
            ErrorCode::E5001 => "code generation failed",
            ErrorCode::E9001 => "internal compiler error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests;
