//! Stored, unrendered error records.

use crate::{ErrorCode, LazySrcLoc};

/// An error recorded during analysis, with nested notes.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ErrorMsg {
    pub code: ErrorCode,
    pub src: LazySrcLoc,
    pub message: String,
    pub notes: Vec<ErrorMsg>,
}

impl ErrorMsg {
    pub fn new(code: ErrorCode, src: LazySrcLoc, message: impl Into<String>) -> Self {
        ErrorMsg {
            code,
            src,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Attach a note pointing at another location.
    #[must_use]
    pub fn with_note(mut self, src: LazySrcLoc, message: impl Into<String>) -> Self {
        self.notes.push(ErrorMsg::new(self.code, src, message));
        self
    }
}
