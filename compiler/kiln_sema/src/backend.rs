//! The code generation backend interface.

use crate::export::Exported;
use kiln_ir::{DeclIndex, FuncIndex};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// The backend cannot handle this unit. Persists until it changes.
    #[error("{0}")]
    Unsupported(String),
    /// Transient; the unit is retried next update.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CodegenError::Io(_))
    }
}

/// Receives analyzed units. Called with the compilation lock held.
pub trait Backend: Send {
    fn update_decl(&mut self, decl: DeclIndex, fqn: &str) -> Result<(), CodegenError>;

    fn update_func(&mut self, func: FuncIndex, fqn: &str) -> Result<(), CodegenError>;

    /// Publish every name `exported` is exported under this update.
    fn update_exports(&mut self, exported: Exported, names: &[&str]) -> Result<(), CodegenError>;

    fn delete_export(&mut self, name: &str);

    /// Remove an orphaned function from the output.
    fn delete_func(&mut self, func: FuncIndex);
}

/// A backend that accepts everything and emits nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn update_decl(&mut self, _decl: DeclIndex, _fqn: &str) -> Result<(), CodegenError> {
        Ok(())
    }

    fn update_func(&mut self, _func: FuncIndex, _fqn: &str) -> Result<(), CodegenError> {
        Ok(())
    }

    fn update_exports(&mut self, _exported: Exported, _names: &[&str]) -> Result<(), CodegenError> {
        Ok(())
    }

    fn delete_export(&mut self, _name: &str) {}

    fn delete_func(&mut self, _func: FuncIndex) {}
}
