//! Source files, build modules and the file table.

use bitflags::bitflags;
use kiln_ir::cache::FileStat;
use kiln_ir::{DeclIndex, FileIndex, LoweredIr, ModuleIndex, Name, SyntaxTree};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress of a file through loading and lowering.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum FileStatus {
    #[default]
    Never,
    /// The file could not be read. Retried every update.
    RetryableFailure,
    /// The source did not parse; there is no lowered IR.
    ParseFailure,
    /// Lowered, but the IR carries compile errors.
    LoweringFailure,
    Success,
}

bitflags! {
    /// Which derived artifacts of a file are currently in memory.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct LoadFlags: u8 {
        const SOURCE = 1 << 0;
        const TREE = 1 << 1;
        const IR = 1 << 2;
    }
}

/// A named root directory of source files.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: Name,
    pub root_dir: PathBuf,
}

/// One source file and everything derived from it.
#[derive(Debug)]
pub struct File {
    pub module: ModuleIndex,
    /// Path relative to the module root.
    pub sub_path: PathBuf,
    pub status: FileStatus,
    pub loaded: LoadFlags,
    pub stat: Option<FileStat>,
    pub source: Option<Arc<str>>,
    pub tree: Option<Arc<SyntaxTree>>,
    /// The most recently lowered IR, possibly carrying compile errors.
    pub ir: Option<Arc<LoweredIr>>,
    /// The last error-free IR while `ir` has errors. Tracked instructions of
    /// this file keep pointing into it until the file lowers cleanly again.
    pub last_success_ir: Option<Arc<LoweredIr>>,
    /// Set between loading a changed file and correlating it.
    pub prev_ir: Option<Arc<LoweredIr>>,
    /// Message and byte offset for `RetryableFailure` and `ParseFailure`.
    pub load_error: Option<(String, u32)>,
    pub root_decl: Option<DeclIndex>,
}

impl File {
    pub fn new(module: ModuleIndex, sub_path: PathBuf) -> Self {
        File {
            module,
            sub_path,
            status: FileStatus::Never,
            loaded: LoadFlags::empty(),
            stat: None,
            source: None,
            tree: None,
            ir: None,
            last_success_ir: None,
            prev_ir: None,
            load_error: None,
            root_decl: None,
        }
    }

    /// The IR tracked instructions of this file refer to.
    pub fn analysis_ir(&self) -> Option<&Arc<LoweredIr>> {
        self.last_success_ir.as_ref().or(self.ir.as_ref())
    }

    pub fn is_ok(&self) -> bool {
        self.status == FileStatus::Success
    }

    /// Whether the last load produced IR that is still current.
    pub fn has_current_ir(&self) -> bool {
        matches!(
            self.status,
            FileStatus::Success | FileStatus::LoweringFailure | FileStatus::ParseFailure
        )
    }

    /// Drop the source and syntax tree; they are reloaded on demand.
    pub fn unload_tree(&mut self) {
        self.source = None;
        self.tree = None;
        self.loaded.remove(LoadFlags::SOURCE | LoadFlags::TREE);
    }
}

/// Registered modules and files.
#[derive(Debug, Default)]
pub struct FileTable {
    modules: Vec<Module>,
    files: Vec<File>,
    by_path: FxHashMap<(ModuleIndex, PathBuf), FileIndex>,
}

impl FileTable {
    pub fn add_module(&mut self, name: Name, root_dir: PathBuf) -> ModuleIndex {
        let index = ModuleIndex::from_usize(self.modules.len());
        self.modules.push(Module { name, root_dir });
        index
    }

    /// Register a file, returning the existing index for a known path.
    pub fn add_file(&mut self, module: ModuleIndex, sub_path: &Path) -> FileIndex {
        let key = (module, sub_path.to_path_buf());
        if let Some(&index) = self.by_path.get(&key) {
            return index;
        }
        let index = FileIndex::from_usize(self.files.len());
        self.files.push(File::new(module, sub_path.to_path_buf()));
        self.by_path.insert(key, index);
        index
    }

    pub fn module(&self, index: ModuleIndex) -> &Module {
        &self.modules[index.index()]
    }

    pub fn main_module(&self) -> Option<ModuleIndex> {
        (!self.modules.is_empty()).then(|| ModuleIndex::new(0))
    }

    pub fn file(&self, index: FileIndex) -> &File {
        &self.files[index.index()]
    }

    pub fn file_mut(&mut self, index: FileIndex) -> &mut File {
        &mut self.files[index.index()]
    }

    /// Absolute path of a file.
    pub fn full_path(&self, index: FileIndex) -> PathBuf {
        let file = self.file(index);
        self.module(file.module).root_dir.join(&file.sub_path)
    }

    /// Path shown in diagnostics: module-relative.
    pub fn display_path(&self, index: FileIndex) -> String {
        self.file(index).sub_path.display().to_string()
    }

    pub fn indices(&self) -> impl Iterator<Item = FileIndex> {
        (0..self.files.len()).map(FileIndex::from_usize)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
