//! The shared on-disk lowered IR cache.
//!
//! One file per source path, named by a hash of the compiler fingerprint and
//! the path. Entries are read under a shared advisory lock and regenerated
//! under an exclusive one, so concurrent compilers sharing a cache directory
//! never observe a half-written entry.

use kiln_ir::cache::{self, FileStat};
use kiln_ir::{ContentHash, IrCacheError, LoweredIr, SourceHasher};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct IrCache {
    dir: PathBuf,
    compiler_hash: ContentHash,
}

impl IrCache {
    pub fn new(root: &Path, compiler_hash: ContentHash) -> Self {
        IrCache {
            dir: root.join("ir"),
            compiler_hash,
        }
    }

    pub fn entry_path(&self, source_path: &Path) -> PathBuf {
        let mut hasher = SourceHasher::new();
        hasher.write_u64(self.compiler_hash.value());
        hasher.write_str(&source_path.to_string_lossy());
        self.dir.join(hasher.finish().to_hex())
    }

    /// Open (creating if needed) the entry for `source_path`, holding a
    /// shared lock until the entry is dropped.
    pub fn open(&self, source_path: &Path) -> io::Result<CacheEntry> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(source_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_shared()?;
        Ok(CacheEntry {
            file,
            path,
            exclusive: false,
        })
    }
}

/// A locked cache file.
#[derive(Debug)]
pub struct CacheEntry {
    file: File,
    path: PathBuf,
    exclusive: bool,
}

impl CacheEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached IR if the entry was produced from a file with `stat`.
    pub fn read(&mut self, stat: FileStat) -> Option<LoweredIr> {
        match self.try_read(stat) {
            Ok(ir) => ir,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt cache entry");
                None
            }
        }
    }

    fn try_read(&mut self, stat: FileStat) -> Result<Option<LoweredIr>, IrCacheError> {
        if self.file.metadata()?.len() == 0 {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);
        let header = cache::read_header(&mut reader)?;
        if header.stat != stat {
            tracing::trace!(path = %self.path.display(), "cache entry is stale");
            return Ok(None);
        }
        cache::read_body(&mut reader, &header).map(Some)
    }

    /// Trade the shared lock for an exclusive one.
    ///
    /// Not atomic: another holder may take the exclusive lock in between.
    pub fn upgrade(&mut self) -> io::Result<()> {
        if self.exclusive {
            return Ok(());
        }
        self.file.unlock()?;
        self.file.lock()?;
        self.exclusive = true;
        Ok(())
    }

    /// Replace the entry's contents. Requires the exclusive lock.
    pub fn write(&mut self, ir: &LoweredIr, stat: FileStat) -> Result<(), IrCacheError> {
        self.upgrade()?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut writer = BufWriter::new(&self.file);
        cache::write_ir(&mut writer, ir, stat)?;
        writer.flush()?;
        Ok(())
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "unable to unlock cache entry");
        }
    }
}
