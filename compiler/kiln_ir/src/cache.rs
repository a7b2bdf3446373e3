//! On-disk cache format for lowered IR.
//!
//! ```text
//! header   bincode-encoded `CacheHeader` (fixed-width little-endian fields)
//! tags     instructions_len bytes
//! data     instructions_len * 8 bytes (a, b as u32 LE)
//! strings  string_bytes_len bytes
//! extra    extra_len * 4 bytes (u32 LE)
//! ```
//!
//! The header records the stat signature of the source file the IR was
//! produced from. A reader whose current stat differs must regenerate.

use crate::lowered::{InstData, InstTag, LoweredIr};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io::{self, Read, Write};
use std::time::UNIX_EPOCH;

pub const CACHE_MAGIC: [u8; 4] = *b"KLIR";
pub const CACHE_VERSION: u32 = 1;

/// Size, inode and modification time of a source file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileStat {
    pub size: u64,
    pub inode: u64,
    /// Nanoseconds since the Unix epoch (negative before it).
    pub mtime: i128,
}

impl FileStat {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mtime = metadata.modified().map_or(0, |time| match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i128::try_from(after.as_nanos()).unwrap_or(i128::MAX),
            Err(before) => -i128::try_from(before.duration().as_nanos()).unwrap_or(i128::MAX),
        });
        FileStat {
            size: metadata.len(),
            inode: inode_of(metadata),
            mtime,
        }
    }
}

#[cfg(unix)]
fn inode_of(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode_of(_metadata: &Metadata) -> u64 {
    0
}

/// Fixed-size prefix of a cache file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub instructions_len: u32,
    pub string_bytes_len: u32,
    pub extra_len: u32,
    pub stat: FileStat,
}

/// Failure reading or writing a lowered IR cache file.
#[derive(Debug, thiserror::Error)]
pub enum IrCacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed cache header: {0}")]
    Header(#[from] bincode::Error),
    #[error("not a lowered IR cache file")]
    BadMagic,
    #[error("cache format version {found} is not supported (expected {expected})", expected = CACHE_VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("invalid instruction tag {tag} at index {index}")]
    InvalidTag { index: usize, tag: u8 },
    #[error("lowered IR too large for cache: {0} elements")]
    TooLarge(usize),
}

fn len_u32(len: usize) -> Result<u32, IrCacheError> {
    u32::try_from(len).map_err(|_| IrCacheError::TooLarge(len))
}

impl CacheHeader {
    pub fn for_ir(ir: &LoweredIr, stat: FileStat) -> Result<Self, IrCacheError> {
        Ok(CacheHeader {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION,
            instructions_len: len_u32(ir.tags.len())?,
            string_bytes_len: len_u32(ir.string_bytes.len())?,
            extra_len: len_u32(ir.extra.len())?,
            stat,
        })
    }
}

/// Write `ir` with `stat` as its source signature.
pub fn write_ir(writer: &mut impl Write, ir: &LoweredIr, stat: FileStat) -> Result<(), IrCacheError> {
    let header = CacheHeader::for_ir(ir, stat)?;
    bincode::serialize_into(&mut *writer, &header)?;

    let tags: Vec<u8> = ir.tags.iter().map(|&tag| tag as u8).collect();
    writer.write_all(&tags)?;

    let mut data = Vec::with_capacity(ir.data.len() * 8);
    for inst in &ir.data {
        data.extend_from_slice(&inst.a.to_le_bytes());
        data.extend_from_slice(&inst.b.to_le_bytes());
    }
    writer.write_all(&data)?;

    writer.write_all(&ir.string_bytes)?;

    let mut extra = Vec::with_capacity(ir.extra.len() * 4);
    for word in &ir.extra {
        extra.extend_from_slice(&word.to_le_bytes());
    }
    writer.write_all(&extra)?;
    Ok(())
}

/// Read and validate the header.
pub fn read_header(reader: &mut impl Read) -> Result<CacheHeader, IrCacheError> {
    let header: CacheHeader = bincode::deserialize_from(&mut *reader)?;
    if header.magic != CACHE_MAGIC {
        return Err(IrCacheError::BadMagic);
    }
    if header.version != CACHE_VERSION {
        return Err(IrCacheError::UnsupportedVersion {
            found: header.version,
        });
    }
    Ok(header)
}

/// Read the four arrays following `header`.
pub fn read_body(reader: &mut impl Read, header: &CacheHeader) -> Result<LoweredIr, IrCacheError> {
    let inst_len = header.instructions_len as usize;

    let mut raw_tags = vec![0u8; inst_len];
    reader.read_exact(&mut raw_tags)?;
    let tags = raw_tags
        .iter()
        .enumerate()
        .map(|(index, &tag)| InstTag::from_u8(tag).ok_or(IrCacheError::InvalidTag { index, tag }))
        .collect::<Result<Vec<_>, _>>()?;

    let mut raw_data = vec![0u8; inst_len * 8];
    reader.read_exact(&mut raw_data)?;
    let data = raw_data
        .chunks_exact(8)
        .map(|chunk| InstData {
            a: u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            b: u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
        })
        .collect();

    let mut string_bytes = vec![0u8; header.string_bytes_len as usize];
    reader.read_exact(&mut string_bytes)?;

    let mut raw_extra = vec![0u8; header.extra_len as usize * 4];
    reader.read_exact(&mut raw_extra)?;
    let extra = raw_extra
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(LoweredIr {
        tags,
        data,
        string_bytes,
        extra,
    })
}

#[cfg(test)]
mod tests;
