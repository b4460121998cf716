use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::codec::{ByteReader, ScratchBuf};
use crate::error::{IndexError, Result};

/// Length of the magic + version header every dictionary file starts with.
pub(crate) const HEADER_LEN: usize = 6;

pub(crate) const TERMS_MAGIC: &[u8; 4] = b"BTRM";
pub(crate) const CODES_MAGIC: &[u8; 4] = b"BTCD";
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Shared memory map cloneable via reference counting.
#[derive(Clone)]
pub(crate) struct SharedMmap(Arc<Mmap>);

impl From<Mmap> for SharedMmap {
    fn from(m: Mmap) -> Self {
        SharedMmap(Arc::new(m))
    }
}

impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        (&*self.0).as_ref()
    }
}

/// Open and memory-map `path`, naming the file role in any error.
pub(crate) fn map_file(path: &Path, what: &str) -> Result<SharedMmap> {
    let file = File::open(path).map_err(|e| {
        IndexError::Io(io::Error::new(
            e.kind(),
            format!("failed to open {} file {:?}: {}", what, path, e),
        ))
    })?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
        IndexError::Io(io::Error::new(
            e.kind(),
            format!("failed to mmap {} file {:?}: {}", what, path, e),
        ))
    })?;
    Ok(SharedMmap::from(mmap))
}

pub(crate) fn write_header<W: Write>(w: &mut W, magic: &[u8; 4], version: u16) -> io::Result<()> {
    w.write_all(magic)?;
    w.write_all(&version.to_le_bytes())
}

pub(crate) fn check_header(data: &[u8], magic: &[u8; 4], version: u16) -> Result<()> {
    if data.len() < HEADER_LEN {
        return Err(IndexError::InvalidFormat("file too small for header"));
    }
    if &data[..4] != magic {
        return Err(IndexError::InvalidFormat("bad magic"));
    }
    if u16::from_le_bytes([data[4], data[5]]) != version {
        return Err(IndexError::InvalidFormat("unsupported file version"));
    }
    Ok(())
}

/// Positioned read handle over the terms file.
///
/// Cloning shares the mapping but not the position, so every enumerator reads
/// through its own handle.
#[derive(Clone)]
pub(crate) struct BlockInput {
    data: SharedMmap,
    pos: usize,
}

impl BlockInput {
    pub(crate) fn new(data: SharedMmap) -> Self {
        BlockInput { data, pos: 0 }
    }

    #[inline]
    pub(crate) fn len(&self) -> u64 {
        self.data.as_ref().len() as u64
    }

    pub(crate) fn seek(&mut self, fp: u64) -> Result<()> {
        if fp < HEADER_LEN as u64 || fp >= self.len() {
            return Err(IndexError::Corrupt {
                fp,
                reason: "file pointer outside terms file",
            });
        }
        self.pos = fp as usize;
        Ok(())
    }

    fn reader(&self) -> ByteReader<'_> {
        ByteReader::at(self.data.as_ref(), self.pos)
    }

    pub(crate) fn read_vint(&mut self) -> Result<u32> {
        let mut r = self.reader();
        let v = r.read_vint()?;
        self.pos = r.position();
        Ok(v)
    }

    /// Copy the next `n` bytes into `dst`, replacing its contents.
    pub(crate) fn read_into(&mut self, dst: &mut ScratchBuf, n: usize) -> Result<()> {
        let mut r = self.reader();
        let bytes = r.read_bytes(n)?;
        dst.reset_from(bytes);
        self.pos = r.position();
        Ok(())
    }
}

/// Slice out the index record stored at `offset` in the codes file.
///
/// `fp` only labels the error with the block the record was looked up for.
pub(crate) fn read_index_record(codes: &[u8], offset: u64, fp: u64) -> Result<&[u8]> {
    let corrupt = |reason| IndexError::Corrupt { fp, reason };
    if offset < HEADER_LEN as u64 || offset >= codes.len() as u64 {
        return Err(corrupt("index record offset outside codes file"));
    }
    let mut r = ByteReader::at(codes, offset as usize);
    let len = r
        .read_vint()
        .map_err(|_| corrupt("truncated index record"))?;
    r.read_bytes(len as usize)
        .map_err(|_| corrupt("truncated index record"))
}
