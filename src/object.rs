//! Guest image sources (C1 reads through this trait rather than assuming a
//! file descriptor, so in-memory guest blobs can be tested without touching
//! disk).
use crate::error::{Result, io_error};
use std::ffi::CString;
use std::ffi::CStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// A source of guest ELF bytes.
pub trait ElfObject {
    /// Short name used for registry bookkeeping and diagnostics.
    fn file_name(&self) -> &CStr;
    /// Reads `buf.len()` bytes starting at `offset`.
    fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()>;
    /// Total length of the underlying image, used to size the scratch buffer.
    fn len(&self) -> Result<usize>;
}

/// A guest ELF already resident in memory (used by tests and by embedders
/// that already own the bytes, e.g. from an archive).
pub struct ElfBinary<'bytes> {
    name: CString,
    bytes: &'bytes [u8],
}

impl<'bytes> ElfBinary<'bytes> {
    pub fn new(name: &str, bytes: &'bytes [u8]) -> Self {
        Self {
            name: CString::new(name).unwrap_or_default(),
            bytes,
        }
    }
}

impl<'bytes> ElfObject for ElfBinary<'bytes> {
    fn file_name(&self) -> &CStr {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(buf.len())
            .ok_or_else(|| io_error("read out of range"))?;
        if end > self.bytes.len() {
            return Err(io_error("read out of range"));
        }
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.bytes.len())
    }
}

/// A guest ELF on disk, opened the way C12's path resolver hands candidates
/// to C1: read-only, regular files only.
pub struct ElfFile {
    name: CString,
    file: File,
}

impl ElfFile {
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| io_error(format!("{}: {e}", path.display())))?;
        let meta = file
            .metadata()
            .map_err(|e| io_error(format!("{}: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(io_error(format!("{}: not a regular file", path.display())));
        }
        let name = CString::new(path.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(ElfFile { name, file })
    }
}

impl ElfObject for ElfFile {
    fn file_name(&self) -> &CStr {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8], offset: usize) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(|e| io_error(e.to_string()))?;
        self.file
            .read_exact(buf)
            .map_err(|e| io_error(e.to_string()))
    }

    fn len(&self) -> Result<usize> {
        Ok(self
            .file
            .metadata()
            .map_err(|e| io_error(e.to_string()))?
            .len() as usize)
    }
}
