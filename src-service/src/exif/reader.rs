//! Chunked, lazily-filled reader over a file.
//!
//! Bytes are fetched from disk in fixed-size chunks on first access and kept
//! in memory. A byte that has already been fetched is never read again, so a
//! scan near the start of a large photo touches only the first few chunks.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::PatchError;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

pub struct FileDataReader {
    file: File,
    chunk_size: usize,
    size: usize,
    data: Vec<u8>,
}

impl FileDataReader {
    pub fn open(path: &Path) -> Result<Self, PatchError> {
        Self::with_chunk_size(path, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(path: &Path, chunk_size: usize) -> Result<Self, PatchError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len() as usize;
        Ok(Self {
            file,
            chunk_size: chunk_size.max(1),
            size,
            data: Vec::new(),
        })
    }

    /// Total file length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of bytes fetched so far.
    pub fn cached_len(&self) -> usize {
        self.data.len()
    }

    /// Byte at `index`.
    pub fn get(&mut self, index: usize) -> Result<u8, PatchError> {
        self.fetch_through(index)?;
        Ok(self.data[index])
    }

    /// Bytes in `start..end`.
    pub fn get_range(&mut self, start: usize, end: usize) -> Result<&[u8], PatchError> {
        if start > end {
            return Err(PatchError::OutOfBounds {
                offset: start,
                len: self.size,
            });
        }
        if end > start {
            self.fetch_through(end - 1)?;
        }
        Ok(&self.data[start..end])
    }

    /// Fetch chunks until `index` is cached.
    fn fetch_through(&mut self, index: usize) -> Result<(), PatchError> {
        if index >= self.size {
            return Err(PatchError::OutOfBounds {
                offset: index,
                len: self.size,
            });
        }
        while index >= self.data.len() {
            self.fetch_chunk()?;
        }
        Ok(())
    }

    fn fetch_chunk(&mut self) -> Result<(), PatchError> {
        let offset = self.data.len();
        self.file.seek(SeekFrom::Start(offset as u64))?;

        let mut chunk = vec![0u8; self.chunk_size];
        let read = self.file.read(&mut chunk)?;
        if read == 0 {
            // File shrank underneath us
            return Err(PatchError::OutOfBounds {
                offset,
                len: self.size,
            });
        }
        self.data.extend_from_slice(&chunk[..read]);
        Ok(())
    }
}
