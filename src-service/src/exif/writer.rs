//! In-place writes at a fixed offset.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::PatchError;

/// Overwrites byte ranges of an existing file without changing its length.
pub struct FileDataWriter {
    path: PathBuf,
}

impl FileDataWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Write `data` at `offset` and flush it to disk.
    ///
    /// Fails if the write would extend past the end of the file.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), PatchError> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        let len = file.metadata()?.len() as usize;
        if offset + data.len() > len {
            return Err(PatchError::OutOfBounds { offset, len });
        }

        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let writer = FileDataWriter::new(&path);
        writer.write(4, &[1, 2, 3]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[3..8], &[0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_rejects_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let writer = FileDataWriter::new(&path);
        assert!(matches!(
            writer.write(2, &[9, 9, 9]),
            Err(PatchError::OutOfBounds { offset: 2, len: 4 })
        ));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 4]);
    }
}
