// src/engine/io.rs
//
// I/O operations: Source enum, memory-mapped file loading, and file output.

use crate::error::{PlumError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Image source - in-memory data, a memory-mapped file, or a path read on demand
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory encoded data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
    /// File path for lazy loading (data is read only when needed)
    Path(PathBuf),
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Source::Memory(Arc::new(data))
    }
}

impl From<&[u8]> for Source {
    fn from(data: &[u8]) -> Self {
        Source::Memory(Arc::new(data.to_vec()))
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Source {
    /// Map a file into memory.
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PlumError::file_not_found(display(path))
            } else {
                PlumError::file_read_failed(display(path), e)
            }
        })?;
        // Safety: We assume the file won't be modified externally while mapped.
        // A concurrent truncation is outside what this crate can defend against.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| PlumError::mmap_failed(display(path), e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    /// Load the actual bytes from the source.
    /// For Mapped sources this copies; prefer [`Source::as_bytes`].
    pub fn load(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Mapped(mmap) => Ok(Arc::new(mmap.as_ref().to_vec())),
            Source::Path(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    if e.kind() == ErrorKind::NotFound {
                        PlumError::file_not_found(display(path))
                    } else {
                        PlumError::file_read_failed(display(path), e)
                    }
                })?;
                Ok(Arc::new(data))
            }
        }
    }

    /// Get path if this is a Path source
    pub fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Source::Path(p) => Some(p),
            Source::Memory(_) | Source::Mapped(_) => None,
        }
    }

    /// Get the bytes directly - works for both Memory and Mapped sources
    /// Returns None only for Path sources (which need to be loaded first)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    /// Run `f` over the source bytes, reading Path sources first.
    pub fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        match self.as_bytes() {
            Some(bytes) => f(bytes),
            None => {
                let data = self.load()?;
                f(&data)
            }
        }
    }

    /// Get the length of the source data
    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
            Source::Path(_) => 0, // Unknown until loaded
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write encoded output to a file, replacing it.
pub fn write_file(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, data).map_err(|e| PlumError::file_write_failed(display(path), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_source_exposes_bytes() {
        let source = Source::from(vec![1u8, 2, 3]);
        assert_eq!(source.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(source.len(), 3);
        assert!(source.as_path().is_none());
    }

    #[test]
    fn mapped_file_matches_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plum").unwrap();
        file.flush().unwrap();
        let source = Source::map_file(file.path()).unwrap();
        assert_eq!(source.as_bytes(), Some(&b"plum"[..]));
        assert_eq!(source.load().unwrap().as_slice(), b"plum");
    }

    #[test]
    fn path_source_reads_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"lazy").unwrap();
        file.flush().unwrap();
        let source = Source::from(file.path().to_path_buf());
        assert!(source.as_bytes().is_none());
        let len = source.with_bytes(|bytes| Ok(bytes.len())).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            Source::map_file(&missing),
            Err(PlumError::FileNotFound { .. })
        ));
        assert!(matches!(
            Source::Path(missing).load(),
            Err(PlumError::FileNotFound { .. })
        ));
    }

    #[test]
    fn write_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        write_file(&path, b"data").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        let bad = dir.path().join("no-such-dir").join("out.bin");
        assert!(matches!(
            write_file(&bad, b"x"),
            Err(PlumError::FileWriteFailed { .. })
        ));
    }
}
