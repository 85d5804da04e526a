//! File-backed stream backend.

use super::{StreamBackend, StreamKind};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Buffered reader over an open file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    reader: BufReader<File>,
    len: u64,
}

impl FileBackend {
    /// Opens `path` for reading.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            len,
        })
    }

    /// Path this backend reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StreamBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }

    fn size(&mut self) -> Option<u64> {
        Some(self.len)
    }

    fn kind(&self) -> StreamKind {
        StreamKind::File
    }
}
