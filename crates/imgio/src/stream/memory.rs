//! Memory-blob stream backend.

use super::{StreamBackend, StreamKind};
use std::io::{self, SeekFrom};
use std::sync::Arc;

/// Read cursor over a shared immutable byte region.
///
/// The blob is reference-counted, so the caller may keep its own handle
/// while a loader reads from it.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<[u8]>,
    position: u64,
}

impl MemoryBackend {
    /// Wraps `data`.
    pub fn new(data: Arc<[u8]>) -> Self {
        Self { data, position: 0 }
    }

    /// The whole blob.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl StreamBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.position = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }

    fn size(&mut self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn kind(&self) -> StreamKind {
        StreamKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_seek_fails_and_keeps_position() {
        let mut backend = MemoryBackend::new(Arc::from(&b"abc"[..]));
        backend.seek(SeekFrom::Start(2)).unwrap();
        assert!(backend.seek(SeekFrom::Current(-5)).is_err());
        let mut buf = [0u8; 4];
        assert_eq!(backend.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'c');
    }

    #[test]
    fn seek_past_end_reads_nothing() {
        let mut backend = MemoryBackend::new(Arc::from(&b"abc"[..]));
        assert_eq!(backend.seek(SeekFrom::Start(10)).unwrap(), 10);
        let mut buf = [0u8; 4];
        assert_eq!(backend.read(&mut buf).unwrap(), 0);
    }
}
