//! Growable in-memory write sink.
//!
//! Length and cursor are tracked separately: encoders routinely write a
//! placeholder, carry on, then seek back and patch it. A write only extends
//! the sink when it runs past the current end; a cursor beyond the end is
//! zero-filled on the next write.

use crate::{IoError, IoResult};
use std::io::{self, SeekFrom};

/// Byte accumulator with a movable cursor.
#[derive(Debug, Default)]
pub struct WriteSink {
    data: Vec<u8>,
    position: usize,
}

impl WriteSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty sink with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Writes all of `buf` at the cursor.
    ///
    /// Fails without touching the sink if the end offset overflows or the
    /// buffer cannot grow to reach it.
    pub fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let end = self.position.checked_add(buf.len()).ok_or_else(|| {
            IoError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sink write of {} bytes at {} overflows", buf.len(), self.position),
            ))
        })?;
        if end > self.data.len() {
            self.data
                .try_reserve(end - self.data.len())
                .map_err(|e| IoError::Io(io::Error::new(io::ErrorKind::OutOfMemory, e)))?;
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(buf.len())
    }

    /// Moves the cursor, returning the new absolute position.
    pub fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let base = self.position as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => base.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
        };
        let target = target
            .and_then(|t| usize::try_from(t).ok())
            .ok_or_else(|| {
                IoError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid sink seek {pos:?} from {base}"),
                ))
            })?;
        self.position = target;
        Ok(target as u64)
    }

    /// Current cursor.
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    /// Bytes written so far, independent of the cursor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes the sink, handing over the contiguous buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
