//! User-hooked stream backend.
//!
//! Callers either implement [`UserSource`] or hand closures to
//! [`UserStream`]. A missing read handler reads as end of input; a missing
//! seek handler makes the stream unseekable, so seeks are emulated from
//! retained bytes or fail.

use super::{StreamBackend, StreamKind};
use std::fmt;
use std::io::{self, SeekFrom};
use tracing::debug;

/// Read handler: fill the buffer, return bytes written (0 at end).
pub type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send>;

/// Seek handler: move to the position, return the new absolute offset.
pub type SeekFn = Box<dyn FnMut(SeekFrom) -> io::Result<u64> + Send>;

/// Externally supplied byte source with two capability slots.
pub trait UserSource: Send {
    /// Reads into `buf`. Called only when [`UserSource::can_read`] holds.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Seeks. Called only when [`UserSource::can_seek`] holds.
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no seek handler attached",
        ))
    }

    /// Whether a read handler is attached.
    fn can_read(&self) -> bool {
        true
    }

    /// Whether a seek handler is attached.
    fn can_seek(&self) -> bool {
        false
    }
}

/// Closure-based [`UserSource`].
///
/// ```ignore
/// let mut cursor = std::io::Cursor::new(bytes);
/// let source = UserStream::new().on_read(move |buf| cursor.read(buf));
/// let stream = Stream::from_user(source);
/// ```
#[derive(Default)]
pub struct UserStream {
    read: Option<ReadFn>,
    seek: Option<SeekFn>,
}

impl UserStream {
    /// Creates a source with no handlers attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the read handler.
    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static,
    {
        self.read = Some(Box::new(f));
        self
    }

    /// Attaches the seek handler.
    pub fn on_seek<F>(mut self, f: F) -> Self
    where
        F: FnMut(SeekFrom) -> io::Result<u64> + Send + 'static,
    {
        self.seek = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for UserStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStream")
            .field("read", &self.read.is_some())
            .field("seek", &self.seek.is_some())
            .finish()
    }
}

impl UserSource for UserStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read.as_mut() {
            Some(handler) => handler(buf),
            None => Ok(0),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.seek.as_mut() {
            Some(handler) => handler(pos),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no seek handler attached",
            )),
        }
    }

    fn can_read(&self) -> bool {
        self.read.is_some()
    }

    fn can_seek(&self) -> bool {
        self.seek.is_some()
    }
}

/// Adapts a [`UserSource`] to the backend contract.
pub(crate) struct UserBackend {
    source: Box<dyn UserSource>,
}

impl UserBackend {
    pub(crate) fn new(source: impl UserSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

impl StreamBackend for UserBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.source.can_read() {
            debug!("read on user stream with no read handler");
            return Ok(0);
        }
        let n = self.source.read(buf)?;
        if n > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read handler reported {n} bytes for a {} byte buffer", buf.len()),
            ));
        }
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.source.seek(pos)
    }

    fn is_seekable(&self) -> bool {
        self.source.can_seek()
    }

    fn can_read(&self) -> bool {
        self.source.can_read()
    }

    fn kind(&self) -> StreamKind {
        StreamKind::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;
    use std::io::{Cursor, Read, Seek};
    use std::sync::{Arc, Mutex};

    #[test]
    fn missing_read_handler_reads_nothing() {
        let stream = Stream::from_user(UserStream::new());
        assert!(!stream.can_read());
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn missing_seek_handler_fails_seek_from_end() {
        let stream = Stream::from_user(UserStream::new().on_read(|_buf: &mut [u8]| Ok(0)));
        assert!(!stream.is_seekable());
        assert!(stream.seek(SeekFrom::End(0)).is_err());
    }

    #[test]
    fn seekable_source_reports_size_via_seek() {
        let cursor = Arc::new(Mutex::new(Cursor::new(vec![7u8; 42])));
        let reader = Arc::clone(&cursor);
        let seeker = Arc::clone(&cursor);
        let source = UserStream::new()
            .on_read(move |buf: &mut [u8]| reader.lock().unwrap().read(buf))
            .on_seek(move |pos| seeker.lock().unwrap().seek(pos));
        let stream = Stream::from_user(source);
        assert!(stream.is_seekable());
        assert_eq!(stream.size(), Some(42));
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn trait_impl_without_seek() {
        struct Zeros;
        impl UserSource for Zeros {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                buf.fill(0);
                Ok(buf.len())
            }
        }
        let stream = Stream::from_user(Zeros);
        assert!(!stream.is_seekable());
        assert_eq!(stream.sniff(4).unwrap(), vec![0; 4]);
    }
}
