//! Reference-counted byte streams with a uniform read/seek contract.
//!
//! A [`Stream`] hides where bytes come from. Three backends ship with the
//! crate:
//!
//! | Backend | Seekable | Size known |
//! |---------|----------|------------|
//! | [`FileBackend`] | yes | yes |
//! | [`MemoryBackend`] | yes | yes |
//! | user-hooked ([`UserSource`]) | if a seek handler is attached | if seekable |
//!
//! Cloning a `Stream` takes another reference to the same underlying
//! source; the backend is released when the last clone is dropped.
//!
//! # Unseekable sources
//!
//! Bytes read from an unseekable backend are retained from offset 0 until
//! [`Stream::stop_retaining`] is called. While retained they can be replayed,
//! which is what makes [`Stream::sniff`] and [`Stream::rewind`] work on a
//! pipe. Forward seeks are emulated by reading and discarding.
//!
//! # Example
//!
//! ```ignore
//! use imgio::stream::Stream;
//!
//! let stream = Stream::from_memory(bytes);
//! let magic = stream.sniff(4)?;
//! stream.rewind()?;
//! ```

mod file;
mod memory;
mod user;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use user::{ReadFn, SeekFn, UserSource, UserStream};

use crate::{IoError, IoResult};
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Scratch size used when emulating forward seeks by reading.
const SKIP_CHUNK: usize = 8 * 1024;

// ============================================================================
// Backend contract
// ============================================================================

/// Physical origin of a stream's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// File on disk.
    File,
    /// Shared in-memory blob.
    Memory,
    /// Caller-supplied read/seek handlers.
    User,
}

/// A source a [`Stream`] can pull bytes from.
///
/// `read` returns 0 at end of input. Backends that cannot seek report
/// `is_seekable() == false` and are never asked to.
pub trait StreamBackend: Send {
    /// Reads up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves the read position, returning the new absolute offset.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Total length if the backend knows it without seeking.
    fn size(&mut self) -> Option<u64> {
        None
    }

    /// Whether `seek` is available.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Whether a read handler is attached.
    fn can_read(&self) -> bool {
        true
    }

    /// Which kind of origin this is.
    fn kind(&self) -> StreamKind;
}

// ============================================================================
// Stream
// ============================================================================

/// Shared, reference-counted byte source.
#[derive(Clone)]
pub struct Stream {
    shared: Arc<Shared>,
}

struct Shared {
    nickname: String,
    kind: StreamKind,
    seekable: bool,
    state: Mutex<State>,
}

struct State {
    backend: Box<dyn StreamBackend>,
    /// Logical read position.
    position: u64,
    /// Bytes `[0, consumed)` pulled from an unseekable backend, while retained.
    header: Vec<u8>,
    /// Bytes pulled from an unseekable backend so far.
    consumed: u64,
    retain: bool,
}

impl Stream {
    /// Wraps an arbitrary backend.
    pub fn from_backend(nickname: impl Into<String>, backend: impl StreamBackend + 'static) -> Self {
        let nickname = nickname.into();
        let kind = backend.kind();
        let seekable = backend.is_seekable();
        trace!(stream = %nickname, ?kind, seekable, "stream created");
        Self {
            shared: Arc::new(Shared {
                nickname,
                kind,
                seekable,
                state: Mutex::new(State {
                    backend: Box::new(backend),
                    position: 0,
                    header: Vec::new(),
                    consumed: 0,
                    retain: true,
                }),
            }),
        }
    }

    /// Opens a file-backed stream.
    pub fn open_file(path: impl AsRef<Path>) -> IoResult<Self> {
        let path = path.as_ref();
        let backend = FileBackend::open(path)
            .map_err(|err| IoError::origin(path.display().to_string(), err))?;
        Ok(Self::from_backend(path.display().to_string(), backend))
    }

    /// Wraps a shared immutable blob.
    pub fn from_memory(data: impl Into<Arc<[u8]>>) -> Self {
        Self::from_backend("memory", MemoryBackend::new(data.into()))
    }

    /// Wraps caller-supplied read/seek handlers.
    pub fn from_user(source: impl UserSource + 'static) -> Self {
        Self::from_backend("user", user::UserBackend::new(source))
    }

    /// Name used in logs and errors.
    pub fn nickname(&self) -> &str {
        &self.shared.nickname
    }

    /// Kind of backend behind this stream.
    pub fn kind(&self) -> StreamKind {
        self.shared.kind
    }

    /// Whether the backend supports random access.
    pub fn is_seekable(&self) -> bool {
        self.shared.seekable
    }

    /// Whether the backend can produce bytes at all.
    pub fn can_read(&self) -> bool {
        self.lock().backend.can_read()
    }

    /// Number of live references to this stream.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Current logical read position.
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    /// Reads up to `buf.len()` bytes. Returns 0 at end of input.
    pub fn read(&self, buf: &mut [u8]) -> IoResult<usize> {
        let n = self.lock().read(self.shared.seekable, buf)?;
        trace!(stream = %self.shared.nickname, requested = buf.len(), read = n, "read");
        Ok(n)
    }

    /// Reads until `buf` is full or input ends, returning the byte count.
    pub fn read_full(&self, buf: &mut [u8]) -> IoResult<usize> {
        self.lock().read_full(self.shared.seekable, buf)
    }

    /// Moves the read position and returns the new absolute offset.
    pub fn seek(&self, pos: SeekFrom) -> IoResult<u64> {
        let mut state = self.lock();
        let new_pos = if self.shared.seekable {
            state.seek_backend(pos)?
        } else {
            state.seek_emulated(pos)?
        };
        trace!(stream = %self.shared.nickname, ?pos, new_pos, "seek");
        Ok(new_pos)
    }

    /// Returns to offset 0.
    ///
    /// Unseekable streams rewind by replaying retained bytes, which fails
    /// once retention has been stopped and input consumed past it.
    pub fn rewind(&self) -> IoResult<()> {
        let mut state = self.lock();
        if self.shared.seekable {
            state.seek_backend(SeekFrom::Start(0))?;
        } else if state.header.len() as u64 == state.consumed {
            state.position = 0;
        } else {
            return Err(IoError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{}: cannot rewind, input no longer buffered", self.shared.nickname),
            )));
        }
        trace!(stream = %self.shared.nickname, "rewind");
        Ok(())
    }

    /// Total length, if it can be known.
    pub fn size(&self) -> Option<u64> {
        let mut state = self.lock();
        if let Some(len) = state.backend.size() {
            return Some(len);
        }
        if !self.shared.seekable {
            return None;
        }
        // Same dance as a C `fseek(SEEK_END); ftell; fseek(back)`.
        let backend = &mut state.backend;
        let here = backend.seek(SeekFrom::Current(0)).ok()?;
        let end = backend.seek(SeekFrom::End(0)).ok()?;
        backend.seek(SeekFrom::Start(here)).ok()?;
        Some(end)
    }

    /// Returns up to `len` bytes from offset 0 without moving the read
    /// position. Never consumes input from an unseekable source.
    pub fn sniff(&self, len: usize) -> IoResult<Vec<u8>> {
        let mut state = self.lock();
        let prefix = if self.shared.seekable {
            state.sniff_seekable(len)?
        } else {
            state.sniff_retained(len)?
        };
        trace!(stream = %self.shared.nickname, requested = len, got = prefix.len(), "sniff");
        Ok(prefix)
    }

    /// Stops retaining bytes read from an unseekable source.
    ///
    /// Called once a decoder starts its final pass. Already retained bytes
    /// are still replayed, then freed.
    pub fn stop_retaining(&self) {
        let mut state = self.lock();
        state.retain = false;
        state.release_if_drained();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("nickname", &self.shared.nickname)
            .field("kind", &self.shared.kind)
            .field("seekable", &self.shared.seekable)
            .finish()
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        trace!(stream = %self.nickname, "stream released");
    }
}

// ============================================================================
// State
// ============================================================================

impl State {
    fn read(&mut self, seekable: bool, buf: &mut [u8]) -> IoResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if seekable {
            let n = self.backend.read(buf).map_err(IoError::from_io)?;
            self.position += n as u64;
            return Ok(n);
        }

        if self.position < self.header.len() as u64 {
            let start = self.position as usize;
            let n = buf.len().min(self.header.len() - start);
            buf[..n].copy_from_slice(&self.header[start..start + n]);
            self.position += n as u64;
            self.release_if_drained();
            return Ok(n);
        }

        let n = self.backend.read(buf).map_err(IoError::from_io)?;
        if self.retain {
            self.header.extend_from_slice(&buf[..n]);
        }
        self.consumed += n as u64;
        self.position += n as u64;
        Ok(n)
    }

    fn read_full(&mut self, seekable: bool, buf: &mut [u8]) -> IoResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(seekable, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn seek_backend(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let new_pos = self.backend.seek(pos).map_err(IoError::from_io)?;
        self.position = new_pos;
        Ok(new_pos)
    }

    fn seek_emulated(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => match self.backend.size() {
                Some(len) => len.checked_add_signed(delta),
                None => {
                    return Err(IoError::Io(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "seek from end on an unseekable stream of unknown length",
                    )));
                }
            },
        }
        .ok_or_else(|| {
            IoError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing offset",
            ))
        })?;

        let replayable = self.header.len() as u64 == self.consumed;
        if target == self.consumed || (replayable && target < self.consumed) {
            self.position = target;
            self.release_if_drained();
            return Ok(target);
        }
        if target < self.consumed {
            return Err(IoError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "backward seek past retained input on an unseekable stream",
            )));
        }

        self.position = self.consumed;
        self.release_if_drained();
        let mut scratch = vec![0u8; SKIP_CHUNK];
        while self.position < target {
            let want = (target - self.position).min(SKIP_CHUNK as u64) as usize;
            if self.read(false, &mut scratch[..want])? == 0 {
                return Err(IoError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("seek to {target} past end of input at {}", self.position),
                )));
            }
        }
        Ok(self.position)
    }

    fn sniff_seekable(&mut self, len: usize) -> IoResult<Vec<u8>> {
        let saved = self.position;
        self.seek_backend(SeekFrom::Start(0))?;
        let mut prefix = vec![0u8; len];
        let got = self.read_full(true, &mut prefix);
        self.seek_backend(SeekFrom::Start(saved))?;
        prefix.truncate(got?);
        Ok(prefix)
    }

    fn sniff_retained(&mut self, len: usize) -> IoResult<Vec<u8>> {
        if self.header.len() as u64 != self.consumed {
            return Err(IoError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot sniff, input already consumed past its header",
            )));
        }
        let mut chunk = vec![0u8; SKIP_CHUNK];
        while self.header.len() < len {
            let want = (len - self.header.len()).min(SKIP_CHUNK);
            let n = self
                .backend
                .read(&mut chunk[..want])
                .map_err(IoError::from_io)?;
            if n == 0 {
                break;
            }
            self.header.extend_from_slice(&chunk[..n]);
            self.consumed += n as u64;
        }
        let end = len.min(self.header.len());
        Ok(self.header[..end].to_vec())
    }

    fn release_if_drained(&mut self) {
        if !self.retain && self.position >= self.consumed && !self.header.is_empty() {
            self.header = Vec::new();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Chunked, forward-only source.
    fn pipe(data: &'static [u8]) -> Stream {
        let mut cursor = Cursor::new(data);
        Stream::from_user(UserStream::new().on_read(move |buf: &mut [u8]| {
            let n = buf.len().min(3);
            io::Read::read(&mut cursor, &mut buf[..n])
        }))
    }

    #[test]
    fn memory_read_seek_size() {
        let stream = Stream::from_memory(b"0123456789".to_vec());
        assert!(stream.is_seekable());
        assert_eq!(stream.size(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
        stream.rewind().unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn sniff_does_not_move_position() {
        let stream = Stream::from_memory(b"abcdef".to_vec());
        let mut buf = [0u8; 3];
        stream.read(&mut buf).unwrap();
        assert_eq!(stream.sniff(2).unwrap(), b"ab");
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.sniff(100).unwrap(), b"abcdef");
    }

    #[test]
    fn pipe_sniff_then_full_read() {
        let stream = pipe(b"hello pipe");
        assert!(!stream.is_seekable());
        assert_eq!(stream.size(), None);
        assert_eq!(stream.sniff(5).unwrap(), b"hello");

        let mut out = vec![0u8; 32];
        let n = stream.read_full(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello pipe");

        stream.rewind().unwrap();
        let n = stream.read_full(&mut out).unwrap();
        assert_eq!(&out[..n], b"hello pipe");
    }

    #[test]
    fn pipe_forward_seek_is_emulated() {
        let stream = pipe(b"0123456789");
        assert_eq!(stream.seek(SeekFrom::Start(7)).unwrap(), 7);
        let mut buf = [0u8; 8];
        let n = stream.read_full(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"789");
        assert!(stream.seek(SeekFrom::Start(20)).is_err());
    }

    #[test]
    fn pipe_rewind_fails_after_retention_stops() {
        let stream = pipe(b"0123456789");
        let mut buf = [0u8; 4];
        stream.read_full(&mut buf).unwrap();
        stream.stop_retaining();
        stream.read_full(&mut buf).unwrap();
        assert!(stream.rewind().is_err());
        assert!(stream.sniff(2).is_err());
    }

    #[test]
    fn replay_survives_stop_retaining() {
        let stream = pipe(b"abcdefgh");
        stream.sniff(6).unwrap();
        stream.stop_retaining();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read_full(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn clones_share_position_and_count() {
        let stream = Stream::from_memory(b"xyz".to_vec());
        let other = stream.clone();
        assert_eq!(stream.ref_count(), 2);
        let mut buf = [0u8; 1];
        other.read(&mut buf).unwrap();
        assert_eq!(stream.position(), 1);
        drop(other);
        assert_eq!(stream.ref_count(), 1);
    }
}
