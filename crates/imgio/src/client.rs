//! Codec I/O adapters.
//!
//! Codec libraries want a handle plus callbacks for read, write, seek,
//! close, size, map and unmap. [`ClientIo`] is that callback table.
//! [`ClientHandle`] turns one into `std::io::{Read, Write, Seek}` so codec
//! crates can drive it directly.
//!
//! Two adapters are provided:
//!
//! - [`StreamReader`] reads from a [`Stream`]. Write and map are rejected.
//! - [`MemoryWriter`] accumulates into a [`WriteSink`] and hands the
//!   consolidated buffer to its output slot on close. Read and size are
//!   rejected.
//!
//! Rejected callbacks report through [`hooks::error`] before failing, as a
//! codec library would see them.

use crate::hooks;
use crate::sink::WriteSink;
use crate::stream::Stream;
use crate::{IoError, IoResult};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::trace;

// ============================================================================
// Callback contract
// ============================================================================

/// Callback table a codec library drives.
pub trait ClientIo {
    /// Reads into `buf`, 0 at end of input.
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize>;

    /// Writes `buf`, returning bytes accepted.
    fn write(&mut self, buf: &[u8]) -> IoResult<usize>;

    /// Moves the cursor, returning the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64>;

    /// Releases the handle. A second close is a no-op.
    fn close(&mut self) -> IoResult<()>;

    /// Total length of the underlying data.
    fn size(&mut self) -> IoResult<u64>;

    /// Maps the whole input into memory.
    fn map(&mut self) -> IoResult<&[u8]>;

    /// Releases a mapping obtained from [`ClientIo::map`].
    fn unmap(&mut self) -> IoResult<()>;
}

fn reject(module: &str, what: &str) -> IoError {
    hooks::error(module, what);
    IoError::UnsupportedOperation(format!("{module}: {what}"))
}

// ============================================================================
// Read adapter
// ============================================================================

/// Read-only adapter over a [`Stream`].
///
/// Holds one reference to the stream from [`open`](Self::open) until
/// [`close`](ClientIo::close).
#[derive(Debug)]
pub struct StreamReader {
    stream: Option<Stream>,
}

impl StreamReader {
    /// Rewinds `stream` and takes a reference to it.
    pub fn open(stream: &Stream) -> IoResult<Self> {
        stream.rewind()?;
        trace!(stream = stream.nickname(), "read adapter opened");
        Ok(Self {
            stream: Some(stream.clone()),
        })
    }

    /// The wrapped stream, `None` once closed.
    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    fn live(&self) -> IoResult<&Stream> {
        self.stream.as_ref().ok_or(IoError::Closed)
    }
}

impl ClientIo for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.live()?.read(buf)
    }

    fn write(&mut self, _buf: &[u8]) -> IoResult<usize> {
        Err(reject("StreamReader", "write on a read-only handle"))
    }

    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.live()?.seek(pos)
    }

    fn close(&mut self) -> IoResult<()> {
        if let Some(stream) = self.stream.take() {
            trace!(stream = stream.nickname(), "read adapter closed");
        }
        Ok(())
    }

    fn size(&mut self) -> IoResult<u64> {
        let stream = self.live()?;
        stream.size().ok_or_else(|| {
            IoError::UnsupportedOperation(format!("{}: length unknown", stream.nickname()))
        })
    }

    fn map(&mut self) -> IoResult<&[u8]> {
        Err(reject("StreamReader", "map is not supported"))
    }

    fn unmap(&mut self) -> IoResult<()> {
        Err(reject("StreamReader", "unmap is not supported"))
    }
}

// ============================================================================
// Write adapter
// ============================================================================

/// Write adapter over a [`WriteSink`].
///
/// On the first close the sink is consolidated and moved into the output
/// slot given at construction.
#[derive(Debug)]
pub struct MemoryWriter<'a> {
    sink: Option<WriteSink>,
    out: &'a mut Option<Vec<u8>>,
}

impl<'a> MemoryWriter<'a> {
    /// Creates a writer that delivers into `out` on close.
    pub fn new(out: &'a mut Option<Vec<u8>>) -> Self {
        Self {
            sink: Some(WriteSink::new()),
            out,
        }
    }

    fn live(&mut self) -> IoResult<&mut WriteSink> {
        self.sink.as_mut().ok_or(IoError::Closed)
    }
}

impl ClientIo for MemoryWriter<'_> {
    fn read(&mut self, _buf: &mut [u8]) -> IoResult<usize> {
        Err(reject("MemoryWriter", "read on a write-only handle"))
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.live()?.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        self.live()?.seek(pos)
    }

    fn close(&mut self) -> IoResult<()> {
        if let Some(sink) = self.sink.take() {
            let data = sink.into_vec();
            trace!(len = data.len(), "write adapter closed");
            *self.out = Some(data);
        }
        Ok(())
    }

    fn size(&mut self) -> IoResult<u64> {
        Err(reject("MemoryWriter", "size of an output handle"))
    }

    fn map(&mut self) -> IoResult<&[u8]> {
        Err(reject("MemoryWriter", "map is not supported"))
    }

    fn unmap(&mut self) -> IoResult<()> {
        Err(reject("MemoryWriter", "unmap is not supported"))
    }
}

// ============================================================================
// std::io bridge
// ============================================================================

/// `std::io` view over a [`ClientIo`]. Closes the adapter when dropped.
#[derive(Debug)]
pub struct ClientHandle<C: ClientIo> {
    io: C,
}

impl<C: ClientIo> ClientHandle<C> {
    /// Wraps an adapter.
    pub fn new(io: C) -> Self {
        Self { io }
    }

    /// The adapter.
    pub fn get_ref(&self) -> &C {
        &self.io
    }

    /// The adapter, mutably, for callbacks `std::io` has no name for.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.io
    }

    /// Closes the adapter now, reporting any error.
    pub fn close(&mut self) -> IoResult<()> {
        self.io.close()
    }
}

impl<C: ClientIo> Read for ClientHandle<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.read(buf).map_err(IoError::into_io)
    }
}

impl<C: ClientIo> Write for ClientHandle<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.io.write(buf).map_err(IoError::into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: ClientIo> Seek for ClientHandle<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.io.seek(pos).map_err(IoError::into_io)
    }
}

impl<C: ClientIo> Drop for ClientHandle<C> {
    fn drop(&mut self) {
        if let Err(err) = self.io.close() {
            hooks::error("ClientHandle", &err.to_string());
        }
    }
}

/// Writer the encoders accept.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

/// Runs `encode` against a memory write adapter and returns the buffer.
pub fn encode_to_vec<F>(encode: F) -> IoResult<Vec<u8>>
where
    F: FnOnce(&mut dyn WriteSeek) -> IoResult<()>,
{
    let mut out = None;
    {
        let mut handle = ClientHandle::new(MemoryWriter::new(&mut out));
        encode(&mut handle)?;
        handle.close()?;
    }
    out.ok_or_else(|| IoError::EncodeError("write adapter produced no output".into()))
}
