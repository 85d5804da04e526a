//! Format detection utilities.
//!
//! Detects image formats from file extensions and magic bytes. Magic checks
//! work on a short prefix and never need a rewindable source.

use crate::IoResult;
use crate::stream::Stream;
use std::path::Path;

/// Longest prefix any magic check looks at.
pub const MAGIC_LEN: usize = 8;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// JPEG / JFIF.
    Jpeg,
    /// TIFF and BigTIFF.
    Tiff,
    /// Unknown/unsupported format.
    Unknown,
}

impl Format {
    /// Detects format from file path (magic bytes, then extension).
    pub fn detect<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let path = path.as_ref();
        let format = Self::from_stream(&Stream::open_file(path)?)?;
        if format != Format::Unknown {
            return Ok(format);
        }
        Ok(Self::from_extension(path))
    }

    /// Detects format from file extension only.
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("jpg" | "jpeg" | "jpe" | "jfif") => Format::Jpeg,
            Some("tif" | "tiff") => Format::Tiff,
            _ => Format::Unknown,
        }
    }

    /// Detects format from a stream prefix without moving its position.
    pub fn from_stream(stream: &Stream) -> IoResult<Self> {
        Ok(Self::from_bytes(&stream.sniff(MAGIC_LEN)?))
    }

    /// Detects format from magic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if is_jpeg(bytes) {
            Format::Jpeg
        } else if is_tiff(bytes) {
            Format::Tiff
        } else {
            Format::Unknown
        }
    }

    /// Preferred file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Jpeg => "jpg",
            Format::Tiff => "tif",
            Format::Unknown => "",
        }
    }

    /// MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Tiff => "image/tiff",
            Format::Unknown => "application/octet-stream",
        }
    }
}

/// SOI marker.
pub fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == 0xD8
}

/// Classic (42) or BigTIFF (43) header in either byte order.
pub fn is_tiff(bytes: &[u8]) -> bool {
    match bytes {
        [b'I', b'I', 42 | 43, 0, ..] => true,
        [b'M', b'M', 0, 42 | 43, ..] => true,
        _ => false,
    }
}
