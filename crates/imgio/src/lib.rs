//! # imgio
//!
//! Image loading over pluggable byte streams.
//!
//! Codecs never see where their bytes come from. Every load goes through a
//! reference-counted [`Stream`] (file, memory blob or caller-supplied
//! handlers), and codec libraries talk to it through a callback adapter
//! that mirrors the read/write/seek/close/size/map/unmap contract they
//! expect.
//!
//! # Architecture
//!
//! - [`stream`] - `Stream` plus file, memory and user-hooked backends
//! - [`detect`] / [`registry`] - magic-byte sniffing and priority dispatch
//! - [`client`] - read adapter over a stream, write adapter over a
//!   growable [`sink`]
//! - [`loader`] - two-phase (header, then pixels) loader state machine
//! - [`hooks`] - process-wide warning/error handlers and fail-fast scoping
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use imgio::{LoadOptions, SaveOptions};
//!
//! let info = imgio::header("photo.jpg", &LoadOptions::default())?;
//! let image = imgio::load_with("photo.jpg", &LoadOptions::new().with_shrink(2))?;
//! imgio::save_with("thumb.tif", &image, &SaveOptions::default())?;
//! ```
//!
//! # Supported Formats
//!
//! | Format | Read | Write | Bit Depths | Features |
//! |--------|------|-------|------------|----------|
//! | JPEG | Yes | Yes | 8 (16 lossless read) | Shrink-on-load, ICC/EXIF/XMP/IPTC, thumbnail |
//! | TIFF | Yes | Yes | 8, 16, 32f | LZW, Deflate, PackBits, ICC/XMP/IPTC |
//!
//! # Feature Flags
//!
//! - `jpeg` - JPEG support via `jpeg-decoder` / `jpeg-encoder` (default)
//! - `tiff` - TIFF support via `tiff` (default)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod detect;
mod error;
pub mod exif;
pub mod hooks;
pub mod loader;
pub mod metadata;
pub mod orient;
pub mod registry;
pub mod sink;
pub mod stream;
mod traits;

#[cfg(feature = "jpeg")]
pub mod jpeg;

#[cfg(feature = "tiff")]
pub mod tiff;

pub use detect::Format;
pub use error::{ErrorClass, IoError, IoResult};
pub use loader::{BufferOrigin, FileOrigin, LoadOptions, Loader, LoaderState, Origin, StreamOrigin};
pub use metadata::{AttrValue, Attrs, Metadata};
pub use registry::Registry;
pub use stream::{Stream, UserSource, UserStream};
pub use traits::{Codec, Compression, SaveOptions, Subsample};

use std::path::Path;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Pixel types
// ============================================================================

/// Pixel data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit unsigned integer per channel.
    U8,
    /// 16-bit unsigned integer per channel.
    U16,
    /// 32-bit float per channel.
    F32,
}

impl PixelFormat {
    /// Bytes per sample.
    pub fn bytes(&self) -> usize {
        match self {
            PixelFormat::U8 => 1,
            PixelFormat::U16 => 2,
            PixelFormat::F32 => 4,
        }
    }
}

/// Raw pixel data storage, interleaved, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// 8-bit unsigned data.
    U8(Vec<u8>),
    /// 16-bit unsigned data.
    U16(Vec<u16>),
    /// 32-bit float data.
    F32(Vec<f32>),
}

impl PixelData {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
            PixelData::F32(v) => v.len(),
        }
    }

    /// True if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample format.
    pub fn format(&self) -> PixelFormat {
        match self {
            PixelData::U8(_) => PixelFormat::U8,
            PixelData::U16(_) => PixelFormat::U16,
            PixelData::F32(_) => PixelFormat::F32,
        }
    }

    /// Samples scaled to 8 bits.
    pub fn to_u8(&self) -> Vec<u8> {
        match self {
            PixelData::U8(v) => v.clone(),
            PixelData::U16(v) => v.iter().map(|&s| (s >> 8) as u8).collect(),
            PixelData::F32(v) => v
                .iter()
                .map(|&s| (s.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
        }
    }
}

/// Colour model of the decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// Grey, optionally with alpha.
    BW,
    /// RGB, optionally with alpha.
    Srgb,
    /// Four-ink CMYK.
    Cmyk,
    /// Anything else.
    Multiband,
}

impl Interpretation {
    /// Best guess from a channel count.
    pub fn guess(channels: u32) -> Self {
        match channels {
            1 | 2 => Interpretation::BW,
            3 | 4 => Interpretation::Srgb,
            _ => Interpretation::Multiband,
        }
    }
}

// ============================================================================
// Image types
// ============================================================================

/// Result of the header phase: everything but the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Width in pixels, after shrink and autorotate.
    pub width: u32,
    /// Height in pixels, after shrink and autorotate.
    pub height: u32,
    /// Samples per pixel.
    pub channels: u32,
    /// Sample format.
    pub format: PixelFormat,
    /// Colour model.
    pub interpretation: Interpretation,
    /// Embedded metadata.
    pub metadata: Metadata,
}

/// Decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Samples per pixel.
    pub channels: u32,
    /// Sample format.
    pub format: PixelFormat,
    /// Colour model.
    pub interpretation: Interpretation,
    /// Pixels.
    pub data: PixelData,
    /// Embedded metadata.
    pub metadata: Metadata,
}

impl ImageData {
    /// Creates a zeroed image.
    pub fn new(width: u32, height: u32, channels: u32, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * channels as usize;
        let data = match format {
            PixelFormat::U8 => PixelData::U8(vec![0; size]),
            PixelFormat::U16 => PixelData::U16(vec![0; size]),
            PixelFormat::F32 => PixelData::F32(vec![0.0; size]),
        };
        Self {
            width,
            height,
            channels,
            format,
            interpretation: Interpretation::guess(channels),
            data,
            metadata: Metadata::default(),
        }
    }

    /// Wraps existing samples, checking their count.
    pub fn from_data(width: u32, height: u32, channels: u32, data: PixelData) -> IoResult<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(IoError::DecodeError(format!(
                "{}x{}x{} image needs {expected} samples, got {}",
                width,
                height,
                channels,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            format: data.format(),
            interpretation: Interpretation::guess(channels),
            data,
            metadata: Metadata::default(),
        })
    }

    /// Wraps 8-bit samples.
    pub fn from_u8(width: u32, height: u32, channels: u32, data: Vec<u8>) -> IoResult<Self> {
        Self::from_data(width, height, channels, PixelData::U8(data))
    }

    /// Sets the colour model.
    pub fn with_interpretation(mut self, interpretation: Interpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    /// Replaces geometry and pixels, keeping everything else.
    pub fn with_pixels(&self, width: u32, height: u32, data: PixelData) -> Self {
        Self {
            width,
            height,
            channels: self.channels,
            format: data.format(),
            interpretation: self.interpretation,
            data,
            metadata: self.metadata.clone(),
        }
    }

    /// Header view of this image.
    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            width: self.width,
            height: self.height,
            channels: self.channels,
            format: self.format,
            interpretation: self.interpretation,
            metadata: self.metadata.clone(),
        }
    }
}

// ============================================================================
// Convenience API
// ============================================================================

/// Loads a file with default options.
pub fn load(path: impl AsRef<Path>) -> IoResult<ImageData> {
    load_with(path, &LoadOptions::default())
}

/// Loads a file, detecting the format from its content.
pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageData> {
    let path = path.as_ref();
    options.validate()?;
    let codec = Registry::global().detect_file(path)?;
    info!(path = %path.display(), codec = codec.name(), "load");
    let mut loader = Loader::new(codec, FileOrigin::new(path));
    loader.configure(*options)?;
    loader.into_image()
}

/// Reads only the header of a file.
pub fn header(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageInfo> {
    let path = path.as_ref();
    options.validate()?;
    let codec = Registry::global().detect_file(path)?;
    let mut loader = Loader::new(codec, FileOrigin::new(path));
    loader.configure(*options)?;
    loader.header().cloned()
}

/// Loads from a shared in-memory buffer.
pub fn load_buffer(data: impl Into<Arc<[u8]>>, options: &LoadOptions) -> IoResult<ImageData> {
    options.validate()?;
    let data: Arc<[u8]> = data.into();
    let codec = Registry::global().detect_buffer(&data)?;
    let mut loader = Loader::new(codec, BufferOrigin::new(data));
    loader.configure(*options)?;
    loader.into_image()
}

/// Loads from a stream. Unseekable streams are replayed from retained
/// bytes, so they must not have been consumed beforehand.
pub fn load_stream(stream: &Stream, options: &LoadOptions) -> IoResult<ImageData> {
    options.validate()?;
    let codec = Registry::global()
        .detect_stream(stream)?
        .ok_or_else(|| IoError::UnsupportedFormat(format!("{}: unknown format", stream.nickname())))?;
    let mut loader = Loader::new(codec, StreamOrigin::new(stream));
    loader.configure(*options)?;
    loader.into_image()
}

/// Saves with default options, picking the codec from the suffix.
pub fn save(path: impl AsRef<Path>, image: &ImageData) -> IoResult<()> {
    save_with(path, image, &SaveOptions::default())
}

/// Saves, picking the codec from the suffix.
pub fn save_with(path: impl AsRef<Path>, image: &ImageData, options: &SaveOptions) -> IoResult<()> {
    let path = path.as_ref();
    let codec = Registry::global().by_suffix(path).ok_or_else(|| {
        IoError::UnsupportedFormat(format!("no saver for {}", path.display()))
    })?;
    let bytes = client::encode_to_vec(|out| codec.write(image, out, options))?;
    info!(path = %path.display(), codec = codec.name(), bytes = bytes.len(), "save");
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Encodes into memory through the write adapter.
pub fn save_buffer(image: &ImageData, format: Format, options: &SaveOptions) -> IoResult<Vec<u8>> {
    Registry::global().save_buffer(image, format, options)
}
