//! Codec trait and save options.
//!
//! A [`Codec`] claims inputs by magic bytes, decodes from a [`Stream`] in
//! two phases (header, then pixels) and encodes into any seekable writer,
//! normally the memory write adapter from [`crate::client`].

use crate::client::WriteSeek;
use crate::detect::{Format, MAGIC_LEN};
use crate::loader::LoadOptions;
use crate::stream::Stream;
use crate::{ImageData, ImageInfo, IoResult};

/// Format handler registered with the [`crate::registry::Registry`].
pub trait Codec: Send + Sync {
    /// Short name used in logs and the CLI, e.g. `"jpegload"`.
    fn name(&self) -> &'static str;

    /// Format this codec handles.
    fn format(&self) -> Format;

    /// Lower-case suffixes with leading dot.
    fn suffixes(&self) -> &'static [&'static str];

    /// Dispatch priority. Higher wins when several codecs claim an input.
    fn priority(&self) -> i32 {
        0
    }

    /// Cheap magic check on a short prefix.
    fn probe_bytes(&self, prefix: &[u8]) -> bool;

    /// Whether `stream` holds this format. Never moves the read position.
    fn probe_stream(&self, stream: &Stream) -> IoResult<bool> {
        Ok(self.probe_bytes(&stream.sniff(MAGIC_LEN)?))
    }

    /// Reads dimensions and metadata only.
    fn read_header(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageInfo>;

    /// Decodes pixels.
    fn read_image(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageData>;

    /// Encodes `image` into `out`.
    fn write(&self, image: &ImageData, out: &mut dyn WriteSeek, options: &SaveOptions)
        -> IoResult<()>;
}

/// Chroma subsampling for lossy savers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subsample {
    /// Encoder default: 4:2:0 below quality 90, 4:4:4 above.
    #[default]
    Auto,
    /// Always 4:2:0.
    On,
    /// Never subsample (4:4:4).
    Off,
}

/// Lossless compression for TIFF output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// LZW compression.
    Lzw,
    /// Deflate/ZIP compression.
    Deflate,
    /// PackBits RLE compression.
    PackBits,
}

impl Compression {
    /// Parses a CLI-style name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Compression::None),
            "lzw" => Some(Compression::Lzw),
            "deflate" | "zip" => Some(Compression::Deflate),
            "packbits" => Some(Compression::PackBits),
            _ => None,
        }
    }
}

/// Options shared by all savers. Codecs ignore what they cannot use.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Lossy quality, 1..=100.
    pub quality: u8,
    /// Progressive (multiscan) JPEG.
    pub progressive: bool,
    /// Chroma subsampling.
    pub subsample: Subsample,
    /// TIFF compression.
    pub compression: Compression,
    /// Drop ICC, EXIF, XMP and IPTC blocks.
    pub strip: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            quality: 75,
            progressive: false,
            subsample: Subsample::Auto,
            compression: Compression::None,
            strip: false,
        }
    }
}

impl SaveOptions {
    /// Sets quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Enables progressive output.
    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }

    /// Sets chroma subsampling.
    pub fn with_subsample(mut self, subsample: Subsample) -> Self {
        self.subsample = subsample;
        self
    }

    /// Sets TIFF compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Strips embedded metadata blocks.
    pub fn with_strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_names() {
        assert_eq!(Compression::from_name("LZW"), Some(Compression::Lzw));
        assert_eq!(Compression::from_name("zip"), Some(Compression::Deflate));
        assert_eq!(Compression::from_name("jpeg"), None);
    }

    #[test]
    fn save_defaults() {
        let opts = SaveOptions::default().with_quality(90).with_strip(true);
        assert_eq!(opts.quality, 90);
        assert!(opts.strip);
        assert_eq!(opts.subsample, Subsample::Auto);
    }
}
