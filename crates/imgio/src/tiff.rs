//! TIFF format support.
//!
//! Reads the first image directory of a TIFF or BigTIFF file through the
//! stream read adapter, and writes single-directory files through the
//! memory write adapter.
//!
//! # Features
//!
//! - 8-bit, 16-bit and 32-bit float samples
//! - Gray, gray+alpha, RGB, RGBA and CMYK
//! - LZW, Deflate and PackBits compression on save
//! - ICC profile, XMP, IPTC, orientation and resolution tags
//!
//! The decoder needs random access, so an unseekable stream is kept fully
//! retained while a TIFF is read from it. `shrink` is a box filter applied
//! after decoding.
//!
//! # Example
//!
//! ```rust,ignore
//! use imgio::tiff;
//! use imgio::{Compression, LoadOptions, SaveOptions};
//!
//! let image = tiff::load("scan.tiff", &LoadOptions::default())?;
//! let opts = SaveOptions::default().with_compression(Compression::Lzw);
//! tiff::save("output.tiff", &image, &opts)?;
//! ```

use crate::client::{ClientHandle, StreamReader, WriteSeek};
use crate::detect::{self, Format};
use crate::hooks::{self, DecodeScope};
use crate::loader::{BufferOrigin, FileOrigin, LoadOptions, Loader, StreamOrigin};
use crate::metadata::keys;
use crate::orient;
use crate::stream::Stream;
use crate::traits::{Codec, Compression, SaveOptions};
use crate::{
    AttrValue, ImageData, ImageInfo, Interpretation, IoError, IoResult, Metadata, PixelData,
    PixelFormat,
};
use std::io::{BufReader, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{self, ColorType as EncodeColor};
use tiff::encoder::{Rational, TiffEncoder, TiffValue};
use tiff::tags::{ResolutionUnit, Tag};
use tracing::{debug, trace};

/// Dispatch priority: same as JPEG, the magic is four fixed bytes.
pub const PRIORITY: i32 = 50;

const MODULE: &str = "tiff2vips";
const SAVE_MODULE: &str = "vips2tiff";

const TAG_XMP: u16 = 700;
const TAG_IPTC: u16 = 33723;

type Input = BufReader<ClientHandle<StreamReader>>;

/// TIFF codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffCodec;

impl Codec for TiffCodec {
    fn name(&self) -> &'static str {
        "tiffload"
    }

    fn format(&self) -> Format {
        Format::Tiff
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".tif", ".tiff"]
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn probe_bytes(&self, prefix: &[u8]) -> bool {
        detect::is_tiff(prefix)
    }

    fn read_header(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageInfo> {
        options.validate()?;
        let scope = DecodeScope::enter(options.fail);

        let mut decoder = open_decoder(stream)?;
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let layout = Layout::of(decoder.colortype().map_err(tiff_error)?)?;
        let mut metadata = read_metadata(&mut decoder);

        let (width, height) = orient::shrunk_size(width, height, options.shrink);
        let (width, height) = match options.autorotate {
            true => match orient::take_orientation(&mut metadata) {
                Some(orientation) => orient::oriented_size(width, height, orientation),
                None => (width, height),
            },
            false => (width, height),
        };

        scope.check()?;
        debug!(stream = stream.nickname(), width, height, "tiff header");
        Ok(ImageInfo {
            width,
            height,
            channels: layout.channels,
            format: layout.format,
            interpretation: layout.interpretation,
            metadata,
        })
    }

    fn read_image(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageData> {
        options.validate()?;
        let scope = DecodeScope::enter(options.fail);

        let mut decoder = open_decoder(stream)?;
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let color = decoder.colortype().map_err(tiff_error)?;
        let layout = Layout::of(color)?;
        let metadata = read_metadata(&mut decoder);

        let data = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U8(buf) => PixelData::U8(buf),
            DecodingResult::U16(buf) => PixelData::U16(buf),
            DecodingResult::F32(buf) => PixelData::F32(buf),
            _ => {
                return Err(IoError::UnsupportedFormat(format!(
                    "unsupported TIFF sample type for {color:?}"
                )));
            }
        };
        if data.format() != layout.format {
            return Err(IoError::DecodeError(format!(
                "{color:?} decoded as {:?} samples",
                data.format()
            )));
        }

        let mut image = ImageData::from_data(width, height, layout.channels, data)?
            .with_interpretation(layout.interpretation);
        image.metadata = metadata;
        if options.shrink > 1 {
            image = orient::shrink(&image, options.shrink);
        }
        if options.autorotate {
            if let Some(orientation) = orient::take_orientation(&mut image.metadata) {
                trace!(orientation, "autorotate");
                image = orient::apply_orientation(&image, orientation);
            }
        }

        scope.check()?;
        debug!(
            stream = stream.nickname(),
            width = image.width,
            height = image.height,
            channels = image.channels,
            "tiff load"
        );
        Ok(image)
    }

    fn write(&self, image: &ImageData, out: &mut dyn WriteSeek, options: &SaveOptions) -> IoResult<()> {
        use tiff::encoder::compression::DeflateLevel;

        let compression = match options.compression {
            Compression::None => tiff::encoder::Compression::Uncompressed,
            Compression::Lzw => tiff::encoder::Compression::Lzw,
            Compression::Deflate => tiff::encoder::Compression::Deflate(DeflateLevel::Balanced),
            Compression::PackBits => tiff::encoder::Compression::Packbits,
        };
        let mut tiff = TiffEncoder::new(&mut *out)
            .map_err(tiff_error)?
            .with_compression(compression);

        trace!(
            width = image.width,
            height = image.height,
            compression = ?options.compression,
            "tiff encode"
        );
        let cmyk = image.interpretation == Interpretation::Cmyk;
        match (&image.data, image.channels) {
            (PixelData::U8(v), 1) => encode::<_, colortype::Gray8>(&mut tiff, image, v, options),
            (PixelData::U8(v), 2) => {
                encode::<_, colortype::Gray8>(&mut tiff, image, &drop_alpha(v), options)
            }
            (PixelData::U8(v), 3) => encode::<_, colortype::RGB8>(&mut tiff, image, v, options),
            (PixelData::U8(v), 4) if cmyk => {
                encode::<_, colortype::CMYK8>(&mut tiff, image, v, options)
            }
            (PixelData::U8(v), 4) => encode::<_, colortype::RGBA8>(&mut tiff, image, v, options),
            (PixelData::U16(v), 1) => encode::<_, colortype::Gray16>(&mut tiff, image, v, options),
            (PixelData::U16(v), 2) => {
                encode::<_, colortype::Gray16>(&mut tiff, image, &drop_alpha(v), options)
            }
            (PixelData::U16(v), 3) => encode::<_, colortype::RGB16>(&mut tiff, image, v, options),
            (PixelData::U16(v), 4) if cmyk => {
                encode::<_, colortype::CMYK16>(&mut tiff, image, v, options)
            }
            (PixelData::U16(v), 4) => encode::<_, colortype::RGBA16>(&mut tiff, image, v, options),
            (PixelData::F32(v), 1) => {
                encode::<_, colortype::Gray32Float>(&mut tiff, image, v, options)
            }
            (PixelData::F32(v), 2) => {
                encode::<_, colortype::Gray32Float>(&mut tiff, image, &drop_alpha(v), options)
            }
            (PixelData::F32(v), 3) => {
                encode::<_, colortype::RGB32Float>(&mut tiff, image, v, options)
            }
            (PixelData::F32(v), 4) if cmyk => {
                encode::<_, colortype::CMYK32Float>(&mut tiff, image, v, options)
            }
            (PixelData::F32(v), 4) => {
                encode::<_, colortype::RGBA32Float>(&mut tiff, image, v, options)
            }
            (_, n) => Err(IoError::EncodeError(format!(
                "cannot save a {n}-channel image as TIFF"
            ))),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct Layout {
    channels: u32,
    format: PixelFormat,
    interpretation: Interpretation,
}

impl Layout {
    fn of(color: tiff::ColorType) -> IoResult<Self> {
        use tiff::ColorType as Tc;
        let (channels, bits, interpretation) = match color {
            Tc::Gray(b) => (1, b, Interpretation::BW),
            Tc::GrayA(b) => (2, b, Interpretation::BW),
            Tc::RGB(b) => (3, b, Interpretation::Srgb),
            Tc::RGBA(b) => (4, b, Interpretation::Srgb),
            Tc::CMYK(b) => (4, b, Interpretation::Cmyk),
            other => {
                return Err(IoError::UnsupportedFormat(format!(
                    "unsupported TIFF color type: {other:?}"
                )));
            }
        };
        let format = match bits {
            8 => PixelFormat::U8,
            16 => PixelFormat::U16,
            32 => PixelFormat::F32,
            other => {
                return Err(IoError::UnsupportedFormat(format!(
                    "unsupported TIFF bit depth: {other}"
                )));
            }
        };
        Ok(Self {
            channels,
            format,
            interpretation,
        })
    }
}

fn open_decoder(stream: &Stream) -> IoResult<Decoder<Input>> {
    let reader = StreamReader::open(stream)?;
    Decoder::new(BufReader::new(ClientHandle::new(reader))).map_err(tiff_error)
}

/// Collects tags from the current directory. Tags with an unexpected type
/// are reported as warnings and skipped.
fn read_metadata(decoder: &mut Decoder<Input>) -> Metadata {
    let mut meta = Metadata::default();

    for (tag, key) in [
        (Tag::IccProfile, keys::ICC_PROFILE),
        (Tag::Unknown(TAG_XMP), keys::XMP),
        (Tag::Unknown(TAG_IPTC), keys::IPTC),
    ] {
        match decoder.find_tag(tag) {
            Ok(Some(value)) => match value.into_u8_vec() {
                Ok(bytes) => meta.set_blob(key, bytes),
                Err(err) => hooks::warning(MODULE, &format!("ignoring {key}: {err}")),
            },
            Ok(None) => {}
            Err(err) => hooks::warning(MODULE, &format!("unreadable {key}: {err}")),
        }
    }

    match decoder.find_tag_unsigned::<u16>(Tag::Orientation) {
        Ok(Some(orientation)) if (1..=8).contains(&orientation) => {
            meta.set_orientation(orientation);
        }
        Ok(Some(orientation)) => {
            hooks::warning(MODULE, &format!("invalid orientation {orientation}"));
        }
        Ok(None) => {}
        Err(err) => hooks::warning(MODULE, &format!("unreadable orientation: {err}")),
    }

    let unit = decoder
        .find_tag_unsigned::<u16>(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .unwrap_or(2);
    let xres = resolution(decoder, Tag::XResolution);
    let yres = resolution(decoder, Tag::YResolution).or(xres);
    if let (Some(x), Some(y)) = (xres, yres) {
        match unit {
            2 => meta.set_resolution(x / 25.4, y / 25.4, "in"),
            3 => meta.set_resolution(x / 10.0, y / 10.0, "cm"),
            _ => {}
        }
    }
    meta
}

fn resolution(decoder: &mut Decoder<Input>, tag: Tag) -> Option<f64> {
    use tiff::decoder::ifd::Value;
    let value = match decoder.find_tag(tag).ok()?? {
        Value::List(mut list) if !list.is_empty() => list.swap_remove(0),
        value => value,
    };
    match value {
        Value::Rational(n, d) if n > 0 && d > 0 => Some(f64::from(n) / f64::from(d)),
        Value::Float(v) if v > 0.0 => Some(f64::from(v)),
        Value::Double(v) if v > 0.0 => Some(v),
        _ => None,
    }
}

fn tiff_error(err: tiff::TiffError) -> IoError {
    match err {
        tiff::TiffError::IoError(err) => IoError::from_io(err),
        tiff::TiffError::FormatError(err) => IoError::Format(err.to_string()),
        tiff::TiffError::UnsupportedError(err) => IoError::UnsupportedFormat(err.to_string()),
        other => IoError::DecodeError(other.to_string()),
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn drop_alpha<T: Copy>(samples: &[T]) -> Vec<T> {
    hooks::warning(SAVE_MODULE, "alpha dropped from gray+alpha image");
    samples.chunks_exact(2).map(|px| px[0]).collect()
}

fn encode<W, C>(
    tiff: &mut TiffEncoder<W>,
    image: &ImageData,
    samples: &[C::Inner],
    options: &SaveOptions,
) -> IoResult<()>
where
    W: Write + Seek,
    C: EncodeColor,
    [C::Inner]: TiffValue,
{
    let mut encoder = tiff
        .new_image::<C>(image.width, image.height)
        .map_err(tiff_error)?;

    if let Some(dpi) = image.metadata.dpi.filter(|d| *d > 0.0) {
        let n = (f64::from(dpi) * 1000.0).round() as u32;
        encoder.resolution(ResolutionUnit::Inch, Rational { n, d: 1000 });
    }

    let meta = &image.metadata;
    if let Some(orientation) = meta.orientation() {
        encoder
            .encoder()
            .write_tag(Tag::Orientation, orientation)
            .map_err(tiff_error)?;
    }
    if !options.strip {
        for (tag, key) in [
            (Tag::IccProfile, keys::ICC_PROFILE),
            (Tag::Unknown(TAG_XMP), keys::XMP),
            (Tag::Unknown(TAG_IPTC), keys::IPTC),
        ] {
            if let Some(blob) = meta.attrs.get(key).and_then(AttrValue::as_bytes) {
                encoder.encoder().write_tag(tag, blob).map_err(tiff_error)?;
            }
        }
    }

    encoder.write_data(samples).map_err(tiff_error)
}

// ============================================================================
// Convenience API
// ============================================================================

fn codec() -> Arc<dyn Codec> {
    Arc::new(TiffCodec)
}

/// Loads a TIFF file.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), FileOrigin::new(path));
    loader.configure(*options)?;
    loader.into_image()
}

/// Loads TIFF data from a shared buffer.
pub fn load_buffer(data: impl Into<Arc<[u8]>>, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), BufferOrigin::new(data));
    loader.configure(*options)?;
    loader.into_image()
}

/// Loads TIFF data from a stream.
pub fn load_stream(stream: &Stream, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), StreamOrigin::new(stream));
    loader.configure(*options)?;
    loader.into_image()
}

/// Reads the header of a TIFF file.
pub fn header(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageInfo> {
    let mut loader = Loader::new(codec(), FileOrigin::new(path));
    loader.configure(*options)?;
    loader.header().cloned()
}

/// Whether `path` holds TIFF data.
pub fn is_a_file(path: impl AsRef<Path>) -> bool {
    Stream::open_file(path)
        .and_then(|stream| TiffCodec.probe_stream(&stream))
        .unwrap_or(false)
}

/// Whether `data` starts like a TIFF.
pub fn is_a_buffer(data: &[u8]) -> bool {
    TiffCodec.probe_bytes(data)
}

/// Whether `stream` holds TIFF data, without consuming it.
pub fn is_a_stream(stream: &Stream) -> IoResult<bool> {
    TiffCodec.probe_stream(stream)
}

/// Encodes into memory.
pub fn save_buffer(image: &ImageData, options: &SaveOptions) -> IoResult<Vec<u8>> {
    crate::client::encode_to_vec(|out| TiffCodec.write(image, out, options))
}

/// Encodes to a file.
pub fn save(path: impl AsRef<Path>, image: &ImageData, options: &SaveOptions) -> IoResult<()> {
    std::fs::write(path, save_buffer(image, options)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(width: u32, height: u32) -> ImageData {
        let data = (0..width * height * 3).map(|i| (i % 251) as u8).collect();
        ImageData::from_u8(width, height, 3, data).unwrap()
    }

    #[test]
    fn roundtrip_is_lossless() {
        let image = rgb(7, 5);
        for compression in [
            Compression::None,
            Compression::Lzw,
            Compression::Deflate,
            Compression::PackBits,
        ] {
            let opts = SaveOptions::default().with_compression(compression);
            let bytes = save_buffer(&image, &opts).unwrap();
            assert!(is_a_buffer(&bytes));
            let back = load_buffer(bytes, &LoadOptions::default()).unwrap();
            assert_eq!(back.data, image.data, "{compression:?}");
            assert_eq!(back.interpretation, Interpretation::Srgb);
        }
    }

    #[test]
    fn sixteen_bit_and_float() {
        let gray = ImageData::from_data(3, 2, 1, PixelData::U16(vec![0, 1, 2, 60000, 4, 5])).unwrap();
        let back = load_buffer(save_buffer(&gray, &SaveOptions::default()).unwrap(), &LoadOptions::default())
            .unwrap();
        assert_eq!(back.format, PixelFormat::U16);
        assert_eq!(back.data, gray.data);

        let float = ImageData::from_data(1, 1, 3, PixelData::F32(vec![0.25, 0.5, 2.0])).unwrap();
        let back = load_buffer(save_buffer(&float, &SaveOptions::default()).unwrap(), &LoadOptions::default())
            .unwrap();
        assert_eq!(back.data, float.data);
    }

    #[test]
    fn cmyk_keeps_interpretation() {
        let image = ImageData::from_u8(2, 1, 4, vec![1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap()
            .with_interpretation(Interpretation::Cmyk);
        let back = load_buffer(save_buffer(&image, &SaveOptions::default()).unwrap(), &LoadOptions::default())
            .unwrap();
        assert_eq!(back.interpretation, Interpretation::Cmyk);
        assert_eq!(back.data, image.data);
    }

    #[test]
    fn tags_survive() {
        let mut image = rgb(4, 2);
        image.metadata.set_blob(keys::ICC_PROFILE, vec![9u8; 64]);
        image.metadata.set_blob(keys::XMP, b"<x:xmpmeta/>".to_vec());
        image.metadata.set_orientation(3);
        image.metadata.set_resolution(300.0 / 25.4, 300.0 / 25.4, "in");
        let bytes = save_buffer(&image, &SaveOptions::default()).unwrap();

        let info = TiffCodec
            .read_header(&Stream::from_memory(bytes.clone()), &LoadOptions::default())
            .unwrap();
        assert_eq!(info.metadata.icc_profile(), Some(&[9u8; 64][..]));
        assert_eq!(info.metadata.orientation(), Some(3));
        assert!((info.metadata.dpi.unwrap() - 300.0).abs() < 0.01);
        assert_eq!(
            info.metadata.attrs.get(keys::XMP).and_then(AttrValue::as_bytes),
            Some(&b"<x:xmpmeta/>"[..])
        );

        let stripped = save_buffer(&image, &SaveOptions::default().with_strip(true)).unwrap();
        let info = TiffCodec
            .read_header(&Stream::from_memory(stripped), &LoadOptions::default())
            .unwrap();
        assert!(info.metadata.icc_profile().is_none());
        assert_eq!(info.metadata.orientation(), Some(3));
    }

    #[test]
    fn shrink_rounds_up() {
        let bytes = save_buffer(&rgb(9, 5), &SaveOptions::default()).unwrap();
        let opts = LoadOptions::new().with_shrink(4);
        let info = TiffCodec.read_header(&Stream::from_memory(bytes.clone()), &opts).unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        let image = load_buffer(bytes, &opts).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
    }

    #[test]
    fn garbage_is_a_format_error() {
        let err = load_buffer(b"II*\0\xff\xff\xff\xff".to_vec(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, IoError::Format(_) | IoError::Io(_) | IoError::DecodeError(_)));
    }
}
