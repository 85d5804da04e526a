//! JPEG format support.
//!
//! Decoding uses `jpeg-decoder`, encoding `jpeg-encoder`. Both talk to the
//! data through the [`crate::client`] adapters, never to a file directly.
//!
//! # Loading
//!
//! Every phase first walks the marker segments up to the first scan. That
//! pass collects what `jpeg-decoder` does not expose (IPTC, JFIF density,
//! per-component sampling) and reports stray bytes between markers as a
//! warning. The stream is then rewound and handed to the decoder.
//!
//! - `shrink` uses the decoder's DCT scaling. Output sizes are
//!   `ceil(dim / shrink)` on both axes; when DCT scaling cannot produce
//!   that, the image is decoded at full size and box-shrunk.
//! - `autorotate` applies the EXIF orientation, drops the `orientation`
//!   attribute and rewrites the tag inside `exif-data` to 1.
//! - `fail` turns marker warnings into errors. Truncated data is always an
//!   error because the decoder has no partial-output mode.
//!
//! # Metadata
//!
//! | Key | Source |
//! |-----|--------|
//! | `icc-profile-data` | APP2 `ICC_PROFILE` chunks, reassembled |
//! | `exif-data` | APP1 `Exif` payload |
//! | `xmp-data` | APP1 Adobe XMP packet |
//! | `iptc-data` | APP13 `Photoshop 3.0` payload |
//! | `orientation` | EXIF IFD0 |
//! | `jpeg-thumbnail-data` | EXIF IFD1 |
//! | `jpeg-chroma-subsample` | SOF sampling factors |
//! | `jpeg-multiscan` | progressive SOF |
//!
//! # Example
//!
//! ```ignore
//! use imgio::jpeg;
//! use imgio::LoadOptions;
//!
//! let image = jpeg::load("photo.jpg", &LoadOptions::new().with_shrink(4))?;
//! let bytes = jpeg::save_buffer(&image, &Default::default())?;
//! ```

use crate::client::{ClientHandle, StreamReader, WriteSeek};
use crate::detect::{self, Format};
use crate::exif;
use crate::hooks::{self, DecodeScope};
use crate::loader::{BufferOrigin, FileOrigin, LoadOptions, Loader, StreamOrigin};
use crate::metadata::keys;
use crate::orient;
use crate::stream::Stream;
use crate::traits::{Codec, SaveOptions, Subsample};
use crate::{
    AttrValue, ImageData, ImageInfo, Interpretation, IoError, IoResult, Metadata, PixelData,
    PixelFormat,
};
use byteorder::{ByteOrder, NativeEndian};
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Constants
// ============================================================================

/// Dispatch priority: a two-byte magic with very few false positives.
pub const PRIORITY: i32 = 50;

const MODULE: &str = "jpegload";
const SAVE_MODULE: &str = "vips2jpeg";

const TEM: u8 = 0x01;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const APP13: u8 = 0xED;

const JFIF_IDENT: &[u8] = b"JFIF\0";
const XMP_IDENT: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_IDENT: &[u8] = b"ICC_PROFILE\0";
const IPTC_IDENT: &[u8] = b"Photoshop 3.0\0";

type Input = BufReader<ClientHandle<StreamReader>>;

// ============================================================================
// Codec
// ============================================================================

/// JPEG codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl Codec for JpegCodec {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn format(&self) -> Format {
        Format::Jpeg
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".jpg", ".jpeg", ".jpe", ".jfif"]
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    fn probe_bytes(&self, prefix: &[u8]) -> bool {
        detect::is_jpeg(prefix)
    }

    fn read_header(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageInfo> {
        options.validate()?;
        let scope = DecodeScope::enter(options.fail);

        let markers = scan_markers(stream)?;
        let mut decoder = open_decoder(stream)?;
        let (width, height) = output_size(&mut decoder, options.shrink)?.size();
        let layout = Layout::of(pixel_format(&decoder)?);

        let mut metadata = Metadata::default();
        markers.attach(&mut metadata);
        let (width, height) = match options.autorotate {
            true => match orient::take_orientation(&mut metadata) {
                Some(orientation) => orient::oriented_size(width, height, orientation),
                None => (width, height),
            },
            false => (width, height),
        };

        scope.check()?;
        debug!(stream = stream.nickname(), width, height, shrink = options.shrink, "jpeg header");
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

        let markers = scan_markers(stream)?;
        let mut decoder = open_decoder(stream)?;
        stream.stop_retaining();
        let scaled = output_size(&mut decoder, options.shrink)?;
        let (width, height) = scaled.decoded;
        let pixels = decoder.decode().map_err(decode_error)?;
        let layout = Layout::of(pixel_format(&decoder)?);

        let data = match layout.format {
            PixelFormat::U16 => PixelData::U16(
                pixels
                    .chunks_exact(2)
                    .map(NativeEndian::read_u16)
                    .collect(),
            ),
            _ => PixelData::U8(pixels),
        };
        let mut image = ImageData::from_data(width, height, layout.channels, data)?
            .with_interpretation(layout.interpretation);
        markers.attach(&mut image.metadata);
        if scaled.residual > 1 {
            image = orient::shrink(&image, scaled.residual);
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
            "jpeg load"
        );
        Ok(image)
    }

    fn write(&self, image: &ImageData, out: &mut dyn WriteSeek, options: &SaveOptions) -> IoResult<()> {
        use jpeg_encoder::{ColorType, Density, Encoder, SamplingFactor};

        let too_large = || IoError::EncodeError(format!(
            "{}x{} exceeds the JPEG limit of 65535",
            image.width, image.height
        ));
        let width = u16::try_from(image.width).map_err(|_| too_large())?;
        let height = u16::try_from(image.height).map_err(|_| too_large())?;

        let samples = image.data.to_u8();
        let (color, samples) = match (image.channels, image.interpretation) {
            (1, _) => (ColorType::Luma, samples),
            (2, _) => {
                hooks::warning(SAVE_MODULE, "alpha dropped from gray+alpha image");
                (ColorType::Luma, samples.chunks_exact(2).map(|px| px[0]).collect())
            }
            (3, _) => (ColorType::Rgb, samples),
            (4, Interpretation::Cmyk) => (ColorType::Cmyk, samples),
            (4, _) => {
                hooks::warning(SAVE_MODULE, "alpha dropped from RGBA image");
                (ColorType::Rgba, samples)
            }
            (n, _) => {
                return Err(IoError::EncodeError(format!(
                    "cannot save a {n}-channel image as JPEG"
                )));
            }
        };

        let mut encoder = Encoder::new(&mut *out, options.quality.clamp(1, 100));
        encoder.set_progressive(options.progressive);
        match options.subsample {
            Subsample::Auto => {}
            Subsample::On => encoder.set_sampling_factor(SamplingFactor::R_4_2_0),
            Subsample::Off => encoder.set_sampling_factor(SamplingFactor::R_4_4_4),
        }
        if let Some(dpi) = image.metadata.dpi {
            let dpi = dpi.round().clamp(1.0, 65535.0) as u16;
            encoder.set_density(Density::Inch { x: dpi, y: dpi });
        }

        if !options.strip {
            let meta = &image.metadata;
            match (meta.exif(), meta.orientation()) {
                (Some(block), orientation) => {
                    let mut block = if block.starts_with(exif::EXIF_IDENT) {
                        block.to_vec()
                    } else {
                        [&exif::EXIF_IDENT[..], block].concat()
                    };
                    if let Some(orientation) = orientation {
                        exif::set_orientation(&mut block, orientation);
                    }
                    encoder.add_app_segment(1, &block).map_err(encode_error)?;
                }
                (None, Some(orientation)) => {
                    encoder
                        .add_app_segment(1, &exif::orientation_block(orientation))
                        .map_err(encode_error)?;
                }
                (None, None) => {}
            }
            if let Some(xmp) = meta.attrs.get(keys::XMP).and_then(AttrValue::as_bytes) {
                encoder
                    .add_app_segment(1, &[XMP_IDENT, xmp].concat())
                    .map_err(encode_error)?;
            }
            if let Some(iptc) = meta.attrs.get(keys::IPTC).and_then(AttrValue::as_bytes) {
                encoder.add_app_segment(13, iptc).map_err(encode_error)?;
            }
            if let Some(icc) = meta.icc_profile() {
                encoder.add_icc_profile(icc).map_err(encode_error)?;
            }
        }

        trace!(width, height, quality = options.quality, "jpeg encode");
        encoder
            .encode(&samples, width, height, color)
            .map_err(encode_error)
    }
}

// ============================================================================
// Decoder plumbing
// ============================================================================

struct Layout {
    channels: u32,
    format: PixelFormat,
    interpretation: Interpretation,
}

impl Layout {
    fn of(format: jpeg_decoder::PixelFormat) -> Self {
        use jpeg_decoder::PixelFormat as Jpf;
        let (channels, format, interpretation) = match format {
            Jpf::L8 => (1, PixelFormat::U8, Interpretation::BW),
            Jpf::L16 => (1, PixelFormat::U16, Interpretation::BW),
            Jpf::RGB24 => (3, PixelFormat::U8, Interpretation::Srgb),
            Jpf::CMYK32 => (4, PixelFormat::U8, Interpretation::Cmyk),
        };
        Self {
            channels,
            format,
            interpretation,
        }
    }
}

fn open_decoder(stream: &Stream) -> IoResult<jpeg_decoder::Decoder<Input>> {
    let reader = StreamReader::open(stream)?;
    Ok(jpeg_decoder::Decoder::new(BufReader::new(ClientHandle::new(
        reader,
    ))))
}

/// Decoder output geometry for one shrink request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scaled {
    /// Size the decoder produces.
    decoded: (u32, u32),
    /// Box shrink still to apply after decoding, 1 when DCT scaling was exact.
    residual: u32,
}

impl Scaled {
    /// Final size after the residual shrink.
    fn size(&self) -> (u32, u32) {
        orient::shrunk_size(self.decoded.0, self.decoded.1, self.residual)
    }
}

/// Reads the frame header and applies DCT scaling for `shrink`.
///
/// `Decoder::scale` stops at the first scale where either axis reaches the
/// request, so only the longer axis is requested. If the decoder still
/// cannot hit `ceil(dim / shrink)` on both axes, it decodes at full size and
/// the rest is left to a box shrink.
fn output_size(decoder: &mut jpeg_decoder::Decoder<Input>, shrink: u32) -> IoResult<Scaled> {
    decoder.read_info().map_err(decode_error)?;
    let info = decoder
        .info()
        .ok_or_else(|| IoError::Format("no frame header before first scan".into()))?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));
    if shrink <= 1 {
        return Ok(Scaled {
            decoded: (width, height),
            residual: 1,
        });
    }

    let target = orient::shrunk_size(width, height, shrink);
    let request = |(w, h): (u32, u32)| {
        let w = u16::try_from(w).unwrap_or(u16::MAX);
        let h = u16::try_from(h).unwrap_or(u16::MAX);
        if width >= height { (w, u16::MAX) } else { (u16::MAX, h) }
    };
    let (req_w, req_h) = request(target);
    let (w, h) = decoder.scale(req_w, req_h).map_err(decode_error)?;
    if (u32::from(w), u32::from(h)) == target {
        return Ok(Scaled {
            decoded: target,
            residual: 1,
        });
    }

    trace!(width, height, shrink, got_w = w, got_h = h, "dct scale inexact, decoding full size");
    decoder
        .scale(info.width, info.height)
        .map_err(decode_error)?;
    Ok(Scaled {
        decoded: (width, height),
        residual: shrink,
    })
}

fn pixel_format(decoder: &jpeg_decoder::Decoder<Input>) -> IoResult<jpeg_decoder::PixelFormat> {
    decoder
        .info()
        .map(|info| info.pixel_format)
        .ok_or_else(|| IoError::Format("no frame header before first scan".into()))
}

fn decode_error(err: jpeg_decoder::Error) -> IoError {
    match err {
        jpeg_decoder::Error::Io(err) => IoError::from_io(err),
        jpeg_decoder::Error::Format(msg) => IoError::Format(msg),
        other => IoError::DecodeError(other.to_string()),
    }
}

fn encode_error(err: jpeg_encoder::EncodingError) -> IoError {
    match err {
        jpeg_encoder::EncodingError::IoError(err) => IoError::from_io(err),
        other => IoError::EncodeError(other.to_string()),
    }
}

// ============================================================================
// Marker scan
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Sampling {
    h: u8,
    v: u8,
}

#[derive(Debug, Default)]
struct Markers {
    exif: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
    iptc: Option<Vec<u8>>,
    icc_chunks: Vec<(u8, u8, Vec<u8>)>,
    /// JFIF units (0 aspect, 1 inch, 2 cm) and densities.
    density: Option<(u8, u16, u16)>,
    components: Vec<Sampling>,
    progressive: bool,
}

/// Walks marker segments from SOI to the first SOS.
fn scan_markers(stream: &Stream) -> IoResult<Markers> {
    let mut input = BufReader::new(ClientHandle::new(StreamReader::open(stream)?));
    let mut soi = [0u8; 2];
    read_exact(&mut input, &mut soi)?;
    if !detect::is_jpeg(&soi) {
        return Err(IoError::Format("not a JPEG file: missing SOI marker".into()));
    }

    let mut markers = Markers::default();
    loop {
        let marker = next_marker(&mut input)?;
        match marker {
            SOS | EOI => break,
            SOI | TEM | 0xD0..=0xD7 => continue,
            _ => {}
        }
        let mut len = [0u8; 2];
        read_exact(&mut input, &mut len)?;
        let len = usize::from(u16::from_be_bytes(len));
        if len < 2 {
            return Err(IoError::Format(format!(
                "marker 0x{marker:02x} has invalid length {len}"
            )));
        }
        let mut payload = vec![0u8; len - 2];
        read_exact(&mut input, &mut payload)?;
        markers.record(marker, payload);
    }
    Ok(markers)
}

/// Next marker code, skipping fill bytes. Anything else in between is
/// reported as extraneous data.
fn next_marker<R: Read>(input: &mut R) -> IoResult<u8> {
    let mut extraneous = 0usize;
    let marker = loop {
        let mut byte = read_u8(input)?;
        if byte != 0xFF {
            extraneous += 1;
            continue;
        }
        while byte == 0xFF {
            byte = read_u8(input)?;
        }
        if byte == 0 {
            extraneous += 2;
            continue;
        }
        break byte;
    };
    if extraneous > 0 {
        hooks::warning(
            MODULE,
            &format!("corrupt JPEG data: {extraneous} extraneous bytes before marker 0x{marker:02x}"),
        );
    }
    Ok(marker)
}

fn read_u8<R: Read>(input: &mut R) -> IoResult<u8> {
    let mut byte = [0u8; 1];
    read_exact(input, &mut byte)?;
    Ok(byte[0])
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> IoResult<()> {
    input.read_exact(buf).map_err(IoError::from_io)
}

impl Markers {
    fn record(&mut self, marker: u8, payload: Vec<u8>) {
        match marker {
            APP0 if payload.starts_with(JFIF_IDENT) && payload.len() >= 12 => {
                let x = u16::from_be_bytes([payload[8], payload[9]]);
                let y = u16::from_be_bytes([payload[10], payload[11]]);
                self.density = Some((payload[7], x, y));
            }
            APP1 if payload.starts_with(exif::EXIF_IDENT) => {
                if self.exif.is_none() {
                    self.exif = Some(payload);
                }
            }
            APP1 if payload.starts_with(XMP_IDENT) => {
                self.xmp = Some(payload[XMP_IDENT.len()..].to_vec());
            }
            APP2 if payload.starts_with(ICC_IDENT) && payload.len() > ICC_IDENT.len() + 2 => {
                let seq = payload[ICC_IDENT.len()];
                let count = payload[ICC_IDENT.len() + 1];
                self.icc_chunks
                    .push((seq, count, payload[ICC_IDENT.len() + 2..].to_vec()));
            }
            APP13 if payload.starts_with(IPTC_IDENT) => {
                self.iptc = Some(payload);
            }
            // SOFn, excluding DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                self.progressive = matches!(marker, 0xC2 | 0xC6 | 0xCA | 0xCE);
                let count = payload.get(5).copied().unwrap_or(0) as usize;
                self.components = payload
                    .get(6..6 + count * 3)
                    .map(|table| {
                        table
                            .chunks_exact(3)
                            .map(|c| Sampling {
                                h: c[1] >> 4,
                                v: c[1] & 0x0F,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
            }
            _ => {}
        }
    }

    /// Reassembles the ICC profile; warns and drops incomplete sequences.
    fn icc_profile(&self) -> Option<Vec<u8>> {
        if self.icc_chunks.is_empty() {
            return None;
        }
        let mut chunks: Vec<_> = self.icc_chunks.iter().collect();
        chunks.sort_by_key(|(seq, _, _)| *seq);
        let count = chunks[0].1;
        let complete = chunks.len() == usize::from(count)
            && chunks
                .iter()
                .enumerate()
                .all(|(i, (seq, n, _))| usize::from(*seq) == i + 1 && *n == count);
        if !complete {
            hooks::warning(MODULE, "incomplete ICC profile sequence, profile ignored");
            return None;
        }
        Some(chunks.iter().flat_map(|(_, _, data)| data.iter().copied()).collect())
    }

    fn chroma_subsample(&self) -> Option<String> {
        match self.components.as_slice() {
            [] => None,
            [_] => Some("4:0:0".to_string()),
            [luma, chroma, rest @ ..] => {
                if luma.h == 0 || luma.v == 0 {
                    return None;
                }
                let a = 4 * chroma.h / luma.h;
                let b = if chroma.v == luma.v { a } else { 0 };
                let mut notation = format!("4:{a}:{b}");
                if rest.len() == 2 {
                    notation.push_str(":4");
                }
                Some(notation)
            }
        }
    }

    /// Copies everything found into `meta`.
    fn attach(&self, meta: &mut Metadata) {
        if let Some(icc) = self.icc_profile() {
            meta.set_blob(keys::ICC_PROFILE, icc);
        }
        if let Some(block) = &self.exif {
            meta.set_blob(keys::EXIF, block.clone());
            match exif::parse(block) {
                Some(summary) => {
                    if let Some(orientation) = summary.orientation {
                        meta.set_orientation(orientation);
                    }
                    if let Some(range) = summary.thumbnail {
                        meta.set_blob(keys::JPEG_THUMBNAIL, block[range].to_vec());
                    }
                }
                None => hooks::warning(MODULE, "unable to parse EXIF block"),
            }
        }
        if let Some(xmp) = &self.xmp {
            meta.set_blob(keys::XMP, xmp.clone());
        }
        if let Some(iptc) = &self.iptc {
            meta.set_blob(keys::IPTC, iptc.clone());
        }
        match self.density {
            Some((1, x, y)) if x > 0 && y > 0 => {
                meta.set_resolution(f64::from(x) / 25.4, f64::from(y) / 25.4, "in");
            }
            Some((2, x, y)) if x > 0 && y > 0 => {
                meta.set_resolution(f64::from(x) / 10.0, f64::from(y) / 10.0, "cm");
            }
            _ => {}
        }
        if let Some(notation) = self.chroma_subsample() {
            meta.attrs
                .set(keys::JPEG_CHROMA_SUBSAMPLE, AttrValue::Str(notation));
        }
        meta.attrs
            .set(keys::JPEG_MULTISCAN, AttrValue::Int(i32::from(self.progressive)));
    }
}

// ============================================================================
// Convenience API
// ============================================================================

fn codec() -> Arc<dyn Codec> {
    Arc::new(JpegCodec)
}

/// Loads a JPEG file.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), FileOrigin::new(path));
    loader.configure(*options)?;
    loader.into_image()
}

/// Loads JPEG data from a shared buffer.
pub fn load_buffer(data: impl Into<Arc<[u8]>>, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), BufferOrigin::new(data));
    loader.configure(*options)?;
    loader.into_image()
}

/// Loads JPEG data from a stream.
pub fn load_stream(stream: &Stream, options: &LoadOptions) -> IoResult<ImageData> {
    let mut loader = Loader::new(codec(), StreamOrigin::new(stream));
    loader.configure(*options)?;
    loader.into_image()
}

/// Reads the header of a JPEG file.
pub fn header(path: impl AsRef<Path>, options: &LoadOptions) -> IoResult<ImageInfo> {
    let mut loader = Loader::new(codec(), FileOrigin::new(path));
    loader.configure(*options)?;
    loader.header().cloned()
}

/// Whether `path` holds JPEG data. Opens the file only for the probe.
pub fn is_a_file(path: impl AsRef<Path>) -> bool {
    Stream::open_file(path)
        .and_then(|stream| JpegCodec.probe_stream(&stream))
        .unwrap_or(false)
}

/// Whether `data` starts like a JPEG.
pub fn is_a_buffer(data: &[u8]) -> bool {
    JpegCodec.probe_bytes(data)
}

/// Whether `stream` holds JPEG data, without consuming it.
pub fn is_a_stream(stream: &Stream) -> IoResult<bool> {
    JpegCodec.probe_stream(stream)
}

/// Encodes into memory.
pub fn save_buffer(image: &ImageData, options: &SaveOptions) -> IoResult<Vec<u8>> {
    crate::client::encode_to_vec(|out| JpegCodec.write(image, out, options))
}

/// Encodes to a file.
pub fn save(path: impl AsRef<Path>, image: &ImageData, options: &SaveOptions) -> IoResult<()> {
    std::fs::write(path, save_buffer(image, options)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> ImageData {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 8) as u8, (y * 8) as u8, 128]);
            }
        }
        ImageData::from_u8(width, height, 3, data).unwrap()
    }

    #[test]
    fn probe() {
        assert!(JpegCodec.probe_bytes(&[0xFF, 0xD8]));
        assert!(!JpegCodec.probe_bytes(&[0xFF]));
        assert!(!JpegCodec.probe_bytes(b"II*\0"));
        assert_eq!(JpegCodec.priority(), PRIORITY);
    }

    #[test]
    fn roundtrip_through_buffer() {
        let bytes = save_buffer(&gradient(20, 10), &SaveOptions::default()).unwrap();
        assert!(is_a_buffer(&bytes));
        let image = load_buffer(bytes, &LoadOptions::default()).unwrap();
        assert_eq!((image.width, image.height, image.channels), (20, 10, 3));
        assert_eq!(image.interpretation, Interpretation::Srgb);
        assert_eq!(
            image.metadata.attrs.get(keys::JPEG_CHROMA_SUBSAMPLE).and_then(AttrValue::as_str),
            Some("4:2:0")
        );
        assert_eq!(
            image.metadata.attrs.get(keys::JPEG_MULTISCAN).and_then(AttrValue::as_i32),
            Some(0)
        );
    }

    #[test]
    fn grayscale_and_subsample_off() {
        let gray = ImageData::from_u8(8, 8, 1, vec![200; 64]).unwrap();
        let bytes = save_buffer(&gray, &SaveOptions::default()).unwrap();
        let info = JpegCodec
            .read_header(&Stream::from_memory(bytes), &LoadOptions::default())
            .unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(
            info.metadata.attrs.get(keys::JPEG_CHROMA_SUBSAMPLE).and_then(AttrValue::as_str),
            Some("4:0:0")
        );

        let opts = SaveOptions::default().with_subsample(Subsample::Off).with_progressive(true);
        let bytes = save_buffer(&gradient(16, 16), &opts).unwrap();
        let info = JpegCodec
            .read_header(&Stream::from_memory(bytes), &LoadOptions::default())
            .unwrap();
        let attrs = &info.metadata.attrs;
        assert_eq!(attrs.get(keys::JPEG_CHROMA_SUBSAMPLE).and_then(AttrValue::as_str), Some("4:4:4"));
        assert_eq!(attrs.get(keys::JPEG_MULTISCAN).and_then(AttrValue::as_i32), Some(1));
    }

    #[test]
    fn icc_and_xmp_survive() {
        let mut image = gradient(8, 8);
        image.metadata.set_blob(keys::ICC_PROFILE, vec![7u8; 300]);
        image.metadata.set_blob(keys::XMP, b"<x:xmpmeta/>".to_vec());
        let bytes = save_buffer(&image, &SaveOptions::default()).unwrap();
        let back = load_buffer(bytes, &LoadOptions::default()).unwrap();
        assert_eq!(back.metadata.icc_profile(), Some(&[7u8; 300][..]));
        assert_eq!(
            back.metadata.attrs.get(keys::XMP).and_then(AttrValue::as_bytes),
            Some(&b"<x:xmpmeta/>"[..])
        );

        let stripped = save_buffer(&image, &SaveOptions::default().with_strip(true)).unwrap();
        let back = load_buffer(stripped, &LoadOptions::default()).unwrap();
        assert!(back.metadata.icc_profile().is_none());
    }

    #[test]
    fn incomplete_icc_sequence_is_dropped() {
        let mut markers = Markers::default();
        let mut chunk = ICC_IDENT.to_vec();
        chunk.extend_from_slice(&[2, 2, 0xAB]);
        markers.record(APP2, chunk);
        assert!(markers.icc_profile().is_none());
    }

    #[test]
    fn chroma_notation() {
        let mut markers = Markers::default();
        let s = |h, v| Sampling { h, v };
        markers.components = vec![s(2, 1), s(1, 1), s(1, 1)];
        assert_eq!(markers.chroma_subsample().as_deref(), Some("4:2:2"));
        markers.components = vec![s(1, 1); 4];
        assert_eq!(markers.chroma_subsample().as_deref(), Some("4:4:4:4"));
        markers.components = vec![s(4, 1), s(1, 1), s(1, 1)];
        assert_eq!(markers.chroma_subsample().as_deref(), Some("4:1:1"));
    }

    #[test]
    fn dropped_alpha_is_reported() {
        let rgba = ImageData::from_u8(2, 2, 4, vec![100; 16]).unwrap();
        let gray_alpha = ImageData::from_u8(2, 2, 2, vec![100; 8]).unwrap();
        let rgb = gradient(2, 2);

        let scope = DecodeScope::enter(false);
        save_buffer(&rgb, &SaveOptions::default()).unwrap();
        assert_eq!(scope.warnings(), 0);
        save_buffer(&rgba, &SaveOptions::default()).unwrap();
        assert_eq!(scope.warnings(), 1);
        let back = load_buffer(save_buffer(&gray_alpha, &SaveOptions::default()).unwrap(), &LoadOptions::default())
            .unwrap();
        assert_eq!(scope.warnings(), 2);
        assert_eq!(back.channels, 1);
    }

    #[test]
    fn not_a_jpeg() {
        let err = JpegCodec
            .read_header(&Stream::from_memory(b"II*\0rest".to_vec()), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, IoError::Format(_)));
    }
}
