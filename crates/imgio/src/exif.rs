//! Minimal EXIF access: orientation and the IFD1 thumbnail.
//!
//! The rest of the block is treated as opaque. Blocks may start either at
//! the `Exif\0\0` APP1 identifier or directly at the TIFF header.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::ops::Range;

// ============================================================================
// Constants
// ============================================================================

/// APP1 identifier preceding the TIFF header.
pub const EXIF_IDENT: &[u8; 6] = b"Exif\0\0";

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
const TAG_THUMBNAIL_LENGTH: u16 = 0x0202;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

const ENTRY_SIZE: usize = 12;

/// Fields read from an EXIF block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifSummary {
    /// IFD0 orientation, if present and in 1..=8.
    pub orientation: Option<u16>,
    /// Byte range of the embedded JPEG thumbnail within the block.
    pub thumbnail: Option<Range<usize>>,
}

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, buf: &[u8], at: usize) -> Option<u16> {
        let bytes = buf.get(at..at + 2)?;
        Some(match self {
            Endian::Little => LittleEndian::read_u16(bytes),
            Endian::Big => BigEndian::read_u16(bytes),
        })
    }

    fn u32(self, buf: &[u8], at: usize) -> Option<u32> {
        let bytes = buf.get(at..at + 4)?;
        Some(match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        })
    }

    fn put_u16(self, buf: &mut [u8], value: u16) {
        match self {
            Endian::Little => LittleEndian::write_u16(buf, value),
            Endian::Big => BigEndian::write_u16(buf, value),
        }
    }
}

/// TIFF structure inside an EXIF block.
struct Tiff<'a> {
    data: &'a [u8],
    base: usize,
    endian: Endian,
}

struct Entry {
    tag: u16,
    kind: u16,
    /// Absolute offset of the 4-byte value field.
    value_at: usize,
}

impl<'a> Tiff<'a> {
    fn parse(block: &'a [u8]) -> Option<Self> {
        let base = if block.starts_with(EXIF_IDENT) {
            EXIF_IDENT.len()
        } else {
            0
        };
        let endian = match block.get(base..base + 2)? {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return None,
        };
        if endian.u16(block, base + 2)? != 42 {
            return None;
        }
        Some(Self {
            data: block,
            base,
            endian,
        })
    }

    fn first_ifd(&self) -> Option<usize> {
        self.ifd_at(self.endian.u32(self.data, self.base + 4)?)
    }

    fn ifd_at(&self, offset: u32) -> Option<usize> {
        if offset == 0 {
            return None;
        }
        let at = self.base.checked_add(offset as usize)?;
        (at + 2 <= self.data.len()).then_some(at)
    }

    fn entries(&self, ifd: usize) -> impl Iterator<Item = Entry> + '_ {
        let count = self.endian.u16(self.data, ifd).unwrap_or(0) as usize;
        (0..count).map_while(move |i| {
            let at = ifd + 2 + i * ENTRY_SIZE;
            Some(Entry {
                tag: self.endian.u16(self.data, at)?,
                kind: self.endian.u16(self.data, at + 2)?,
                value_at: at + 8,
            })
            .filter(|_| at + ENTRY_SIZE <= self.data.len())
        })
    }

    fn next_ifd(&self, ifd: usize) -> Option<usize> {
        let count = self.endian.u16(self.data, ifd)? as usize;
        let link = ifd + 2 + count * ENTRY_SIZE;
        self.ifd_at(self.endian.u32(self.data, link)?)
    }

    fn scalar(&self, entry: &Entry) -> Option<u32> {
        match entry.kind {
            TYPE_SHORT => self.endian.u16(self.data, entry.value_at).map(u32::from),
            TYPE_LONG => self.endian.u32(self.data, entry.value_at),
            _ => None,
        }
    }
}

/// Reads orientation and thumbnail location. `None` if the block is not
/// a parseable TIFF structure.
pub fn parse(block: &[u8]) -> Option<ExifSummary> {
    let tiff = Tiff::parse(block)?;
    let mut summary = ExifSummary::default();
    let Some(ifd0) = tiff.first_ifd() else {
        return Some(summary);
    };

    summary.orientation = tiff
        .entries(ifd0)
        .find(|e| e.tag == TAG_ORIENTATION)
        .and_then(|e| tiff.scalar(&e))
        .and_then(|v| u16::try_from(v).ok())
        .filter(|v| (1..=8).contains(v));

    if let Some(ifd1) = tiff.next_ifd(ifd0) {
        let mut offset = None;
        let mut length = None;
        for entry in tiff.entries(ifd1) {
            match entry.tag {
                TAG_THUMBNAIL_OFFSET => offset = tiff.scalar(&entry),
                TAG_THUMBNAIL_LENGTH => length = tiff.scalar(&entry),
                _ => {}
            }
        }
        if let (Some(offset), Some(length)) = (offset, length) {
            let start = tiff.base + offset as usize;
            let end = start + length as usize;
            if length > 0 && end <= block.len() {
                summary.thumbnail = Some(start..end);
            }
        }
    }
    Some(summary)
}

/// Orientation tag value, if present and valid.
pub fn orientation(block: &[u8]) -> Option<u16> {
    parse(block)?.orientation
}

/// Rewrites the IFD0 orientation in place. Returns false if the block has
/// no orientation entry to patch.
pub fn set_orientation(block: &mut [u8], value: u16) -> bool {
    let (at, endian) = {
        let Some(tiff) = Tiff::parse(block) else {
            return false;
        };
        let Some(ifd0) = tiff.first_ifd() else {
            return false;
        };
        let found = tiff
            .entries(ifd0)
            .find(|e| e.tag == TAG_ORIENTATION && e.kind == TYPE_SHORT);
        match found {
            Some(entry) => (entry.value_at, tiff.endian),
            None => return false,
        }
    };
    endian.put_u16(&mut block[at..at + 2], value);
    true
}

/// Builds a minimal APP1 payload carrying only an orientation tag.
pub fn orientation_block(orientation: u16) -> Vec<u8> {
    let mut block = Vec::with_capacity(EXIF_IDENT.len() + 26);
    block.extend_from_slice(EXIF_IDENT);
    block.extend_from_slice(b"II");
    push_u16(&mut block, 42);
    push_u32(&mut block, 8);
    // IFD0: one entry, no next IFD.
    push_u16(&mut block, 1);
    push_u16(&mut block, TAG_ORIENTATION);
    push_u16(&mut block, TYPE_SHORT);
    push_u32(&mut block, 1);
    push_u16(&mut block, orientation);
    push_u16(&mut block, 0);
    push_u32(&mut block, 0);
    block
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    let mut bytes = [0u8; 2];
    LittleEndian::write_u16(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}
