//! Typed attribute storage for decoded image metadata.
//!
//! Embedded blocks (ICC, EXIF, XMP, IPTC, thumbnails) are stored as opaque
//! [`AttrValue::Bytes`]. The well-known key names live in [`keys`].

use std::collections::BTreeMap;

/// Well-known attribute names.
pub mod keys {
    /// Raw ICC profile.
    pub const ICC_PROFILE: &str = "icc-profile-data";
    /// Raw EXIF APP1 payload, `Exif\0\0` identifier included.
    pub const EXIF: &str = "exif-data";
    /// Raw XMP packet.
    pub const XMP: &str = "xmp-data";
    /// Raw IPTC / Photoshop resource block.
    pub const IPTC: &str = "iptc-data";
    /// EXIF orientation, 1..=8.
    pub const ORIENTATION: &str = "orientation";
    /// Embedded EXIF thumbnail (a complete JPEG).
    pub const JPEG_THUMBNAIL: &str = "jpeg-thumbnail-data";
    /// Chroma subsampling descriptor, e.g. "4:2:0".
    pub const JPEG_CHROMA_SUBSAMPLE: &str = "jpeg-chroma-subsample";
    /// Set when the frame is progressive.
    pub const JPEG_MULTISCAN: &str = "jpeg-multiscan";
    /// Horizontal resolution in pixels per millimetre.
    pub const XRES: &str = "xres";
    /// Vertical resolution in pixels per millimetre.
    pub const YRES: &str = "yres";
    /// Resolution unit the file declared ("in" or "cm").
    pub const RESOLUTION_UNIT: &str = "resolution-unit";
}

/// Typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Boolean value.
    Bool(bool),
    /// UTF-8 string value.
    Str(String),
    /// Signed 32-bit integer.
    Int(i32),
    /// 64-bit float.
    Double(f64),
    /// Raw byte blob.
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Returns string slice if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer if this is an Int value.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float if this is a Double value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the flag if this is a Bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the blob if this is a Bytes value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttrValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Short human-readable rendering; blobs are summarised by length.
    pub fn summary(&self) -> String {
        match self {
            AttrValue::Bool(v) => v.to_string(),
            AttrValue::Str(v) => v.clone(),
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Double(v) => format!("{v:.4}"),
            AttrValue::Bytes(v) => format!("<{} bytes>", v.len()),
        }
    }
}

/// Attribute container: key -> typed value, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    map: BTreeMap<String, AttrValue>,
}

impl Attrs {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an attribute.
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.map.insert(key.into(), value);
    }

    /// Returns a reference to a value by key.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    /// Removes a value, returning it.
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.remove(key)
    }

    /// Returns true if the key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Iterates over key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Image metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// DPI if the file declared a resolution.
    pub dpi: Option<f32>,
    /// Typed attributes (format-specific).
    pub attrs: Attrs,
}

impl Metadata {
    /// EXIF orientation if present.
    pub fn orientation(&self) -> Option<u16> {
        self.attrs
            .get(keys::ORIENTATION)
            .and_then(AttrValue::as_i32)
            .and_then(|v| u16::try_from(v).ok())
    }

    /// Records the EXIF orientation.
    pub fn set_orientation(&mut self, orientation: u16) {
        self.attrs
            .set(keys::ORIENTATION, AttrValue::Int(i32::from(orientation)));
    }

    /// Raw ICC profile if present.
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.attrs.get(keys::ICC_PROFILE).and_then(AttrValue::as_bytes)
    }

    /// Raw EXIF block if present.
    pub fn exif(&self) -> Option<&[u8]> {
        self.attrs.get(keys::EXIF).and_then(AttrValue::as_bytes)
    }

    /// Stores an opaque blob, ignoring empty ones.
    pub fn set_blob(&mut self, key: &str, data: Vec<u8>) {
        if !data.is_empty() {
            self.attrs.set(key, AttrValue::Bytes(data));
        }
    }

    /// Records resolution as pixels per millimetre plus the declared unit.
    pub fn set_resolution(&mut self, xres: f64, yres: f64, unit: &str) {
        self.attrs.set(keys::XRES, AttrValue::Double(xres));
        self.attrs.set(keys::YRES, AttrValue::Double(yres));
        self.attrs
            .set(keys::RESOLUTION_UNIT, AttrValue::Str(unit.to_string()));
        self.dpi = Some((xres * 25.4) as f32);
    }
}
