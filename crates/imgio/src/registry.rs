//! Codec registry for format detection and dispatch.
//!
//! The registry keeps codecs ordered by descending [`Codec::priority`];
//! codecs with equal priority keep their registration order, so detection
//! is deterministic when more than one codec claims an input.
//!
//! # Architecture
//!
//! [`Registry::global()`] is built once with the codecs enabled by cargo
//! features and installs the default diagnostic hooks. Applications with
//! their own codecs build a [`Registry`] by hand.
//!
//! # Example
//!
//! ```ignore
//! use imgio::registry::Registry;
//!
//! let registry = Registry::global();
//! let codec = registry.detect_file("photo.jpg")?;
//! println!("{} (priority {})", codec.name(), codec.priority());
//! ```

use crate::client::encode_to_vec;
use crate::detect::{Format, MAGIC_LEN};
use crate::hooks;
use crate::stream::Stream;
use crate::traits::{Codec, SaveOptions};
use crate::{ImageData, IoError, IoResult};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Ordered set of codecs.
#[derive(Default, Clone)]
pub struct Registry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every codec compiled in.
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "jpeg")]
        registry.register(Arc::new(crate::jpeg::JpegCodec));
        #[cfg(feature = "tiff")]
        registry.register(Arc::new(crate::tiff::TiffCodec));
        registry
    }

    /// Process-wide registry of built-in codecs.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            hooks::init();
            Registry::with_builtin()
        })
    }

    /// Adds a codec after every codec of greater or equal priority.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        let at = self
            .codecs
            .iter()
            .position(|c| c.priority() < codec.priority())
            .unwrap_or(self.codecs.len());
        debug!(codec = codec.name(), priority = codec.priority(), slot = at, "register codec");
        self.codecs.insert(at, codec);
    }

    /// Codecs in dispatch order.
    pub fn codecs(&self) -> impl Iterator<Item = &Arc<dyn Codec>> {
        self.codecs.iter()
    }

    /// Codec by name.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.iter().find(|c| c.name() == name).cloned()
    }

    /// First codec handling `format`.
    pub fn by_format(&self, format: Format) -> Option<Arc<dyn Codec>> {
        self.codecs.iter().find(|c| c.format() == format).cloned()
    }

    /// First codec claiming the path's suffix (case-insensitive).
    pub fn by_suffix(&self, path: impl AsRef<Path>) -> Option<Arc<dyn Codec>> {
        let suffix = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))?;
        self.codecs
            .iter()
            .find(|c| c.suffixes().contains(&suffix.as_str()))
            .cloned()
    }

    /// Whether some codec claims the suffix.
    pub fn supports_suffix(&self, path: impl AsRef<Path>) -> bool {
        self.by_suffix(path).is_some()
    }

    /// Highest-priority codec whose magic check accepts `prefix`.
    pub fn detect_bytes(&self, prefix: &[u8]) -> Option<Arc<dyn Codec>> {
        self.codecs.iter().find(|c| c.probe_bytes(prefix)).cloned()
    }

    /// Highest-priority codec claiming `stream`. The stream position is
    /// left unchanged.
    pub fn detect_stream(&self, stream: &Stream) -> IoResult<Option<Arc<dyn Codec>>> {
        for codec in &self.codecs {
            if codec.probe_stream(stream)? {
                trace!(stream = stream.nickname(), codec = codec.name(), "detected");
                return Ok(Some(Arc::clone(codec)));
            }
        }
        Ok(None)
    }

    /// Opens `path` just long enough to probe it.
    pub fn detect_file(&self, path: impl AsRef<Path>) -> IoResult<Arc<dyn Codec>> {
        let path = path.as_ref();
        let stream = Stream::open_file(path)?;
        self.detect_stream(&stream)?.ok_or_else(|| {
            IoError::UnsupportedFormat(format!("{} is not a known image format", path.display()))
        })
    }

    /// Probes an in-memory buffer.
    pub fn detect_buffer(&self, data: &[u8]) -> IoResult<Arc<dyn Codec>> {
        let prefix = &data[..data.len().min(MAGIC_LEN)];
        self.detect_bytes(prefix)
            .ok_or_else(|| IoError::UnsupportedFormat("buffer is not a known image format".into()))
    }

    /// Encodes through the memory write adapter.
    pub fn save_buffer(
        &self,
        image: &ImageData,
        format: Format,
        options: &SaveOptions,
    ) -> IoResult<Vec<u8>> {
        let codec = self
            .by_format(format)
            .ok_or_else(|| IoError::UnsupportedFormat(format!("no saver for {format:?}")))?;
        encode_to_vec(|out| codec.write(image, out, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WriteSeek;
    use crate::loader::LoadOptions;
    use crate::ImageInfo;

    struct Fake {
        name: &'static str,
        priority: i32,
        magic: u8,
    }

    impl Codec for Fake {
        fn name(&self) -> &'static str {
            self.name
        }
        fn format(&self) -> Format {
            Format::Unknown
        }
        fn suffixes(&self) -> &'static [&'static str] {
            &[".fake"]
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn probe_bytes(&self, prefix: &[u8]) -> bool {
            prefix.first() == Some(&self.magic)
        }
        fn read_header(&self, _: &Stream, _: &LoadOptions) -> IoResult<ImageInfo> {
            Err(IoError::UnsupportedOperation("fake".into()))
        }
        fn read_image(&self, _: &Stream, _: &LoadOptions) -> IoResult<ImageData> {
            Err(IoError::UnsupportedOperation("fake".into()))
        }
        fn write(&self, _: &ImageData, _: &mut dyn WriteSeek, _: &SaveOptions) -> IoResult<()> {
            Err(IoError::UnsupportedOperation("fake".into()))
        }
    }

    fn fake(name: &'static str, priority: i32, magic: u8) -> Arc<dyn Codec> {
        Arc::new(Fake { name, priority, magic })
    }

    #[test]
    fn highest_priority_wins() {
        let mut registry = Registry::new();
        registry.register(fake("generic", -10, b'X'));
        registry.register(fake("specific", 50, b'X'));
        assert_eq!(registry.detect_bytes(b"X").unwrap().name(), "specific");
    }

    #[test]
    fn ties_keep_registration_order() {
        let mut registry = Registry::new();
        registry.register(fake("first", 10, b'X'));
        registry.register(fake("second", 10, b'X'));
        registry.register(fake("low", 0, b'X'));
        let names: Vec<_> = registry.codecs().map(|c| c.name()).collect();
        assert_eq!(names, ["first", "second", "low"]);
        assert_eq!(registry.detect_bytes(b"X").unwrap().name(), "first");
    }

    #[test]
    fn stream_detection_on_pipe_keeps_bytes() {
        let mut registry = Registry::new();
        registry.register(fake("y", 0, b'Y'));
        let mut data = std::io::Cursor::new(b"Ydata".to_vec());
        let stream = Stream::from_user(
            crate::stream::UserStream::new()
                .on_read(move |buf: &mut [u8]| std::io::Read::read(&mut data, buf)),
        );
        assert_eq!(registry.detect_stream(&stream).unwrap().unwrap().name(), "y");
        let mut all = [0u8; 5];
        assert_eq!(stream.read_full(&mut all).unwrap(), 5);
        assert_eq!(&all, b"Ydata");
    }

    #[test]
    fn unknown_buffer_is_unsupported() {
        let registry = Registry::new();
        assert!(matches!(
            registry.detect_buffer(b"nothing"),
            Err(IoError::UnsupportedFormat(_))
        ));
        assert!(registry.find("jpegload").is_none());
    }

    #[test]
    fn suffix_lookup_is_case_insensitive() {
        let mut registry = Registry::new();
        registry.register(fake("f", 0, 0));
        assert!(registry.supports_suffix("a.FAKE"));
        assert!(!registry.supports_suffix("a.fak"));
        assert!(!registry.supports_suffix("noext"));
    }
}
