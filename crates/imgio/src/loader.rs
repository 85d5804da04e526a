//! Two-phase loader.
//!
//! A [`Loader`] binds one codec to one [`Origin`] and walks a fixed state
//! machine:
//!
//! ```text
//! Unconfigured --configure--> Configured --header--> HeaderLoaded --load--> Loaded
//!        \__________________________\______________________\______________> Failed
//! ```
//!
//! Options are validated before the origin is touched. The header phase
//! opens one stream and reads metadata only; the load phase opens (or, for
//! a stream origin, rewinds) again and decodes pixels. Any error moves the
//! loader to `Failed` and drops whatever the earlier phases produced.
//!
//! # Example
//!
//! ```ignore
//! use imgio::loader::{FileOrigin, LoadOptions, Loader};
//!
//! let mut loader = Loader::new(codec, FileOrigin::new("photo.jpg"));
//! loader.configure(LoadOptions::new().with_shrink(2))?;
//! let info = loader.header()?.clone();
//! let image = loader.into_image()?;
//! ```

use crate::stream::Stream;
use crate::traits::Codec;
use crate::{ImageData, ImageInfo, IoError, IoResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Shrink factors a loader accepts.
pub const SHRINK_FACTORS: [u32; 4] = [1, 2, 4, 8];

// ============================================================================
// Options
// ============================================================================

/// Load configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Shrink on load: 1, 2, 4 or 8.
    pub shrink: u32,
    /// Treat decoder warnings as errors.
    pub fail: bool,
    /// Apply the EXIF orientation and drop the tag.
    pub autorotate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            shrink: 1,
            fail: false,
            autorotate: false,
        }
    }
}

impl LoadOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shrink factor.
    pub fn with_shrink(mut self, shrink: u32) -> Self {
        self.shrink = shrink;
        self
    }

    /// Sets fail-fast.
    pub fn with_fail(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }

    /// Sets autorotate.
    pub fn with_autorotate(mut self, autorotate: bool) -> Self {
        self.autorotate = autorotate;
        self
    }

    /// Checks the options without any I/O.
    pub fn validate(&self) -> IoResult<()> {
        if !SHRINK_FACTORS.contains(&self.shrink) {
            return Err(IoError::Config(format!("bad shrink factor {}", self.shrink)));
        }
        Ok(())
    }
}

// ============================================================================
// Origins
// ============================================================================

/// Where a loader gets its stream from.
pub trait Origin {
    /// Produces a stream positioned anywhere; codecs rewind it.
    fn open(&mut self) -> IoResult<Stream>;

    /// Name used in logs and errors.
    fn describe(&self) -> String;
}

/// File on disk, reopened for each phase.
#[derive(Debug, Clone)]
pub struct FileOrigin {
    path: PathBuf,
}

impl FileOrigin {
    /// Loads from `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Origin for FileOrigin {
    fn open(&mut self) -> IoResult<Stream> {
        Stream::open_file(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Shared immutable buffer.
#[derive(Debug, Clone)]
pub struct BufferOrigin {
    data: Arc<[u8]>,
}

impl BufferOrigin {
    /// Loads from `data`. The blob is shared, never copied.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl Origin for BufferOrigin {
    fn open(&mut self) -> IoResult<Stream> {
        Ok(Stream::from_memory(Arc::clone(&self.data)))
    }

    fn describe(&self) -> String {
        format!("buffer ({} bytes)", self.data.len())
    }
}

/// Caller-supplied stream, rewound for each phase.
#[derive(Debug, Clone)]
pub struct StreamOrigin {
    stream: Stream,
}

impl StreamOrigin {
    /// Loads from `stream`, holding a reference for the loader's lifetime.
    pub fn new(stream: &Stream) -> Self {
        Self {
            stream: stream.clone(),
        }
    }
}

impl Origin for StreamOrigin {
    fn open(&mut self) -> IoResult<Stream> {
        if !self.stream.can_read() {
            return Err(IoError::origin(
                self.stream.nickname(),
                "no read handler attached",
            ));
        }
        Ok(self.stream.clone())
    }

    fn describe(&self) -> String {
        self.stream.nickname().to_string()
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Loader lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Options not yet validated.
    Unconfigured,
    /// Options valid, nothing read.
    Configured,
    /// Metadata available.
    HeaderLoaded,
    /// Pixels available.
    Loaded,
    /// A phase failed; the loader is unusable.
    Failed,
}

/// One codec, one origin, two phases.
pub struct Loader<O: Origin> {
    codec: Arc<dyn Codec>,
    origin: O,
    options: LoadOptions,
    state: LoaderState,
    header: Option<ImageInfo>,
    image: Option<ImageData>,
}

impl<O: Origin> Loader<O> {
    /// Creates an unconfigured loader.
    pub fn new(codec: Arc<dyn Codec>, origin: O) -> Self {
        Self {
            codec,
            origin,
            options: LoadOptions::default(),
            state: LoaderState::Unconfigured,
            header: None,
            image: None,
        }
    }

    /// Validates and stores options. Only allowed before the header phase.
    pub fn configure(&mut self, options: LoadOptions) -> IoResult<()> {
        match self.state {
            LoaderState::Unconfigured | LoaderState::Configured => {}
            other => {
                return Err(IoError::InvalidState(format!(
                    "cannot configure a loader in state {other:?}"
                )));
            }
        }
        if let Err(err) = options.validate() {
            self.fail(&err);
            return Err(err);
        }
        self.options = options;
        self.transition(LoaderState::Configured);
        Ok(())
    }

    /// Runs the header phase if needed and returns the metadata.
    pub fn header(&mut self) -> IoResult<&ImageInfo> {
        match self.state {
            LoaderState::Failed => return Err(self.failed()),
            LoaderState::Unconfigured => self.configure(self.options)?,
            _ => {}
        }
        if self.state == LoaderState::Configured {
            let result = self
                .origin
                .open()
                .and_then(|stream| self.codec.read_header(&stream, &self.options));
            match result {
                Ok(info) => {
                    self.header = Some(info);
                    self.transition(LoaderState::HeaderLoaded);
                }
                Err(err) => {
                    self.fail(&err);
                    return Err(err);
                }
            }
        }
        self.header
            .as_ref()
            .ok_or_else(|| IoError::InvalidState("header missing after header phase".into()))
    }

    /// Runs both phases if needed and returns the pixels.
    pub fn load(&mut self) -> IoResult<&ImageData> {
        if self.state != LoaderState::Loaded {
            self.header()?;
            let result = self
                .origin
                .open()
                .and_then(|stream| self.codec.read_image(&stream, &self.options))
                .and_then(|image| self.check_against_header(image));
            match result {
                Ok(image) => {
                    self.image = Some(image);
                    self.transition(LoaderState::Loaded);
                }
                Err(err) => {
                    self.fail(&err);
                    return Err(err);
                }
            }
        }
        self.image
            .as_ref()
            .ok_or_else(|| IoError::InvalidState("image missing after load phase".into()))
    }

    /// Runs both phases if needed and hands over the pixels.
    pub fn into_image(mut self) -> IoResult<ImageData> {
        self.load()?;
        self.image
            .take()
            .ok_or_else(|| IoError::InvalidState("image missing after load phase".into()))
    }

    /// Current state.
    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Options in effect.
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Codec driving this loader.
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    fn check_against_header(&self, image: ImageData) -> IoResult<ImageData> {
        match &self.header {
            Some(info) if (info.width, info.height) != (image.width, image.height) => {
                Err(IoError::DecodeError(format!(
                    "{}: header said {}x{}, decoder produced {}x{}",
                    self.origin.describe(),
                    info.width,
                    info.height,
                    image.width,
                    image.height
                )))
            }
            _ => Ok(image),
        }
    }

    fn transition(&mut self, next: LoaderState) {
        debug!(
            codec = self.codec.name(),
            origin = %self.origin.describe(),
            from = ?self.state,
            to = ?next,
            "loader state"
        );
        self.state = next;
    }

    fn fail(&mut self, err: &IoError) {
        debug!(
            codec = self.codec.name(),
            origin = %self.origin.describe(),
            error = %err,
            "loader failed"
        );
        self.header = None;
        self.image = None;
        self.state = LoaderState::Failed;
    }

    fn failed(&self) -> IoError {
        trace!(origin = %self.origin.describe(), "use of failed loader");
        IoError::InvalidState(format!("{}: loader already failed", self.origin.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::WriteSeek;
    use crate::detect::Format;
    use crate::traits::SaveOptions;
    use crate::{ErrorClass, PixelFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Codec whose "format" is: first byte = width, second = height.
    struct Toy;

    impl Codec for Toy {
        fn name(&self) -> &'static str {
            "toy"
        }
        fn format(&self) -> Format {
            Format::Unknown
        }
        fn suffixes(&self) -> &'static [&'static str] {
            &[".toy"]
        }
        fn probe_bytes(&self, _prefix: &[u8]) -> bool {
            true
        }
        fn read_header(&self, stream: &Stream, _options: &LoadOptions) -> IoResult<ImageInfo> {
            let mut dims = [0u8; 2];
            stream.rewind()?;
            if stream.read_full(&mut dims)? != 2 {
                return Err(IoError::Format("toy header truncated".into()));
            }
            let image = ImageData::new(dims[0].into(), dims[1].into(), 1, PixelFormat::U8);
            Ok(image.info())
        }
        fn read_image(&self, stream: &Stream, options: &LoadOptions) -> IoResult<ImageData> {
            let info = self.read_header(stream, options)?;
            Ok(ImageData::new(info.width, info.height, 1, PixelFormat::U8))
        }
        fn write(&self, _: &ImageData, _: &mut dyn WriteSeek, _: &SaveOptions) -> IoResult<()> {
            Err(IoError::UnsupportedOperation("toy".into()))
        }
    }

    struct Counting<'a> {
        opens: &'a AtomicUsize,
        data: Vec<u8>,
    }

    impl Origin for Counting<'_> {
        fn open(&mut self) -> IoResult<Stream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Stream::from_memory(self.data.clone()))
        }
        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn shrink_validation() {
        for ok in SHRINK_FACTORS {
            assert!(LoadOptions::new().with_shrink(ok).validate().is_ok());
        }
        for bad in [0, 3, 5, 16] {
            let err = LoadOptions::new().with_shrink(bad).validate().unwrap_err();
            assert_eq!(err.class(), ErrorClass::Config);
            assert!(err.to_string().contains(&bad.to_string()));
        }
    }

    #[test]
    fn bad_config_fails_without_io() {
        let opens = AtomicUsize::new(0);
        let origin = Counting { opens: &opens, data: vec![4, 2] };
        let mut loader = Loader::new(Arc::new(Toy), origin);
        let err = loader.configure(LoadOptions::new().with_shrink(3)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
        assert_eq!(loader.state(), LoaderState::Failed);
        assert!(loader.header().is_err());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn phases_open_once_each() {
        let opens = AtomicUsize::new(0);
        let origin = Counting { opens: &opens, data: vec![4, 2] };
        let mut loader = Loader::new(Arc::new(Toy), origin);
        assert_eq!(loader.state(), LoaderState::Unconfigured);

        let info = loader.header().unwrap();
        assert_eq!((info.width, info.height), (4, 2));
        assert_eq!(loader.state(), LoaderState::HeaderLoaded);
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        loader.header().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        let image = loader.load().unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert_eq!(loader.state(), LoaderState::Loaded);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_discards_state() {
        let opens = AtomicUsize::new(0);
        let origin = Counting { opens: &opens, data: vec![4] };
        let mut loader = Loader::new(Arc::new(Toy), origin);
        let err = loader.load().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Format);
        assert_eq!(loader.state(), LoaderState::Failed);
        assert!(matches!(loader.load(), Err(IoError::InvalidState(_))));
    }

    #[test]
    fn configure_after_header_is_rejected() {
        let mut loader = Loader::new(Arc::new(Toy), BufferOrigin::new(vec![1u8, 1]));
        loader.header().unwrap();
        assert!(matches!(
            loader.configure(LoadOptions::default()),
            Err(IoError::InvalidState(_))
        ));
        assert_eq!(loader.state(), LoaderState::HeaderLoaded);
    }

    #[test]
    fn stream_origin_without_reader_is_origin_error() {
        let stream = Stream::from_user(crate::stream::UserStream::new());
        let mut loader = Loader::new(Arc::new(Toy), StreamOrigin::new(&stream));
        let err = loader.header().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Origin);
    }
}
