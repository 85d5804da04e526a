//! CLI command implementations

pub mod convert;
pub mod detect;
pub mod info;

use crate::LoadFlags;
use anyhow::{Context, Result};
use imgio::{ImageData, ImageInfo, LoadOptions, Stream, UserStream};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Whether `path` names standard input.
pub fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Unseekable stream over standard input.
pub fn stdin_stream() -> Stream {
    debug!("reading from stdin");
    let mut stdin = std::io::stdin();
    Stream::from_user(UserStream::new().on_read(move |buf: &mut [u8]| stdin.read(buf)))
}

/// Maps the shared load flags onto loader options.
pub fn load_options(flags: LoadFlags) -> LoadOptions {
    LoadOptions::new()
        .with_shrink(flags.shrink)
        .with_autorotate(flags.autorotate)
        .with_fail(flags.fail)
}

/// Runs the header phase on a file, or on stdin for `-`.
pub fn read_header(path: &Path, options: &LoadOptions) -> Result<ImageInfo> {
    if is_stdin(path) {
        let stream = stdin_stream();
        let codec = imgio::Registry::global()
            .detect_stream(&stream)?
            .context("stdin is not a known image format")?;
        let mut loader = imgio::Loader::new(codec, imgio::StreamOrigin::new(&stream));
        loader.configure(*options)?;
        return Ok(loader.header()?.clone());
    }
    imgio::header(path, options).with_context(|| format!("Failed to read: {}", path.display()))
}

/// Loads an image from a file, or from stdin for `-`.
pub fn load_image(path: &Path, options: &LoadOptions) -> Result<ImageData> {
    if is_stdin(path) {
        return imgio::load_stream(&stdin_stream(), options).context("Failed to load stdin");
    }
    imgio::load_with(path, options).with_context(|| format!("Failed to load: {}", path.display()))
}

/// Format file size for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
