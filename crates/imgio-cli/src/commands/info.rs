//! Image info command.
//!
//! Runs the header phase and prints geometry plus metadata. `--decode`
//! also runs the load phase, which is where most decoder warnings appear.

use crate::InfoArgs;
use anyhow::Result;
use imgio::{AttrValue, ImageInfo};
use std::path::Path;
use tracing::{info, trace};

/// Runs the info command.
pub fn run(args: InfoArgs, verbose: u8) -> Result<()> {
    let options = super::load_options(args.load);
    for path in &args.input {
        trace!(input = %path.display(), "info::run");
        let header = super::read_header(path, &options)?;
        print_text(path, &header, args.all || verbose > 0);

        if args.decode {
            // stdin has been consumed by the header phase
            if super::is_stdin(path) {
                println!("  Decode:     skipped for stdin");
            } else {
                let image = super::load_image(path, &options)?;
                info!(input = %path.display(), samples = image.data.len(), "decoded");
                println!("  Decode:     ok ({} samples)", image.data.len());
            }
        }

        if args.input.len() > 1 {
            println!();
        }
    }
    Ok(())
}

fn print_text(path: &Path, header: &ImageInfo, all: bool) {
    println!("{}", path.display());
    println!("  Resolution: {}x{}", header.width, header.height);
    println!("  Channels:   {}", header.channels);
    println!("  Format:     {:?}", header.format);
    println!("  Colour:     {:?}", header.interpretation);
    if !super::is_stdin(path) {
        if let Ok(meta) = std::fs::metadata(path) {
            println!("  File size:  {}", super::format_size(meta.len()));
        }
    }
    if let Some(dpi) = header.metadata.dpi {
        println!("  DPI:        {dpi:.1}");
    }
    if let Some(orientation) = header.metadata.orientation() {
        println!("  Orientation: {orientation}");
    }

    if all {
        for (key, value) in header.metadata.attrs.iter() {
            println!("  {key}: {}", describe(value));
        }
    }
}

fn describe(value: &AttrValue) -> String {
    match value {
        AttrValue::Bytes(bytes) => format!("{} bytes", bytes.len()),
        other => other.summary(),
    }
}
