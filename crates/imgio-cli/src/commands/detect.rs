//! Detect command: which codec claims each input.

use crate::DetectArgs;
use anyhow::Result;
use imgio::{Registry, Stream};
use tracing::{debug, trace};

/// Prints one line per input: path, codec, priority and MIME type.
pub fn run(args: DetectArgs, verbose: u8) -> Result<()> {
    let registry = Registry::global();
    if verbose > 1 {
        for codec in registry.codecs() {
            println!(
                "# {:<10} priority {:>3}  {}",
                codec.name(),
                codec.priority(),
                codec.suffixes().join(" ")
            );
        }
    }

    for path in &args.input {
        trace!(input = %path.display(), "detect::run");
        let stream = if super::is_stdin(path) {
            super::stdin_stream()
        } else {
            match Stream::open_file(path) {
                Ok(stream) => stream,
                Err(err) => {
                    println!("{}: {err}", path.display());
                    continue;
                }
            }
        };
        match registry.detect_stream(&stream)? {
            Some(codec) => {
                debug!(input = %path.display(), codec = codec.name(), "detected");
                println!(
                    "{}: {} (priority {}, {})",
                    path.display(),
                    codec.name(),
                    codec.priority(),
                    codec.format().mime_type()
                );
            }
            None => println!("{}: unknown format", path.display()),
        }
    }
    Ok(())
}
