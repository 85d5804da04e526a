//! imgio - sniff, inspect and convert JPEG/TIFF images
//!
//! Every load goes through an imgio stream, so `-` reads from stdin.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "imgio")]
#[command(author, version, about = "Inspect and convert images through imgio streams")]
#[command(long_about = "
Loads JPEG and TIFF images through pluggable byte streams.

Examples:
  imgio detect photo.jpg scan.tif         # Show detected codec
  imgio info photo.jpg --shrink 4         # Header only, as loaded at 1/4
  cat photo.jpg | imgio info -            # Read from stdin
  imgio convert photo.jpg out.tif -c lzw --autorotate
  imgio convert scan.tif thumb.jpg --shrink 8 -q 85 --progressive
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the codec that claims each input
    #[command(visible_alias = "d")]
    Detect(DetectArgs),

    /// Display header information and metadata
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Load one image and save it under another name
    #[command(visible_alias = "c")]
    Convert(ConvertArgs),
}

/// Decoder flags shared by `info` and `convert`.
#[derive(Args, Clone, Copy)]
struct LoadFlags {
    /// Shrink on load (1, 2, 4 or 8)
    #[arg(short, long, default_value = "1")]
    shrink: u32,

    /// Apply the EXIF orientation
    #[arg(long)]
    autorotate: bool,

    /// Treat decoder warnings as errors
    #[arg(long)]
    fail: bool,
}

#[derive(Args)]
struct DetectArgs {
    /// Input image(s), `-` for stdin
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    /// Input image(s), `-` for stdin
    #[arg(required = true)]
    input: Vec<PathBuf>,

    #[command(flatten)]
    load: LoadFlags,

    /// Also decode pixels
    #[arg(long)]
    decode: bool,

    /// List every metadata attribute
    #[arg(short, long)]
    all: bool,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input image, `-` for stdin
    input: PathBuf,

    /// Output image; the suffix picks the saver
    output: PathBuf,

    #[command(flatten)]
    load: LoadFlags,

    /// JPEG quality (1-100)
    #[arg(short, long, default_value = "75")]
    quality: u8,

    /// Write a progressive JPEG
    #[arg(long)]
    progressive: bool,

    /// Chroma subsampling: auto, on, off
    #[arg(long, default_value = "auto")]
    subsample: String,

    /// TIFF compression: none, lzw, deflate, packbits
    #[arg(short, long, default_value = "none")]
    compression: String,

    /// Drop ICC, EXIF, XMP and IPTC blocks
    #[arg(long)]
    strip: bool,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    imgio::hooks::init();

    match cli.command {
        Commands::Detect(args) => commands::detect::run(args, cli.verbose),
        Commands::Info(args) => commands::info::run(args, cli.verbose),
        Commands::Convert(args) => commands::convert::run(args, cli.verbose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn convert_flags_parse() {
        let cli = Cli::try_parse_from([
            "imgio", "-vv", "convert", "in.jpg", "out.tif", "--shrink", "4", "-c", "lzw",
            "--autorotate",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.load.shrink, 4);
        assert!(args.load.autorotate);
        assert_eq!(args.compression, "lzw");
        assert_eq!(args.quality, 75);
    }
}
