//! Format conversion command.
//!
//! Loads with the decoder flags, then saves with the codec picked from the
//! output suffix.

use crate::ConvertArgs;
use anyhow::{bail, Context, Result};
use imgio::{Compression, SaveOptions, Subsample};
use tracing::{debug, info, trace};

/// Runs the convert command.
pub fn run(args: ConvertArgs, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), output = %args.output.display(), "convert::run");

    let save = save_options(&args)?;
    if !imgio::Registry::global().supports_suffix(&args.output) {
        bail!("No saver for: {}", args.output.display());
    }

    let load = super::load_options(args.load);
    let image = super::load_image(&args.input, &load)?;
    debug!(
        width = image.width,
        height = image.height,
        channels = image.channels,
        "loaded"
    );

    imgio::save_with(&args.output, &image, &save)
        .with_context(|| format!("Failed to save: {}", args.output.display()))?;

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        width = image.width,
        height = image.height,
        "converted"
    );
    if verbose > 0 {
        println!(
            "{} -> {} ({}x{})",
            args.input.display(),
            args.output.display(),
            image.width,
            image.height
        );
    }
    Ok(())
}

fn save_options(args: &ConvertArgs) -> Result<SaveOptions> {
    if !(1..=100).contains(&args.quality) {
        bail!("Quality must be 1-100, got {}", args.quality);
    }
    let compression = Compression::from_name(&args.compression)
        .with_context(|| format!("Unknown compression: {}", args.compression))?;
    let subsample = match args.subsample.to_ascii_lowercase().as_str() {
        "auto" => Subsample::Auto,
        "on" => Subsample::On,
        "off" => Subsample::Off,
        other => bail!("Unknown subsample mode: {other}"),
    };
    Ok(SaveOptions::default()
        .with_quality(args.quality)
        .with_progressive(args.progressive)
        .with_subsample(subsample)
        .with_compression(compression)
        .with_strip(args.strip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadFlags;
    use imgio::{ImageData, LoadOptions};

    fn args(input: std::path::PathBuf, output: std::path::PathBuf) -> ConvertArgs {
        ConvertArgs {
            input,
            output,
            load: LoadFlags {
                shrink: 2,
                autorotate: false,
                fail: false,
            },
            quality: 90,
            progressive: false,
            subsample: "off".into(),
            compression: "lzw".into(),
            strip: false,
        }
    }

    #[test]
    fn converts_jpeg_to_tiff_with_shrink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("in.jpg");
        let output = dir.path().join("out.tif");
        let image = ImageData::from_u8(10, 6, 3, vec![128; 180]).expect("image");
        imgio::save(&input, &image).expect("save input");

        run(args(input, output.clone()), 0).expect("convert");
        let info = imgio::header(&output, &LoadOptions::default()).expect("header");
        assert_eq!((info.width, info.height), (5, 3));
    }

    #[test]
    fn rejects_bad_options() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut bad = args(dir.path().join("in.jpg"), dir.path().join("out.tif"));
        bad.compression = "jpeg2000".into();
        assert!(save_options(&bad).is_err());

        let unknown = args(dir.path().join("in.jpg"), dir.path().join("out.bmp"));
        assert!(run(unknown, 0).is_err());
    }
}
