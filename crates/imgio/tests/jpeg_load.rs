//! JPEG loading through every origin kind.
#![cfg(feature = "jpeg")]

use imgio::metadata::keys;
use imgio::{
    exif, jpeg, Codec, ErrorClass, ImageData, IoError, LoadOptions, SaveOptions, Stream,
    UserStream,
};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Create a simple RGB test image.
fn test_image(width: u32, height: u32) -> ImageData {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 16) as u8, (y * 16) as u8, 90]);
        }
    }
    ImageData::from_u8(width, height, 3, data).expect("test image")
}

fn encode(image: &ImageData) -> Vec<u8> {
    jpeg::save_buffer(image, &SaveOptions::default().with_quality(90)).expect("encode jpeg")
}

/// Read-only user stream over `data`, unseekable.
fn pipe(data: Vec<u8>) -> Stream {
    let mut cursor = Cursor::new(data);
    Stream::from_user(UserStream::new().on_read(move |buf: &mut [u8]| cursor.read(buf)))
}

#[test]
fn file_origin() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gradient.jpg");
    jpeg::save(&path, &test_image(16, 8), &SaveOptions::default()).expect("save");

    assert!(jpeg::is_a_file(&path));
    let info = jpeg::header(&path, &LoadOptions::default()).expect("header");
    assert_eq!((info.width, info.height, info.channels), (16, 8, 3));

    let image = imgio::load(&path).expect("load");
    assert_eq!((image.width, image.height), (16, 8));
}

#[test]
fn missing_file_is_origin_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = jpeg::load(dir.path().join("nope.jpg"), &LoadOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Origin);
    assert!(!jpeg::is_a_file(dir.path().join("nope.jpg")));
}

#[test]
fn buffer_origin_shares_data() {
    let bytes: Arc<[u8]> = encode(&test_image(8, 8)).into();
    let image = imgio::load_buffer(Arc::clone(&bytes), &LoadOptions::default()).expect("load");
    assert_eq!((image.width, image.height), (8, 8));
    assert_eq!(Arc::strong_count(&bytes), 1);
}

#[test]
fn unseekable_stream_loads() {
    let stream = pipe(encode(&test_image(24, 16)));
    assert!(!stream.is_seekable());
    assert!(jpeg::is_a_stream(&stream).expect("sniff"));

    let image = imgio::load_stream(&stream, &LoadOptions::default()).expect("load pipe");
    assert_eq!((image.width, image.height), (24, 16));
    assert_eq!(stream.ref_count(), 1);
}

#[test]
fn unseekable_stream_cannot_be_loaded_twice() {
    let stream = pipe(encode(&test_image(8, 8)));
    jpeg::load_stream(&stream, &LoadOptions::default()).expect("first load");
    let err = jpeg::load_stream(&stream, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Io);
}

#[test]
fn stream_without_read_handler() {
    let stream = Stream::from_user(UserStream::new());
    let mut buf = [0u8; 4];
    assert_eq!(stream.read(&mut buf).expect("read"), 0);

    let err = jpeg::load_stream(&stream, &LoadOptions::default()).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Origin);
}

#[test]
fn invalid_shrink_touches_nothing() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reads);
    let stream = Stream::from_user(UserStream::new().on_read(move |_buf: &mut [u8]| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }));

    for shrink in [0, 3, 16] {
        let opts = LoadOptions::new().with_shrink(shrink);
        let err = jpeg::load_stream(&stream, &opts).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
        let err = imgio::load_stream(&stream, &opts).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
    }
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[test]
fn shrink_on_load_rounds_up() {
    let bytes = encode(&test_image(20, 10));
    for (shrink, expected) in [(1, (20, 10)), (2, (10, 5)), (4, (5, 3)), (8, (3, 2))] {
        let opts = LoadOptions::new().with_shrink(shrink);
        let info = header_from(&bytes, &opts);
        assert_eq!((info.0, info.1), expected, "header, shrink {shrink}");
        let image = jpeg::load_buffer(bytes.clone(), &opts).expect("load");
        assert_eq!((image.width, image.height), expected, "load, shrink {shrink}");
    }
}

#[test]
fn shrink_thin_images_rounds_up_per_axis() {
    let cases = [
        ((2, 32), 2, (1, 16)),
        ((4, 64), 4, (1, 16)),
        ((64, 3), 4, (16, 1)),
        ((30, 9), 8, (4, 2)),
        ((3, 3), 8, (1, 1)),
    ];
    for ((width, height), shrink, expected) in cases {
        let gray = vec![128u8; (width * height) as usize];
        let image = ImageData::from_u8(width, height, 1, gray).expect("gray image");
        let bytes = jpeg::save_buffer(&image, &SaveOptions::default()).expect("encode jpeg");
        let opts = LoadOptions::new().with_shrink(shrink);

        let header = header_from(&bytes, &opts);
        assert_eq!(header, expected, "header, {width}x{height} shrink {shrink}");
        let image = jpeg::load_buffer(bytes, &opts).expect("load");
        assert_eq!(
            (image.width, image.height),
            expected,
            "load, {width}x{height} shrink {shrink}"
        );
    }
}

#[test]
fn autorotate_applies_and_clears_orientation() {
    let mut image = test_image(8, 4);
    image.metadata.set_orientation(6);
    let bytes = encode(&image);

    let plain = jpeg::load_buffer(bytes.clone(), &LoadOptions::default()).expect("load");
    assert_eq!((plain.width, plain.height), (8, 4));
    assert_eq!(plain.metadata.orientation(), Some(6));

    let opts = LoadOptions::new().with_autorotate(true);
    let rotated = jpeg::load_buffer(bytes.clone(), &opts).expect("load rotated");
    assert_eq!((rotated.width, rotated.height), (4, 8));
    assert_eq!(rotated.metadata.orientation(), None);
    assert_eq!(rotated.metadata.exif().and_then(exif::orientation), Some(1));

    let header = header_from(&bytes, &opts);
    assert_eq!((header.0, header.1), (4, 8));
}

#[test]
fn extraneous_bytes_warn_or_fail() {
    let mut bytes = encode(&test_image(8, 8));
    bytes.insert(2, 0x42);

    let image = jpeg::load_buffer(bytes.clone(), &LoadOptions::default()).expect("lenient load");
    assert_eq!((image.width, image.height), (8, 8));

    let err = jpeg::load_buffer(bytes, &LoadOptions::new().with_fail(true)).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Warning);
    assert!(err.to_string().contains("extraneous"), "{err}");
}

#[test]
fn truncated_data_is_an_error() {
    let bytes = encode(&test_image(32, 32));
    let cut = bytes[..bytes.len() / 2].to_vec();
    assert!(jpeg::load_buffer(cut, &LoadOptions::default()).is_err());
}

#[test]
fn concurrent_loaders_share_one_buffer() {
    let bytes: Arc<[u8]> = encode(&test_image(16, 16)).into();
    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let bytes = Arc::clone(&bytes);
            std::thread::spawn(move || {
                let shrink = 1 << (i % 4);
                let opts = LoadOptions::new().with_shrink(shrink);
                let image = jpeg::load_buffer(bytes, &opts).expect("threaded load");
                (shrink, image.width)
            })
        })
        .collect();
    for handle in handles {
        let (shrink, width) = handle.join().expect("thread");
        assert_eq!(width, 16u32.div_ceil(shrink));
    }
}

#[test]
fn metadata_round_trip() {
    let mut image = test_image(8, 8);
    image.metadata.set_blob(keys::IPTC, b"Photoshop 3.0\0payload".to_vec());
    image.metadata.set_resolution(72.0 / 25.4, 72.0 / 25.4, "in");
    let back = jpeg::load_buffer(encode(&image), &LoadOptions::default()).expect("load");
    assert_eq!(
        back.metadata.attrs.get(keys::IPTC).and_then(|v| v.as_bytes()),
        Some(&b"Photoshop 3.0\0payload"[..])
    );
    assert!((back.metadata.dpi.expect("dpi") - 72.0).abs() < 0.5);
}

#[test]
fn not_a_jpeg_is_rejected() {
    let err = jpeg::load_buffer(b"GIF89a....".to_vec(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, IoError::Format(_)));
    let err = imgio::load_buffer(b"GIF89a....".to_vec(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, IoError::UnsupportedFormat(_)));
}

/// Header dimensions of an in-memory JPEG.
fn header_from(bytes: &[u8], options: &LoadOptions) -> (u32, u32) {
    let info = jpeg::JpegCodec
        .read_header(&Stream::from_memory(bytes.to_vec()), options)
        .expect("header");
    (info.width, info.height)
}
