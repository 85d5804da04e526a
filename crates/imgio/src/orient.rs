//! Pixel reshaping done at load time: EXIF orientation and box shrink.

use crate::exif;
use crate::metadata::keys;
use crate::{AttrValue, ImageData, Metadata, PixelData};

/// True for orientations that transpose the image (5..=8).
pub fn swaps_dimensions(orientation: u16) -> bool {
    (5..=8).contains(&orientation)
}

/// Dimensions after applying `orientation`.
pub fn oriented_size(width: u32, height: u32, orientation: u16) -> (u32, u32) {
    if swaps_dimensions(orientation) {
        (height, width)
    } else {
        (width, height)
    }
}

/// Removes the orientation attribute and resets the tag inside the EXIF
/// block to 1, so the rotated pixels are not rotated again downstream.
pub fn take_orientation(meta: &mut Metadata) -> Option<u16> {
    let orientation = meta.orientation();
    meta.attrs.remove(keys::ORIENTATION);
    if let Some(AttrValue::Bytes(mut block)) = meta.attrs.remove(keys::EXIF) {
        exif::set_orientation(&mut block, 1);
        meta.attrs.set(keys::EXIF, AttrValue::Bytes(block));
    }
    orientation
}

/// Returns `image` transformed so that it displays upright.
///
/// Orientation values outside 2..=8 leave the pixels untouched. Metadata is
/// copied as is; callers clear the orientation tag themselves.
pub fn apply_orientation(image: &ImageData, orientation: u16) -> ImageData {
    if !(2..=8).contains(&orientation) {
        return image.clone();
    }
    let (w, h, c) = (
        image.width as usize,
        image.height as usize,
        image.channels as usize,
    );
    let data = match &image.data {
        PixelData::U8(src) => PixelData::U8(reorient(src, w, h, c, orientation)),
        PixelData::U16(src) => PixelData::U16(reorient(src, w, h, c, orientation)),
        PixelData::F32(src) => PixelData::F32(reorient(src, w, h, c, orientation)),
    };
    let (width, height) = oriented_size(image.width, image.height, orientation);
    image.with_pixels(width, height, data)
}

fn reorient<T: Copy + Default>(src: &[T], w: usize, h: usize, c: usize, orientation: u16) -> Vec<T> {
    let (dw, dh) = if swaps_dimensions(orientation) { (h, w) } else { (w, h) };
    let mut dst = vec![T::default(); src.len()];
    for dy in 0..dh {
        for dx in 0..dw {
            let (sx, sy) = match orientation {
                2 => (w - 1 - dx, dy),
                3 => (w - 1 - dx, h - 1 - dy),
                4 => (dx, h - 1 - dy),
                5 => (dy, dx),
                6 => (dy, h - 1 - dx),
                7 => (w - 1 - dy, h - 1 - dx),
                8 => (w - 1 - dy, dx),
                _ => (dx, dy),
            };
            let s = (sy * w + sx) * c;
            let d = (dy * dw + dx) * c;
            dst[d..d + c].copy_from_slice(&src[s..s + c]);
        }
    }
    dst
}

/// Size after shrinking by `factor`, rounding up.
pub fn shrunk_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    (width.div_ceil(factor), height.div_ceil(factor))
}

/// Box-filter shrink by an integer factor. Edge blocks average only the
/// pixels they cover.
pub fn shrink(image: &ImageData, factor: u32) -> ImageData {
    if factor <= 1 {
        return image.clone();
    }
    let (width, height) = shrunk_size(image.width, image.height, factor);
    let geometry = Geometry {
        w: image.width as usize,
        h: image.height as usize,
        c: image.channels as usize,
        f: factor as usize,
    };
    let data = match &image.data {
        PixelData::U8(src) => PixelData::U8(geometry.average(src, f64::from, |v| {
            v.round().clamp(0.0, 255.0) as u8
        })),
        PixelData::U16(src) => PixelData::U16(geometry.average(src, f64::from, |v| {
            v.round().clamp(0.0, 65535.0) as u16
        })),
        PixelData::F32(src) => PixelData::F32(geometry.average(src, f64::from, |v| v as f32)),
    };
    image.with_pixels(width, height, data)
}

struct Geometry {
    w: usize,
    h: usize,
    c: usize,
    f: usize,
}

impl Geometry {
    fn average<T: Copy>(&self, src: &[T], to: impl Fn(T) -> f64, from: impl Fn(f64) -> T) -> Vec<T> {
        let dw = self.w.div_ceil(self.f);
        let dh = self.h.div_ceil(self.f);
        let mut dst = Vec::with_capacity(dw * dh * self.c);
        let mut sums = vec![0f64; self.c];
        for by in 0..dh {
            let y_end = ((by + 1) * self.f).min(self.h);
            for bx in 0..dw {
                let x_end = ((bx + 1) * self.f).min(self.w);
                sums.fill(0.0);
                let mut count = 0usize;
                for y in by * self.f..y_end {
                    for x in bx * self.f..x_end {
                        let s = (y * self.w + x) * self.c;
                        for (sum, &v) in sums.iter_mut().zip(&src[s..s + self.c]) {
                            *sum += to(v);
                        }
                        count += 1;
                    }
                }
                dst.extend(sums.iter().map(|&sum| from(sum / count as f64)));
            }
        }
        dst
    }
}
