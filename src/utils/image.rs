//! Image normalization: decode (JPEG/PNG/WebP), apply EXIF orientation,
//! bound the width, re-encode as JPEG. Every document goes through this
//! before it is uploaded or shown to the face-match provider, so storage and
//! the provider only ever see one canonical format.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

use crate::errors::{AppError, Result};

const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Decode `input`, fix its EXIF orientation, downscale to at most `max_width`
/// pixels wide (0 = no resize), and encode as JPEG at `quality` (1..=100,
/// anything else falls back to 85). Pure function over bytes.
pub fn normalize_to_jpeg(input: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Err(AppError::ImageError("empty image".to_string()));
    }
    let quality = if (1..=100).contains(&quality) {
        quality
    } else {
        DEFAULT_JPEG_QUALITY
    };

    let decoded = image::load_from_memory(input)
        .map_err(|e| AppError::ImageError(format!("unsupported image format (need jpeg/png/webp): {}", e)))?;

    // Orientation must be read from the original bytes; the decoded pixel
    // buffer no longer carries the tag.
    let orientation = read_exif_orientation(input);
    let mut img = apply_orientation(decoded, orientation);

    if max_width > 0 {
        img = resize_max_width(img, max_width);
    }

    // JPEG has no alpha channel; flatten before encoding.
    let rgb = img.to_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| AppError::ImageError(format!("jpeg encode failed: {}", e)))?;
    Ok(out)
}

/// Read the EXIF orientation tag (1..=8) from raw image bytes.
/// Returns 1 (upright) when there is no EXIF data or no orientation tag.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply the transform named by an EXIF orientation value.
///
/// 1 = upright, 2 = flip horizontal, 3 = rotate 180, 4 = flip vertical,
/// 5 = transpose, 6 = rotate 90 CW, 7 = transverse, 8 = rotate 90 CCW.
/// Unknown values are treated as upright.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn resize_max_width(img: DynamicImage, max_width: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 || w <= max_width {
        return img;
    }

    let scale = max_width as f64 / w as f64;
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    img.resize_exact(max_width, new_h, FilterType::CatmullRom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::webp::WebPEncoder;
    use image::{ColorType, ImageOutputFormat, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        })
    }

    fn as_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn as_jpeg(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buf, ImageOutputFormat::Jpeg(90))
            .unwrap();
        buf.into_inner()
    }

    fn as_webp(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        WebPEncoder::new_lossless(&mut buf)
            .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
            .unwrap();
        buf
    }

    fn dimensions(jpeg: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(jpeg).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn normalizes_all_supported_encodings() {
        let src = gradient(64, 48);
        for bytes in [as_jpeg(&src), as_png(&src), as_webp(&src)] {
            let out = normalize_to_jpeg(&bytes, 0, 85).unwrap();
            assert_eq!(dimensions(&out), (64, 48));
            // Output is always JPEG regardless of the source encoding.
            assert_eq!(&out[..2], &[0xFF, 0xD8]);
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            normalize_to_jpeg(&[], 1200, 85),
            Err(AppError::ImageError(_))
        ));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let err = normalize_to_jpeg(b"definitely not an image", 1200, 85).unwrap_err();
        assert!(matches!(err, AppError::ImageError(_)));
    }

    #[test]
    fn wide_images_are_capped_preserving_aspect_ratio() {
        let bytes = as_jpeg(&gradient(2000, 1000));
        let out = normalize_to_jpeg(&bytes, 1200, 85).unwrap();
        assert_eq!(dimensions(&out), (1200, 600));
    }

    #[test]
    fn rounds_scaled_height() {
        // 1333 * 1200/2000 = 799.8 -> 800
        let bytes = as_png(&gradient(2000, 1333));
        let out = normalize_to_jpeg(&bytes, 1200, 85).unwrap();
        assert_eq!(dimensions(&out), (1200, 800));
    }

    #[test]
    fn narrow_images_pass_through_unscaled() {
        let bytes = as_png(&gradient(800, 600));
        let out = normalize_to_jpeg(&bytes, 1200, 85).unwrap();
        assert_eq!(dimensions(&out), (800, 600));
    }

    #[test]
    fn zero_max_width_means_no_resize() {
        let bytes = as_png(&gradient(2000, 500));
        let out = normalize_to_jpeg(&bytes, 0, 85).unwrap();
        assert_eq!(dimensions(&out), (2000, 500));
    }

    #[test]
    fn out_of_range_quality_falls_back_to_default() {
        let bytes = as_jpeg(&gradient(32, 32));
        assert!(normalize_to_jpeg(&bytes, 0, 0).is_ok());
        assert!(normalize_to_jpeg(&bytes, 0, 200).is_ok());
    }

    #[test]
    fn canonical_jpeg_dimensions_round_trip() {
        let bytes = as_jpeg(&gradient(640, 480));
        let once = normalize_to_jpeg(&bytes, 1200, 85).unwrap();
        let twice = normalize_to_jpeg(&once, 1200, 85).unwrap();
        assert_eq!(dimensions(&once), (640, 480));
        assert_eq!(dimensions(&twice), (640, 480));
    }

    #[test]
    fn plain_files_read_as_orientation_one() {
        assert_eq!(read_exif_orientation(&as_png(&gradient(8, 8))), 1);
        assert_eq!(read_exif_orientation(&as_jpeg(&gradient(8, 8))), 1);
        assert_eq!(read_exif_orientation(b"not an image"), 1);
    }

    /// Splice an APP1 EXIF segment carrying only the orientation tag right
    /// after the SOI marker of an existing JPEG.
    fn tag_jpeg_with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        // Little-endian TIFF with a single IFD0 entry: tag 0x0112 (SHORT).
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II\x2A\x00");
        tiff.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset
        tiff.extend_from_slice(&1u16.to_le_bytes()); // entry count
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes()); // SHORT
        tiff.extend_from_slice(&1u32.to_le_bytes()); // value count
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0, 0]); // value field padding
        tiff.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

        let mut payload = b"Exif\x00\x00".to_vec();
        payload.extend_from_slice(&tiff);

        let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
        out.extend_from_slice(&jpeg[..2]);
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn reads_every_orientation_tag_value_from_app1() {
        let base = as_jpeg(&gradient(16, 8));
        for orientation in 1..=8u16 {
            let tagged = tag_jpeg_with_orientation(&base, orientation);
            assert_eq!(read_exif_orientation(&tagged), orientation as u32);
        }
    }

    #[test]
    fn orientation_tag_is_honored_through_normalize() {
        let base = as_jpeg(&gradient(200, 100));

        // 1-4 keep the axes; 5-8 swap them.
        for orientation in [1u16, 2, 3, 4] {
            let tagged = tag_jpeg_with_orientation(&base, orientation);
            let out = normalize_to_jpeg(&tagged, 0, 85).unwrap();
            assert_eq!(dimensions(&out), (200, 100), "orientation {}", orientation);
        }
        for orientation in [5u16, 6, 7, 8] {
            let tagged = tag_jpeg_with_orientation(&base, orientation);
            let out = normalize_to_jpeg(&tagged, 0, 85).unwrap();
            assert_eq!(dimensions(&out), (100, 200), "orientation {}", orientation);
        }
    }

    #[test]
    fn orientation_applies_before_the_width_cap() {
        // 3000x1000 tagged rotate-90 becomes 1000x3000 upright, which is
        // already narrower than the cap, so no resize happens.
        let tagged = tag_jpeg_with_orientation(&as_jpeg(&gradient(3000, 1000)), 6);
        let out = normalize_to_jpeg(&tagged, 1200, 85).unwrap();
        assert_eq!(dimensions(&out), (1000, 3000));
    }

    // A 2x1 image with distinct pixels pins down every transform exactly:
    // L = left pixel, R = right pixel in the upright rendering.
    fn two_pixel() -> DynamicImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0])); // L
        img.put_pixel(1, 0, Rgb([0, 0, 255])); // R
        DynamicImage::ImageRgb8(img)
    }

    fn pixel(img: &DynamicImage, x: u32, y: u32) -> [u8; 3] {
        let p = img.to_rgb8().get_pixel(x, y).0;
        [p[0], p[1], p[2]]
    }

    const L: [u8; 3] = [255, 0, 0];
    const R: [u8; 3] = [0, 0, 255];

    #[test]
    fn orientation_identity_and_unknown() {
        for o in [1, 0, 9, 99] {
            let out = apply_orientation(two_pixel(), o);
            assert_eq!((out.width(), out.height()), (2, 1));
            assert_eq!(pixel(&out, 0, 0), L);
            assert_eq!(pixel(&out, 1, 0), R);
        }
    }

    #[test]
    fn orientation_flip_horizontal() {
        let out = apply_orientation(two_pixel(), 2);
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(pixel(&out, 0, 0), R);
        assert_eq!(pixel(&out, 1, 0), L);
    }

    #[test]
    fn orientation_rotate_180() {
        let out = apply_orientation(two_pixel(), 3);
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(pixel(&out, 0, 0), R);
        assert_eq!(pixel(&out, 1, 0), L);
    }

    #[test]
    fn orientation_flip_vertical() {
        let out = apply_orientation(two_pixel(), 4);
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(pixel(&out, 0, 0), L);
        assert_eq!(pixel(&out, 1, 0), R);
    }

    #[test]
    fn orientation_transpose() {
        let out = apply_orientation(two_pixel(), 5);
        assert_eq!((out.width(), out.height()), (1, 2));
        assert_eq!(pixel(&out, 0, 0), L);
        assert_eq!(pixel(&out, 0, 1), R);
    }

    #[test]
    fn orientation_rotate_90_cw() {
        let out = apply_orientation(two_pixel(), 6);
        assert_eq!((out.width(), out.height()), (1, 2));
        assert_eq!(pixel(&out, 0, 0), L);
        assert_eq!(pixel(&out, 0, 1), R);
    }

    #[test]
    fn orientation_transverse() {
        let out = apply_orientation(two_pixel(), 7);
        assert_eq!((out.width(), out.height()), (1, 2));
        assert_eq!(pixel(&out, 0, 0), R);
        assert_eq!(pixel(&out, 0, 1), L);
    }

    #[test]
    fn orientation_rotate_90_ccw() {
        let out = apply_orientation(two_pixel(), 8);
        assert_eq!((out.width(), out.height()), (1, 2));
        assert_eq!(pixel(&out, 0, 0), R);
        assert_eq!(pixel(&out, 0, 1), L);
    }
}
