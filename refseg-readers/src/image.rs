//! Image decoding into pixel arrays
//!
//! Encoded buffers are sniffed by their magic bytes and decoded into
//! `[H, W, 3]` RGB or `[H, W]` grayscale `u8` arrays.

use std::fs;
use std::io;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use crate::error::{Error, Result};

/// Image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG format
    Jpeg,
    /// PNG format
    Png,
    /// BMP format
    Bmp,
    /// Unknown format
    Unknown,
}

impl ImageFormat {
    /// Detect image format from file extension
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "bmp" => ImageFormat::Bmp,
            _ => ImageFormat::Unknown,
        }
    }

    /// Detect image format from magic bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match bytes {
            // JPEG: FF D8 FF
            [0xFF, 0xD8, 0xFF, ..] => ImageFormat::Jpeg,

            // PNG: 89 50 4E 47 0D 0A 1A 0A
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => ImageFormat::Png,

            // BMP: 42 4D
            [0x42, 0x4D, ..] => ImageFormat::Bmp,

            _ => ImageFormat::Unknown,
        }
    }

    fn codec(self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
            ImageFormat::Unknown => None,
        }
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = ImageFormat::from_bytes(bytes);
    let codec = format.codec().ok_or_else(|| {
        Error::Format(format!(
            "unrecognized image data ({} bytes, starts with {:02x?})",
            bytes.len(),
            &bytes[..bytes.len().min(4)]
        ))
    })?;
    Ok(image::load_from_memory_with_format(bytes, codec)?)
}

/// Decode an encoded buffer into an `[H, W, 3]` RGB array
pub fn decode_rgb(bytes: &[u8]) -> Result<Array3<u8>> {
    let rgb = decode(bytes)?.into_rgb8();
    let (w, h) = rgb.dimensions();
    Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
        .map_err(|e| Error::Format(e.to_string()))
}

/// Decode an encoded buffer into an `[H, W]` grayscale array
pub fn decode_gray(bytes: &[u8]) -> Result<Array2<u8>> {
    let gray = decode(bytes)?.into_luma8();
    let (w, h) = gray.dimensions();
    Array2::from_shape_vec((h as usize, w as usize), gray.into_raw())
        .map_err(|e| Error::Format(e.to_string()))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

/// Read and decode an RGB image file
pub fn read_rgb<P: AsRef<Path>>(path: P) -> Result<Array3<u8>> {
    decode_rgb(&read_file(path.as_ref())?)
}

/// Read and decode a grayscale image file
pub fn read_gray<P: AsRef<Path>>(path: P) -> Result<Array2<u8>> {
    decode_gray(&read_file(path.as_ref())?)
}

fn dimension(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::Format(format!("image dimension {len} is too large")))
}

/// Encode an `[H, W, 3]` RGB array as PNG
pub fn encode_png_rgb(image: ArrayView3<u8>) -> Result<Vec<u8>> {
    let (h, w, channels) = image.dim();
    if channels != 3 {
        return Err(Error::Format(format!(
            "expected 3 channels, got {channels}"
        )));
    }
    let raw: Vec<u8> = image.iter().copied().collect();
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(&raw, dimension(w)?, dimension(h)?, ColorType::Rgb8)?;
    Ok(buf)
}

/// Encode an `[H, W]` grayscale array as PNG
pub fn encode_png_gray(mask: ArrayView2<u8>) -> Result<Vec<u8>> {
    let (h, w) = mask.dim();
    let raw: Vec<u8> = mask.iter().copied().collect();
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(&raw, dimension(w)?, dimension(h)?, ColorType::L8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("JPG", ImageFormat::Jpeg)]
    #[test_case("png", ImageFormat::Png)]
    #[test_case("bmp", ImageFormat::Bmp)]
    #[test_case("tiff", ImageFormat::Unknown)]
    fn test_format_from_extension(ext: &str, expected: ImageFormat) {
        assert_eq!(ImageFormat::from_extension(ext), expected);
    }

    #[test]
    fn test_format_from_bytes() {
        assert_eq!(ImageFormat::from_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_bytes(b"BM\0\0"), ImageFormat::Bmp);
        assert_eq!(ImageFormat::from_bytes(b"GIF89a"), ImageFormat::Unknown);
        assert_eq!(ImageFormat::from_bytes(&[]), ImageFormat::Unknown);
    }

    #[test]
    fn test_png_rgb_keeps_channel_order() {
        let image = Array3::from_shape_fn((3, 5, 3), |(y, x, c)| (y * 50 + x * 10 + c) as u8);
        let bytes = encode_png_rgb(image.view()).unwrap();
        assert_eq!(ImageFormat::from_bytes(&bytes), ImageFormat::Png);

        let decoded = decode_rgb(&bytes).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_gray_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mask = Array2::from_shape_fn((4, 6), |(y, x)| if x > y { 255 } else { 0 });
        let path = dir.path().join("mask.png");
        std::fs::write(&path, encode_png_gray(mask.view()).unwrap()).unwrap();

        assert_eq!(read_gray(&path).unwrap(), mask);
        // A grayscale file read as RGB repeats the value in every channel.
        let rgb = read_rgb(&path).unwrap();
        assert_eq!(rgb.dim(), (4, 6, 3));
        assert_eq!(rgb[[0, 5, 2]], 255);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = read_rgb("/nonexistent/dir/image.png").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("/nonexistent/dir/image.png"));
    }

    #[test]
    fn test_garbage_is_format_error() {
        assert!(matches!(decode_gray(b"not an image at all"), Err(Error::Format(_))));
    }
}
