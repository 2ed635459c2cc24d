//! The pipeline's image buffer.
//!
//! An [`ImageBuffer`] is an owned RGBA8 pixel grid. Every stage consumes one
//! buffer and produces a new one; there is no mutable access once a buffer has
//! been built, so a buffer handed downstream can never change under a reader.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` with format sniffing |
//! | Encode for transport | `image::codecs::png::PngEncoder` |
//! | Flatten for print | alpha-composite over white into `RgbImage` |

use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageFormat, ImageReader, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Image has no pixels")]
    Empty,
}

/// Input formats accepted at upload.
const INPUT_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png];

/// Owned RGBA pixel grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pixels: RgbaImage,
}

impl ImageBuffer {
    /// Wrap an RGBA image. Zero-sized images are rejected.
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self, BufferError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(BufferError::Empty);
        }
        Ok(Self { pixels })
    }

    /// Decode an image file from disk.
    pub fn open(path: &Path) -> Result<Self, BufferError> {
        let bytes = std::fs::read(path)?;
        Self::from_encoded(&bytes)
            .map_err(|e| match e {
                BufferError::Decode(msg) => {
                    BufferError::Decode(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }

    /// Decode an encoded JPEG or PNG byte stream.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, BufferError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(BufferError::Io)?;
        match reader.format() {
            Some(format) if INPUT_FORMATS.contains(&format) => {}
            Some(format) => {
                return Err(BufferError::Decode(format!(
                    "unsupported format {format:?} (expected JPEG or PNG)"
                )));
            }
            None => return Err(BufferError::Decode("unrecognized image data".into())),
        }
        let decoded = reader
            .decode()
            .map_err(|e| BufferError::Decode(e.to_string()))?;
        Self::from_rgba(decoded.to_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Read-only view of the pixels.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Encoded (PNG) form used for transport to the remote service and for saving.
    pub fn encode_png(&self) -> Result<Vec<u8>, BufferError> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(
                self.pixels.as_raw(),
                self.width(),
                self.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| BufferError::Encode(e.to_string()))?;
        Ok(out)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), BufferError> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Composite over an opaque white background.
    ///
    /// Erased (transparent) areas print as paper white.
    pub fn flatten_onto_white(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let Rgba([r, g, b, a]) = *self.pixels.get_pixel(x, y);
            let alpha = a as u32;
            let over = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            Rgb([over(r), over(g), over(b)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::gradient_image;

    #[test]
    fn empty_image_is_rejected() {
        let result = ImageBuffer::from_rgba(RgbaImage::new(0, 10));
        assert!(matches!(result, Err(BufferError::Empty)));
    }

    #[test]
    fn png_encoding_decodes_back_to_same_pixels() {
        let image = gradient_image(32, 24);
        let bytes = image.encode_png().unwrap();
        let decoded = ImageBuffer::from_encoded(&bytes).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn open_reads_jpeg_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        let rgb = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, 90]));
        rgb.save_with_format(&path, ImageFormat::Jpeg).unwrap();

        let image = ImageBuffer::open(&path).unwrap();
        assert_eq!(image.dimensions(), (40, 30));
        // JPEG has no alpha: every pixel decodes opaque
        assert!(image.pixels().pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let result = ImageBuffer::open(Path::new("/nonexistent/photo.png"));
        assert!(matches!(result, Err(BufferError::Io(_))));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = ImageBuffer::from_encoded(b"definitely not an image");
        assert!(matches!(result, Err(BufferError::Decode(_))));
    }

    #[test]
    fn flatten_turns_transparent_into_white() {
        let mut pixels = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        pixels.put_pixel(1, 0, Rgba([10, 20, 30, 0]));
        let image = ImageBuffer::from_rgba(pixels).unwrap();

        let flat = image.flatten_onto_white();
        assert_eq!(flat.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }
}
