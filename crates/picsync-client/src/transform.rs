//! Image resizing and recompression.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use picsync_core::error::AppError;
use picsync_core::models::{TransformOptions, TransformedImage};
use picsync_core::traits::ImageTransform;

/// Extensions accepted as-is on pass-through images.
const KNOWN_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".heic", ".bmp", ".tiff",
];

/// [`ImageTransform`] backed by the `image` crate.
///
/// Oversized images are scaled to fit the maximum dimension with a Lanczos3 filter
/// and re-encoded as JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegTransform;

impl JpegTransform {
    pub fn new() -> Self {
        Self
    }

    fn recompress(
        &self,
        bytes: &[u8],
        options: &TransformOptions,
    ) -> Result<Vec<u8>, AppError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AppError::ImageError(e.to_string()))?
            .decode()
            .map_err(|e| AppError::ImageError(e.to_string()))?;

        let max = options.max_dimension.max(1);
        let img = if img.width() > max || img.height() > max {
            let resized = img.resize(max, max, FilterType::Lanczos3);
            tracing::debug!(
                from = %format!("{}x{}", img.width(), img.height()),
                to = %format!("{}x{}", resized.width(), resized.height()),
                "Resized image"
            );
            resized
        } else {
            img
        };
        // JPEG has no alpha channel
        let rgb = img.to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, options.quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|e| AppError::ImageError(e.to_string()))?;
        Ok(out)
    }
}

impl ImageTransform for JpegTransform {
    fn transform(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: &TransformOptions,
    ) -> Result<TransformedImage, AppError> {
        if bytes.len() as u64 <= options.max_size_bytes {
            let filename = ensure_extension(&bytes, filename);
            return Ok(TransformedImage {
                bytes,
                filename,
                was_processed: false,
            });
        }

        match self.recompress(&bytes, options) {
            Ok(out) => {
                tracing::info!(
                    filename,
                    original_kb = bytes.len() / 1024,
                    processed_kb = out.len() / 1024,
                    "Recompressed image"
                );
                Ok(TransformedImage {
                    bytes: out,
                    filename: format!("{}.jpg", stem(filename)),
                    was_processed: true,
                })
            }
            Err(e) => {
                // HEIC and other undecodable formats are stored as downloaded
                tracing::warn!(filename, error = %e, "Could not process image, keeping original");
                let filename = ensure_extension(&bytes, filename);
                Ok(TransformedImage {
                    bytes,
                    filename,
                    was_processed: false,
                })
            }
        }
    }
}

fn stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// Keeps `filename` if it already has an image extension, otherwise swaps in the
/// one detected from the content.
pub fn ensure_extension(bytes: &[u8], filename: &str) -> String {
    let lower = filename.to_lowercase();
    if KNOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return filename.to_string();
    }
    format!("{}{}", stem(filename), detect_extension(bytes))
}

/// Image extension from magic bytes, `.jpg` when unknown.
pub fn detect_extension(bytes: &[u8]) -> &'static str {
    if bytes.len() < 12 {
        return ".jpg";
    }
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => ".jpg",
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => ".png",
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => ".gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => ".webp",
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', ..]
        | [_, _, _, _, b'f', b't', b'y', b'p', b'm', b'i', b'f', b'1', ..] => ".heic",
        [b'B', b'M', ..] => ".bmp",
        [b'I', b'I', b'*', 0x00, ..] | [b'M', b'M', 0x00, b'*', ..] => ".tiff",
        _ => ".jpg",
    }
}
