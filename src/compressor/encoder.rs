use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

use super::presets::Preset;
use crate::errors::{AppError, AppResult};

/// Output of a single encode attempt.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode, scale and re-encode one image at one preset.
///
/// Implementations are blocking and run on the blocking thread pool; they must
/// not assume they are called from an async context.
pub trait PhotoEncoder: Send + Sync + 'static {
    fn encode(&self, source: &[u8], mime: &str, preset: &Preset) -> AppResult<EncodedImage>;
}

/// Lossy WebP encoder backed by libwebp.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpEncoder;

impl WebpEncoder {
    fn decode(source: &[u8], mime: &str) -> AppResult<DynamicImage> {
        // The declared MIME type is only a hint; camera apps mislabel files often enough.
        if let Some(format) = ImageFormat::from_mime_type(mime) {
            match Self::decode_upright(ImageReader::with_format(Cursor::new(source), format)) {
                Ok(img) => return Ok(img),
                Err(e) => log::debug!("Declared type {} did not decode ({}), guessing format", mime, e),
            }
        }
        Self::decode_upright(ImageReader::new(Cursor::new(source)).with_guessed_format()?)
    }

    /// Decode and apply the EXIF orientation, so portrait captures stay portrait.
    fn decode_upright(reader: ImageReader<Cursor<&[u8]>>) -> AppResult<DynamicImage> {
        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut img = DynamicImage::from_decoder(decoder)?;
        img.apply_orientation(orientation);
        Ok(img)
    }
}

impl PhotoEncoder for WebpEncoder {
    fn encode(&self, source: &[u8], mime: &str, preset: &Preset) -> AppResult<EncodedImage> {
        let img = Self::decode(source, mime)?;
        let (width, height) = preset.scaled_dimensions(img.width(), img.height());

        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Triangle)
        };

        let rgb = resized.to_rgb8();
        let memory = webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, preset.quality * 100.0)
            .map_err(|e| AppError::Encoder(format!("WebP encoding failed: {:?}", e)))?;

        log::debug!(
            "Encoded {}x{} at q{:.2}: {} bytes",
            width,
            height,
            preset.quality,
            memory.len()
        );

        Ok(EncodedImage {
            bytes: memory.to_vec(),
            width,
            height,
        })
    }
}
