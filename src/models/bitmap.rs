//! Decoded image handle

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Format used when a bitmap is written to the disk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeFormat {
    /// Lossless, keeps alpha
    Png,
    /// Lossy, alpha is dropped
    #[default]
    Jpeg,
}

/// Encoding settings for disk blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Output format
    pub format: EncodeFormat,
    /// JPEG quality (1-100), ignored for PNG
    pub quality: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format: EncodeFormat::Jpeg,
            quality: 70,
        }
    }
}

/// A decoded image shared between cache tiers and consumers.
///
/// Cloning is cheap; the pixels live behind an `Arc`.
#[derive(Clone)]
pub struct Bitmap {
    image: Arc<DynamicImage>,
}

impl Bitmap {
    /// Wrap a decoded image.
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Resident size of the decoded pixels in bytes.
    pub fn byte_size(&self) -> usize {
        self.image.as_bytes().len()
    }

    /// Borrow the decoded image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Whether two handles point at the same pixels.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Encode for storage in the disk tier.
    pub fn encode(&self, options: EncodeOptions) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match options.format {
            EncodeFormat::Png => {
                self.image
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            }
            EncodeFormat::Jpeg => {
                let quality = options.quality.clamp(1, 100);
                let rgb = DynamicImage::ImageRgb8(self.image.to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
            }
        }
        Ok(buf)
    }
}

impl From<DynamicImage> for Bitmap {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes", &self.byte_size())
            .finish()
    }
}
