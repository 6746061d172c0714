// Decoded camera frames handed to the detectors

use image::{DynamicImage, GrayImage, RgbImage};

/// A single decoded camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub image: RgbImage,
}

impl Frame {
    /// Decode an encoded image (JPEG, PNG, WebP...) into a frame
    pub fn decode(bytes: &[u8], timestamp: i64) -> FrameResult<Self> {
        if bytes.is_empty() {
            return Err(FrameError::EmptyInput);
        }
        let image = image::load_from_memory(bytes)?.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::ZeroSized);
        }
        Ok(Self { timestamp, image })
    }

    pub fn from_rgb(image: RgbImage, timestamp: i64) -> Self {
        Self { timestamp, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Luminance copy of the frame
    pub fn to_luma(&self) -> GrayImage {
        DynamicImage::ImageRgb8(self.image.clone()).to_luma8()
    }
}

/// Whether an upload's declared content type is an image
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Empty image payload")]
    EmptyInput,

    #[error("Image has zero width or height")]
    ZeroSized,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Image decoding failed: {0}")]
    Decode(#[from] image::ImageError),
}

pub type FrameResult<T> = Result<T, FrameError>;
