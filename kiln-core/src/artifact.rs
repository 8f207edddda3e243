use image::{DynamicImage, ImageBuffer};

use crate::WriteError;

/// Raw pixels produced by one generation, channel-last (HWC) and row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<u8>,
}

impl ImageArtifact {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Number of bytes a buffer of this shape must hold.
    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.channels as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.expected_len() == 0
    }

    pub fn shape(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.channels)
    }

    /// Hand the pixel buffer over to the `image` crate.
    pub fn into_dynamic_image(self) -> Result<DynamicImage, WriteError> {
        if self.data.len() != self.expected_len() {
            return Err(WriteError::InvalidArtifact(format!(
                "buffer holds {} bytes, expected {} for {}x{}x{}",
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height,
                self.channels
            )));
        }
        let (width, height) = (self.width, self.height);
        let mismatch = || WriteError::InvalidArtifact("buffer does not match image shape".into());
        let image = match self.channels {
            1 => DynamicImage::ImageLuma8(ImageBuffer::from_raw(width, height, self.data).ok_or_else(mismatch)?),
            2 => DynamicImage::ImageLumaA8(ImageBuffer::from_raw(width, height, self.data).ok_or_else(mismatch)?),
            3 => DynamicImage::ImageRgb8(ImageBuffer::from_raw(width, height, self.data).ok_or_else(mismatch)?),
            4 => DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, self.data).ok_or_else(mismatch)?),
            n => {
                return Err(WriteError::InvalidArtifact(format!(
                    "unsupported channel count {n}"
                )))
            }
        };
        Ok(image)
    }
}

impl std::fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}
