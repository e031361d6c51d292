use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::{MeasureError, Result};

/// A single image in the processing chain.
///
/// Frames are never modified in place: every preprocessing step produces a
/// new frame from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// 3-channel RGB samples, as delivered by the capture source
    Color(RgbImage),
    /// Single-channel intensity samples
    Gray(GrayImage),
}

impl Frame {
    pub fn channels(&self) -> u8 {
        match self {
            Frame::Color(_) => 3,
            Frame::Gray(_) => 1,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Frame::Color(img) => img.width(),
            Frame::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Frame::Color(img) => img.height(),
            Frame::Gray(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn as_gray(&self) -> Option<&GrayImage> {
        match self {
            Frame::Gray(img) => Some(img),
            Frame::Color(_) => None,
        }
    }

    pub fn as_color(&self) -> Option<&RgbImage> {
        match self {
            Frame::Color(img) => Some(img),
            Frame::Gray(_) => None,
        }
    }

    /// The frame as a binary mask for contour extraction.
    ///
    /// Only single-channel frames qualify; `stage` names the consumer in the
    /// error when the precondition is violated.
    pub fn require_gray(&self, stage: &'static str) -> Result<&GrayImage> {
        self.as_gray()
            .ok_or(MeasureError::UnsupportedChannelCount {
                stage,
                expected: 1,
                actual: self.channels(),
            })
    }

    /// Convert to RGB for display. Gray frames are replicated across channels.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            Frame::Color(img) => img.clone(),
            Frame::Gray(img) => DynamicImage::ImageLuma8(img.clone()).to_rgb8(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        match self {
            Frame::Color(img) => img.save(path)?,
            Frame::Gray(img) => img.save(path)?,
        }
        Ok(())
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        Frame::Color(img)
    }
}

impl From<GrayImage> for Frame {
    fn from(img: GrayImage) -> Self {
        Frame::Gray(img)
    }
}

impl From<DynamicImage> for Frame {
    fn from(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(gray) => Frame::Gray(gray),
            other => Frame::Color(other.to_rgb8()),
        }
    }
}
