use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use tracing::{debug, info};

use crate::error::{MeasureError, Result};
use crate::frame::Frame;

/// A capture device the stream controller pulls frames from.
///
/// `open` and `release` are idempotent: opening an open source or releasing
/// a released (or never opened) source does nothing.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<()>;

    /// Read one frame; fails with `DeviceUnavailable` if the source is closed
    fn read_frame(&mut self) -> Result<Frame>;

    fn release(&mut self);

    fn is_open(&self) -> bool;

    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Still image on disk; every read returns the same frame
pub struct ImageFileSource {
    path: PathBuf,
    image: Option<RgbImage>,
}

impl ImageFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            image: None,
        }
    }
}

impl FrameSource for ImageFileSource {
    fn open(&mut self) -> Result<()> {
        if self.image.is_some() {
            return Ok(());
        }
        let unavailable = |e: &dyn std::fmt::Display| {
            MeasureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e))
        };
        let image = ImageReader::open(&self.path)
            .map_err(|e| unavailable(&e))?
            .decode()
            .map_err(|e| unavailable(&e))?
            .to_rgb8();
        info!(
            "Image loaded: {} ({}x{})",
            self.path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.image
            .clone()
            .map(Frame::Color)
            .ok_or_else(|| MeasureError::DeviceUnavailable(format!("{} is not open", self.path.display())))
    }

    fn release(&mut self) {
        if self.image.take().is_some() {
            debug!("Released {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.image.is_some()
    }

    fn describe(&self) -> String {
        format!("image file {}", self.path.display())
    }
}

/// Frames produced by a closure, indexed from 0. Useful for tests and demos.
pub struct SyntheticSource<F> {
    generator: F,
    index: u64,
    open: bool,
}

impl<F> SyntheticSource<F>
where
    F: FnMut(u64) -> Result<Frame> + Send,
{
    pub fn new(generator: F) -> Self {
        Self {
            generator,
            index: 0,
            open: false,
        }
    }
}

impl<F> FrameSource for SyntheticSource<F>
where
    F: FnMut(u64) -> Result<Frame> + Send,
{
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(MeasureError::DeviceUnavailable("synthetic source is not open".to_string()));
        }
        let frame = (self.generator)(self.index);
        self.index += 1;
        frame
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        "synthetic source".to_string()
    }
}

/// Pick a source for `input`: a V4L2 device path (with the `v4l_input`
/// feature) or an image file.
pub fn create_frame_source(input: &str) -> Result<Box<dyn FrameSource>> {
    if input.starts_with("/dev/video") || input.starts_with("v4l2://") {
        #[cfg(feature = "v4l_input")]
        {
            let device_path = input.trim_start_matches("v4l2://");
            return Ok(Box::new(super::v4l_source::V4lSource::new(device_path)));
        }
        #[cfg(not(feature = "v4l_input"))]
        {
            return Err(MeasureError::DeviceUnavailable(format!(
                "{}: camera support requires the v4l_input feature",
                input
            )));
        }
    }
    Ok(Box::new(ImageFileSource::new(input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_release_is_idempotent() {
        let mut source = SyntheticSource::new(|_| Ok(Frame::Gray(GrayImage::new(2, 2))));
        source.release();
        assert!(matches!(source.read_frame(), Err(MeasureError::DeviceUnavailable(_))));
        source.open().unwrap();
        source.open().unwrap();
        assert!(source.read_frame().is_ok());
        source.release();
        source.release();
        assert!(!source.is_open());
    }

    #[test]
    fn test_missing_image_is_unavailable() {
        let mut source = ImageFileSource::new("/nonexistent/frame.png");
        assert!(matches!(source.open(), Err(MeasureError::DeviceUnavailable(_))));
        assert!(!source.is_open());
        source.release();
    }

    #[test]
    fn test_image_file_source_repeats_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let mut source = ImageFileSource::new(&path);
        source.open().unwrap();
        let first = source.read_frame().unwrap();
        let second = source.read_frame().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dimensions(), (6, 4));
    }
}
