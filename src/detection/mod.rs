pub mod contours;
pub mod preprocessing;
pub mod steps;

use tracing::debug;

use crate::annotate::AnnotatedFrame;
use crate::detection::contours::ContourExtractor;
use crate::error::{MeasureError, Result};
use crate::frame::Frame;
use crate::pipeline::Preprocessor;
use crate::settings::MeasurementSettings;

/// Runs one full measurement pass against a fixed settings snapshot:
/// preprocess, extract regions, apply calibration, annotate.
pub struct Measurer<'a> {
    settings: &'a MeasurementSettings,
}

impl<'a> Measurer<'a> {
    pub fn new(settings: &'a MeasurementSettings) -> Self {
        Self { settings }
    }

    /// Measure a frame. Sizes are reported in physical units when the
    /// snapshot is calibrated and in pixels otherwise.
    pub fn measure(&self, frame: Frame) -> Result<AnnotatedFrame> {
        let stages = Preprocessor::new(&self.settings.pipeline).run(&frame)?;
        let mask = match stages.last() {
            Some(last) => last.require_gray("Contour Extraction")?,
            None => frame.require_gray("Contour Extraction")?,
        };

        let mut regions = ContourExtractor::new(self.settings.min_area).extract(mask);
        self.settings.calibrator.annotate(&mut regions);

        debug!(
            "Measured {} regions ({} stages, calibrated: {})",
            regions.len(),
            stages.len(),
            self.settings.calibrator.is_calibrated()
        );
        Ok(AnnotatedFrame::new(stages, regions))
    }

    /// Like [`measure`](Self::measure), but refuses to run without a
    /// calibration ratio.
    pub fn measure_calibrated(&self, frame: Frame) -> Result<AnnotatedFrame> {
        if !self.settings.calibrator.is_calibrated() {
            return Err(MeasureError::RatioNotSet);
        }
        self.measure(frame)
    }
}
