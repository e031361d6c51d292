use tracing::info;

use crate::error::{MeasureError, Result};
use crate::models::{PhysicalSize, Region};

/// Holds the physical-units-per-pixel ratio derived from a reference region
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibrator {
    ratio: Option<f64>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibrator with a known ratio (e.g. restored by the caller)
    pub fn with_ratio(ratio: f64) -> Result<Self> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(MeasureError::InvalidWidth(ratio));
        }
        Ok(Self { ratio: Some(ratio) })
    }

    /// Use `region`'s bounding-box width as the reference for `real_width`
    /// physical units. Overwrites any previous ratio.
    pub fn set_reference(&mut self, region: &Region, real_width: f64) -> Result<f64> {
        self.set_reference_width(region.bbox.width, real_width)
    }

    pub fn set_reference_width(&mut self, pixel_width: u32, real_width: f64) -> Result<f64> {
        if !(real_width.is_finite() && real_width > 0.0) {
            return Err(MeasureError::InvalidWidth(real_width));
        }
        if pixel_width == 0 {
            return Err(MeasureError::InvalidWidth(real_width));
        }
        let ratio = real_width / pixel_width as f64;
        self.ratio = Some(ratio);
        info!("Calibrated: 1 px = {:.3} units ({} px = {})", ratio, pixel_width, real_width);
        Ok(ratio)
    }

    pub fn ratio(&self) -> Option<f64> {
        self.ratio
    }

    pub fn is_calibrated(&self) -> bool {
        self.ratio.is_some()
    }

    pub fn reset(&mut self) {
        self.ratio = None;
    }

    pub fn to_physical(&self, pixel_length: f64) -> Result<f64> {
        self.ratio
            .map(|ratio| pixel_length * ratio)
            .ok_or(MeasureError::RatioNotSet)
    }

    /// Bounding-box width and height of `region` in physical units
    pub fn measure(&self, region: &Region) -> Result<PhysicalSize> {
        Ok(PhysicalSize {
            width: self.to_physical(region.bbox.width as f64)?,
            height: self.to_physical(region.bbox.height as f64)?,
        })
    }

    /// Fill in `physical` on every region when a ratio is set
    pub fn annotate(&self, regions: &mut [Region]) {
        for region in regions {
            region.physical = self.measure(region).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn region(width: u32, height: u32) -> Region {
        Region {
            boundary: Vec::new(),
            bbox: BoundingBox { x: 0, y: 0, width, height },
            pixel_area: width * height,
            physical: None,
        }
    }

    #[test]
    fn test_reference_round_trip() {
        let mut calibrator = Calibrator::new();
        let reference = region(40, 20);
        let ratio = calibrator.set_reference(&reference, 100.0).unwrap();
        assert!((ratio - 2.5).abs() < 1e-12);
        assert!((calibrator.to_physical(40.0).unwrap() - 100.0).abs() < 1e-9);
        assert!((calibrator.to_physical(10.0).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_not_set() {
        let calibrator = Calibrator::new();
        assert!(matches!(calibrator.to_physical(5.0), Err(MeasureError::RatioNotSet)));
        assert!(matches!(calibrator.measure(&region(3, 3)), Err(MeasureError::RatioNotSet)));
    }

    #[test]
    fn test_invalid_width_keeps_previous_ratio() {
        let mut calibrator = Calibrator::new();
        calibrator.set_reference(&region(10, 10), 5.0).unwrap();
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                calibrator.set_reference(&region(10, 10), bad),
                Err(MeasureError::InvalidWidth(_))
            ));
        }
        assert_eq!(calibrator.ratio(), Some(0.5));
    }

    #[test]
    fn test_annotate_regions() {
        let mut calibrator = Calibrator::new();
        let mut regions = vec![region(10, 4)];
        calibrator.annotate(&mut regions);
        assert!(regions[0].physical.is_none());

        calibrator.set_reference_width(10, 20.0).unwrap();
        calibrator.annotate(&mut regions);
        assert_eq!(regions[0].physical, Some(PhysicalSize { width: 20.0, height: 8.0 }));
    }
}
