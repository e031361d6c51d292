use image::RgbImage;
use tracing::debug;

use crate::annotate::AnnotatedFrame;
use crate::calibration::Calibrator;
use crate::error::{MeasureError, Result};
use crate::models::Region;

/// First region whose bounding box contains the click, edges included.
///
/// This is a bounding-box test, not a point-in-polygon test: a click in the
/// empty corner of an L-shaped region still selects it.
pub fn select_at(regions: &[Region], click_x: i64, click_y: i64) -> Option<&Region> {
    regions
        .iter()
        .find(|region| region.bbox.contains(click_x, click_y))
}

/// Remembers the last frozen pass and which of its regions the user picked
#[derive(Debug, Default)]
pub struct SelectionTracker {
    frozen: Option<AnnotatedFrame>,
    selected: Option<usize>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candidate regions with a freshly frozen pass; clears any
    /// previous selection.
    pub fn commit(&mut self, frozen: AnnotatedFrame) {
        debug!("Selection: {} candidate regions", frozen.regions.len());
        self.frozen = Some(frozen);
        self.selected = None;
    }

    pub fn frozen(&self) -> Option<&AnnotatedFrame> {
        self.frozen.as_ref()
    }

    pub fn regions(&self) -> &[Region] {
        self.frozen
            .as_ref()
            .map(|frozen| frozen.regions.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a click against the frozen regions. A miss clears the selection.
    pub fn select_at(&mut self, click_x: i64, click_y: i64) -> Option<&Region> {
        self.selected = self
            .regions()
            .iter()
            .position(|region| region.bbox.contains(click_x, click_y));
        self.selected()
    }

    pub fn selected(&self) -> Option<&Region> {
        self.selected.and_then(|index| self.regions().get(index))
    }

    /// The frozen frame with the selected region outlined
    pub fn highlighted(&self) -> Option<RgbImage> {
        let frozen = self.frozen.as_ref()?;
        let region = self.selected()?;
        Some(frozen.render_selection(&region.bbox))
    }

    /// Use the selected region as the calibration reference
    pub fn calibrate_selected(&self, calibrator: &mut Calibrator, real_width: f64) -> Result<f64> {
        let region = self.selected().ok_or(MeasureError::NothingSelected)?;
        calibrator.set_reference(region, real_width)
    }

    pub fn clear(&mut self) {
        self.frozen = None;
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::models::BoundingBox;

    fn region(x: u32, y: u32, width: u32, height: u32) -> Region {
        Region {
            boundary: Vec::new(),
            bbox: BoundingBox { x, y, width, height },
            pixel_area: width * height,
            physical: None,
        }
    }

    fn frozen(regions: Vec<Region>) -> AnnotatedFrame {
        AnnotatedFrame::new(vec![Frame::Color(RgbImage::new(100, 100))], regions)
    }

    #[test]
    fn test_select_inside_and_outside() {
        let regions = vec![region(10, 10, 20, 20), region(50, 50, 10, 10)];
        assert_eq!(select_at(&regions, 55, 52), Some(&regions[1]));
        assert_eq!(select_at(&regions, 40, 40), None);
        assert_eq!(select_at(&regions, -1, 10), None);
    }

    #[test]
    fn test_edges_are_inclusive() {
        let regions = vec![region(10, 10, 20, 20)];
        assert!(select_at(&regions, 10, 10).is_some());
        assert!(select_at(&regions, 30, 30).is_some());
        assert!(select_at(&regions, 31, 30).is_none());
    }

    #[test]
    fn test_overlap_returns_first() {
        let regions = vec![region(0, 0, 50, 50), region(10, 10, 5, 5)];
        assert_eq!(select_at(&regions, 12, 12), Some(&regions[0]));
    }

    #[test]
    fn test_tracker_selection_and_calibration() {
        let mut tracker = SelectionTracker::new();
        let mut calibrator = Calibrator::new();
        assert!(matches!(
            tracker.calibrate_selected(&mut calibrator, 10.0),
            Err(MeasureError::NothingSelected)
        ));

        tracker.commit(frozen(vec![region(10, 10, 40, 60)]));
        assert!(tracker.select_at(20, 20).is_some());
        assert!(tracker.highlighted().is_some());
        let ratio = tracker.calibrate_selected(&mut calibrator, 100.0).unwrap();
        assert!((ratio - 2.5).abs() < 1e-12);

        assert!(tracker.select_at(90, 90).is_none());
        assert!(tracker.selected().is_none());
        assert!(tracker.highlighted().is_none());
    }

    #[test]
    fn test_commit_clears_selection() {
        let mut tracker = SelectionTracker::new();
        tracker.commit(frozen(vec![region(0, 0, 10, 10)]));
        tracker.select_at(5, 5);
        tracker.commit(frozen(vec![region(0, 0, 10, 10)]));
        assert!(tracker.selected().is_none());
    }
}
