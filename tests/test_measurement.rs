mod common;

use caliper::selection::select_at;
use caliper::{Calibrator, Measurer, SelectionTracker, SizeUnit};
use common::*;

fn mask_settings() -> MeasurementSettings {
    MeasurementSettings::default().with_pipeline(mask_pipeline())
}

#[test]
fn test_uncalibrated_reports_pixels() -> anyhow::Result<()> {
    let settings = mask_settings();
    let annotated = Measurer::new(&settings).measure(rect_frame())?;

    assert_eq!(annotated.unit, SizeUnit::Pixels);
    assert_eq!(annotated.boxes.len(), 1);
    assert_eq!(annotated.boxes[0].label, "40 x 60 px");
    let rows = annotated.rows();
    assert_eq!(rows[0].area, 2400);
    assert_eq!(rows[0].rect_size, "40 x 60");

    assert!(matches!(
        Measurer::new(&settings).measure_calibrated(rect_frame()),
        Err(MeasureError::RatioNotSet)
    ));
    Ok(())
}

#[test]
fn test_calibration_applies_to_other_regions() -> anyhow::Result<()> {
    let frame = frame_with_rects(&[(RECT_X, RECT_Y, RECT_WIDTH, RECT_HEIGHT), (90, 30, 10, 20)]);
    let mut settings = mask_settings();
    let first = Measurer::new(&settings).measure(frame.clone())?;
    assert_eq!(first.regions.len(), 2);

    let reference = select_at(&first.regions, 50, 50).expect("reference region");
    let ratio = settings.calibrator.set_reference(reference, 100.0)?;
    assert!((ratio - 2.5).abs() < 1e-12);

    let second = Measurer::new(&settings).measure_calibrated(frame)?;
    assert_eq!(second.unit, SizeUnit::Millimeters);
    let small = select_at(&second.regions, 95, 35).expect("small region");
    let size = small.physical.expect("calibrated size");
    assert!((size.width - 25.0).abs() < 1e-9);
    assert!((size.height - 50.0).abs() < 1e-9);

    let labels: Vec<_> = second.boxes.iter().map(|b| b.label.as_str()).collect();
    assert!(labels.contains(&"100.0mm x 150.0mm"));
    assert!(labels.contains(&"25.0mm x 50.0mm"));
    Ok(())
}

#[test]
fn test_invalid_reference_width_keeps_ratio() -> anyhow::Result<()> {
    let mut calibrator = Calibrator::with_ratio(2.0)?;
    let settings = mask_settings();
    let annotated = Measurer::new(&settings).measure(rect_frame())?;

    for width in [0.0, -5.0, f64::NAN] {
        assert!(matches!(
            calibrator.set_reference(&annotated.regions[0], width),
            Err(MeasureError::InvalidWidth(_))
        ));
    }
    assert_eq!(calibrator.ratio(), Some(2.0));
    Ok(())
}

#[test]
fn test_freeze_select_calibrate_flow() -> anyhow::Result<()> {
    let shared = SharedSettings::new(mask_settings());
    let mut tracker = SelectionTracker::new();
    tracker.commit(Measurer::new(&shared.snapshot()).measure(rect_frame())?);

    assert!(tracker.select_at(5, 5).is_none());
    assert!(matches!(
        shared.update(|s| tracker.calibrate_selected(&mut s.calibrator, 100.0)),
        Err(MeasureError::NothingSelected)
    ));
    assert!(!shared.snapshot().calibrator.is_calibrated());

    let selected = tracker.select_at(RECT_X as i64, RECT_Y as i64).cloned();
    assert_eq!(selected.map(|r| r.bbox.width), Some(RECT_WIDTH));
    shared.update(|s| tracker.calibrate_selected(&mut s.calibrator, 100.0))?;

    let remeasured = Measurer::new(&shared.snapshot()).measure(rect_frame())?;
    assert_eq!(remeasured.boxes[0].label, "100.0mm x 150.0mm");
    Ok(())
}

#[test]
fn test_threshold_control_changes_mask() -> anyhow::Result<()> {
    // Gray level 100 is foreground at threshold 90 and background at 127
    let frame = Frame::Color(image::RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
        let inside = (10..50).contains(&x) && (10..40).contains(&y);
        if inside { image::Rgb([100, 100, 100]) } else { image::Rgb([0, 0, 0]) }
    }));
    let shared = SharedSettings::new(mask_settings());
    assert!(Measurer::new(&shared.snapshot()).measure(frame.clone())?.regions.is_empty());

    shared.set_binary_threshold(90)?;
    let regions = Measurer::new(&shared.snapshot()).measure(frame)?.regions;
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].area(), 1200);
    Ok(())
}

#[test]
fn test_min_area_filters_small_regions() -> anyhow::Result<()> {
    let frame = frame_with_rects(&[(RECT_X, RECT_Y, RECT_WIDTH, RECT_HEIGHT), (100, 5, 5, 5)]);
    let shared = SharedSettings::new(mask_settings());
    shared.set_min_area(0)?;
    assert_eq!(Measurer::new(&shared.snapshot()).measure(frame.clone())?.regions.len(), 2);
    shared.set_min_area(50)?;
    assert_eq!(Measurer::new(&shared.snapshot()).measure(frame)?.regions.len(), 1);
    Ok(())
}
