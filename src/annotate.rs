use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::frame::Frame;
use crate::models::{BoundingBox, Region};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const SELECTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SELECTED_THICKNESS: i32 = 3;

/// Unit the size labels are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Pixels,
    Millimeters,
}

/// A bounding box with the size label drawn next to it
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBox {
    pub bbox: BoundingBox,
    pub label: String,
}

/// Size label for a region: calibrated when the region carries physical
/// dimensions, raw pixels otherwise.
pub fn size_label(region: &Region) -> String {
    match region.physical {
        Some(size) => format!("{:.1}mm x {:.1}mm", size.width, size.height),
        None => format!("{} x {} px", region.bbox.width, region.bbox.height),
    }
}

/// One row of the measurement table
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub width: f64,
    pub height: f64,
    pub unit: SizeUnit,
    pub area: u32,
    pub bounding_rect_area: u32,
    pub rect_size: String,
}

impl MeasurementRow {
    pub fn from_region(region: &Region) -> Self {
        let (width, height, unit) = match region.physical {
            Some(size) => (size.width, size.height, SizeUnit::Millimeters),
            None => (
                region.bbox.width as f64,
                region.bbox.height as f64,
                SizeUnit::Pixels,
            ),
        };
        Self {
            width,
            height,
            unit,
            area: region.pixel_area,
            bounding_rect_area: region.bounding_rect_area(),
            rect_size: region.rect_size(),
        }
    }
}

/// Everything the display collaborator needs to show one measurement pass
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Preprocessing chain; element 0 is the raw frame, the last is the mask
    pub stages: Vec<Frame>,
    pub regions: Vec<Region>,
    pub boxes: Vec<LabeledBox>,
    pub unit: SizeUnit,
}

impl AnnotatedFrame {
    pub fn new(stages: Vec<Frame>, regions: Vec<Region>) -> Self {
        let boxes = regions
            .iter()
            .map(|region| LabeledBox {
                bbox: region.bbox,
                label: size_label(region),
            })
            .collect();
        let unit = if !regions.is_empty() && regions.iter().all(|r| r.physical.is_some()) {
            SizeUnit::Millimeters
        } else {
            SizeUnit::Pixels
        };
        Self {
            stages,
            regions,
            boxes,
            unit,
        }
    }

    /// The raw captured frame
    pub fn source(&self) -> Option<&Frame> {
        self.stages.first()
    }

    /// The final preprocessing output
    pub fn mask(&self) -> Option<&Frame> {
        self.stages.last()
    }

    pub fn rows(&self) -> Vec<MeasurementRow> {
        self.regions.iter().map(MeasurementRow::from_region).collect()
    }

    /// Draw every box onto a copy of the raw frame
    pub fn render(&self) -> RgbImage {
        let mut canvas = self
            .source()
            .map(Frame::to_rgb)
            .unwrap_or_else(|| RgbImage::new(0, 0));
        for labeled in &self.boxes {
            draw_box(&mut canvas, &labeled.bbox, BOX_COLOR, BOX_THICKNESS);
        }
        canvas
    }

    /// Draw only `selected` onto a copy of the raw frame, highlighted
    pub fn render_selection(&self, selected: &BoundingBox) -> RgbImage {
        let mut canvas = self
            .source()
            .map(Frame::to_rgb)
            .unwrap_or_else(|| RgbImage::new(0, 0));
        draw_box(&mut canvas, selected, SELECTED_COLOR, SELECTED_THICKNESS);
        canvas
    }
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: i32) {
    if canvas.width() == 0 || canvas.height() == 0 {
        return;
    }
    for t in 0..thickness {
        let rect = Rect::at(bbox.x as i32 - t, bbox.y as i32 - t)
            .of_size(bbox.width + 2 * t as u32, bbox.height + 2 * t as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
