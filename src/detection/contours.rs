use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use crate::models::{BoundingBox, Region};

/// Finds external contours in a binary mask and turns them into measured regions
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourExtractor {
    pub min_area: u32,
}

impl ContourExtractor {
    pub fn new(min_area: u32) -> Self {
        Self { min_area }
    }

    pub fn extract(&self, mask: &GrayImage) -> Vec<Region> {
        find_regions(mask, self.min_area)
    }
}

/// Find outermost foreground regions in a mask; non-zero samples are foreground.
///
/// Nested boundaries are not reported, but foreground pixels inside holes of
/// a region count toward that region's area. Regions with fewer than
/// `min_area` pixels are dropped. Results are in raster-scan discovery order.
pub fn find_regions(mask: &GrayImage, min_area: u32) -> Vec<Region> {
    let binary = binarize(mask);
    let contours: Vec<Contour<u32>> = find_contours(&binary);
    if contours.is_empty() {
        return Vec::new();
    }

    // Pixel counts per connected component (same 8-connectivity as the tracer)
    let labeled = connected_components(&binary, Connectivity::Eight, Luma([0u8]));
    let mut counts: Vec<u32> = Vec::new();
    for label in labeled.pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if counts.len() <= label {
            counts.resize(label + 1, 0);
        }
        counts[label] += 1;
    }

    // Every component has exactly one outer border; credit its pixels to the
    // outermost contour that encloses it.
    let mut areas = vec![0u32; contours.len()];
    for (index, contour) in contours.iter().enumerate() {
        if !matches!(contour.border_type, BorderType::Outer) {
            continue;
        }
        let Some(start) = contour.points.first() else {
            continue;
        };
        let label = labeled.get_pixel(start.x, start.y)[0] as usize;
        let pixels = counts.get(label).copied().unwrap_or(0);
        areas[outermost_ancestor(&contours, index)] += pixels;
    }

    let regions: Vec<Region> = contours
        .iter()
        .enumerate()
        .filter(|(_, contour)| {
            matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
        })
        .filter_map(|(index, contour)| {
            let bbox = bounding_box(&contour.points)?;
            Some(Region {
                boundary: simplify_boundary(&contour.points),
                bbox,
                pixel_area: areas[index],
                physical: None,
            })
        })
        .filter(|region| region.pixel_area >= min_area)
        .collect();

    debug!(
        "Found {} regions (from {} contours, min area {})",
        regions.len(),
        contours.len(),
        min_area
    );
    regions
}

fn binarize(mask: &GrayImage) -> GrayImage {
    let mut binary = mask.clone();
    for pixel in binary.pixels_mut() {
        if pixel[0] != 0 {
            pixel[0] = 255;
        }
    }
    binary
}

fn outermost_ancestor(contours: &[Contour<u32>], mut index: usize) -> usize {
    while let Some(parent) = contours[index].parent {
        index = parent;
    }
    index
}

fn bounding_box(points: &[Point<u32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::from_extent(min_x, min_y, max_x, max_y))
}

/// Keep only the points where the boundary changes direction, so straight
/// horizontal, vertical and diagonal runs collapse to their end points.
pub fn simplify_boundary(points: &[Point<u32>]) -> Vec<Point<u32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let step = |a: &Point<u32>, b: &Point<u32>| {
        (b.x as i64 - a.x as i64, b.y as i64 - a.y as i64)
    };

    points
        .iter()
        .enumerate()
        .filter(|&(i, point)| {
            let prev = &points[(i + n - 1) % n];
            let next = &points[(i + 1) % n];
            step(prev, point) != step(point, next)
        })
        .map(|(_, point)| *point)
        .collect()
}
