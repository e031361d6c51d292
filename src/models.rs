use imageproc::point::Point;

/// Axis-aligned bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Build a box from inclusive min/max pixel coordinates
    pub fn from_extent(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// Point-in-rectangle test, inclusive of both edges (`x <= px <= x + width`).
    pub fn contains(&self, px: i64, py: i64) -> bool {
        let (x, y) = (self.x as i64, self.y as i64);
        x <= px && px <= x + self.width as i64 && y <= py && py <= y + self.height as i64
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// Width and height of a region converted to physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSize {
    pub width: f64,
    pub height: f64,
}

/// One connected foreground region found in a binary mask
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Simplified outer boundary; enough points to rebuild the bounding box
    pub boundary: Vec<Point<u32>>,
    pub bbox: BoundingBox,
    /// Foreground pixels enclosed by the outer boundary
    pub pixel_area: u32,
    /// Filled in when a calibration ratio is available for the pass
    pub physical: Option<PhysicalSize>,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.bbox.width
    }

    pub fn height(&self) -> u32 {
        self.bbox.height
    }

    pub fn area(&self) -> u32 {
        self.pixel_area
    }

    pub fn bounding_rect_area(&self) -> u32 {
        self.bbox.area()
    }

    /// `"W x H"` in pixels
    pub fn rect_size(&self) -> String {
        format!("{} x {}", self.bbox.width, self.bbox.height)
    }

    pub fn center(&self) -> (u32, u32) {
        (
            self.bbox.x + self.bbox.width / 2,
            self.bbox.y + self.bbox.height / 2,
        )
    }
}
