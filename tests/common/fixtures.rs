use std::sync::{Mutex, MutexGuard, PoisonError};

use caliper::{AnnotatedFrame, DisplaySink, Frame, MeasureError};
use image::{Rgb, RgbImage};
use tempfile::NamedTempFile;

pub const FRAME_WIDTH: u32 = 120;
pub const FRAME_HEIGHT: u32 = 100;

/// Where the reference rectangle sits in `rect_frame`
pub const RECT_X: u32 = 30;
pub const RECT_Y: u32 = 20;
pub const RECT_WIDTH: u32 = 40;
pub const RECT_HEIGHT: u32 = 60;

/// A black frame with white rectangles given as (x, y, width, height)
pub fn frame_with_rects(rects: &[(u32, u32, u32, u32)]) -> Frame {
    let image = RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |px, py| {
        let inside = rects
            .iter()
            .any(|&(x, y, w, h)| px >= x && px < x + w && py >= y && py < y + h);
        if inside { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
    });
    Frame::Color(image)
}

/// A black frame with one 40x60 white rectangle
pub fn rect_frame() -> Frame {
    frame_with_rects(&[(RECT_X, RECT_Y, RECT_WIDTH, RECT_HEIGHT)])
}

/// Writes `frame` as a PNG temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image(frame: &Frame) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    frame
        .to_rgb()
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Gray conversion, threshold 127, close with kernel 5
pub fn mask_pipeline() -> caliper::PipelineConfig {
    caliper::PipelineConfig::from_step_list("gray,threshold:127,close:5")
        .expect("Failed to build mask pipeline")
}

/// Display sink that records everything it is given
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<AnnotatedFrame>>,
    halts: Mutex<Vec<Option<String>>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<AnnotatedFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    /// One entry per ended session; `Some` carries the fatal cause
    pub fn halts(&self) -> Vec<Option<String>> {
        self.halts.lock().unwrap().clone()
    }
}

impl DisplaySink for RecordingSink {
    fn publish(&self, frame: AnnotatedFrame) {
        self.frames.lock().unwrap().push(frame);
    }

    fn stream_halted(&self, cause: Option<&MeasureError>) {
        self.halts.lock().unwrap().push(cause.map(|e| e.to_string()));
    }
}

static STREAM_TESTS: Mutex<()> = Mutex::new(());

/// Only one stream may run per process; stream tests hold this to run serially
pub fn serial_stream() -> MutexGuard<'static, ()> {
    STREAM_TESTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll `condition` every 5 ms until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    condition()
}
