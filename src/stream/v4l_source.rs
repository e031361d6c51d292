use std::pin::Pin;

use image::RgbImage;
use tracing::info;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::source::FrameSource;
use crate::error::{MeasureError, Result};
use crate::frame::Frame;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

struct Capturing {
    // Field order matters: the stream borrows the device and must drop first
    stream: Stream<'static>,
    _device: Pin<Box<Device>>,
    width: u32,
    height: u32,
}

/// V4L2 camera delivering YUYV frames, converted to RGB on read
pub struct V4lSource {
    device_path: String,
    capturing: Option<Capturing>,
}

impl V4lSource {
    pub fn new(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            capturing: None,
        }
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> MeasureError {
        MeasureError::DeviceUnavailable(format!("{}: {}", self.device_path, e))
    }

    fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for chunk in yuyv.chunks_exact(4) {
            let u = chunk[1] as f32 - 128.0;
            let v = chunk[3] as f32 - 128.0;
            for y in [chunk[0] as f32, chunk[2] as f32] {
                let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
                let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
                let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
                rgb.extend_from_slice(&[r, g, b]);
            }
        }
        rgb
    }
}

/// Decode one YUYV buffer; a buffer too short for the format is a failed read
fn frame_from_yuyv(path: &str, yuyv: &[u8], width: u32, height: u32) -> Result<Frame> {
    let rgb = V4lSource::yuyv_to_rgb(yuyv, width, height);
    RgbImage::from_raw(width, height, rgb)
        .map(Frame::Color)
        .ok_or_else(|| MeasureError::DeviceUnavailable(format!("{}: short frame buffer", path)))
}

impl FrameSource for V4lSource {
    fn open(&mut self) -> Result<()> {
        if self.capturing.is_some() {
            return Ok(());
        }
        let device = Box::pin(Device::with_path(&self.device_path).map_err(|e| self.unavailable(e))?);

        let mut format = device.format().map_err(|e| self.unavailable(e))?;
        format.width = CAPTURE_WIDTH;
        format.height = CAPTURE_HEIGHT;
        format.fourcc = FourCC::new(b"YUYV");
        let format = device.set_format(&format).map_err(|e| self.unavailable(e))?;

        // SAFETY: the device is pinned on the heap and lives in the same
        // `Capturing` as the stream, which is declared first and so dropped
        // before the device.
        let device_ref: &Device = &device;
        let stream = unsafe {
            let device_ref: &'static Device = std::mem::transmute::<&Device, &'static Device>(device_ref);
            Stream::with_buffers(device_ref, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| self.unavailable(e))?
        };

        info!(
            "Camera opened: {} ({}x{})",
            self.device_path, format.width, format.height
        );
        self.capturing = Some(Capturing {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
        });
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let path = self.device_path.clone();
        let capturing = self
            .capturing
            .as_mut()
            .ok_or_else(|| MeasureError::DeviceUnavailable(format!("{} is not open", path)))?;
        let (buffer, _meta) = capturing
            .stream
            .next()
            .map_err(|e| MeasureError::DeviceUnavailable(format!("{}: {}", path, e)))?;
        frame_from_yuyv(&path, buffer, capturing.width, capturing.height)
    }

    fn release(&mut self) {
        if self.capturing.take().is_some() {
            info!("Camera released: {}", self.device_path);
        }
    }

    fn is_open(&self) -> bool {
        self.capturing.is_some()
    }

    fn describe(&self) -> String {
        format!("camera {}", self.device_path)
    }
}
