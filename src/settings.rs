use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::calibration::Calibrator;
use crate::detection::steps::{StepKind, THRESHOLD};
use crate::error::{MeasureError, Result};
use crate::models::Region;
use crate::pipeline::PipelineConfig;

pub const DEFAULT_BINARY_THRESHOLD: u32 = 127;
pub const MAX_BINARY_THRESHOLD: u32 = 255;
pub const DEFAULT_MIN_AREA: u32 = 50;
pub const MAXIMUM_AREA: u32 = 500;
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(30);

/// Everything one measurement pass reads
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSettings {
    pub pipeline: PipelineConfig,
    pub min_area: u32,
    pub cadence: Duration,
    pub calibrator: Calibrator,
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::standard(),
            min_area: DEFAULT_MIN_AREA,
            cadence: DEFAULT_CADENCE,
            calibrator: Calibrator::new(),
        }
    }
}

impl MeasurementSettings {
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_min_area(mut self, min_area: u32) -> Result<Self> {
        self.set_min_area(min_area)?;
        Ok(self)
    }

    pub fn set_min_area(&mut self, min_area: u32) -> Result<()> {
        if min_area > MAXIMUM_AREA {
            return Err(MeasureError::InvalidSetting {
                name: "minimum area",
                reason: format!("{} is outside 0..={}", min_area, MAXIMUM_AREA),
            });
        }
        self.min_area = min_area;
        Ok(())
    }

    /// Live threshold control. Edits the BinaryThreshold step's own parameter;
    /// there is no separate global threshold value.
    pub fn set_binary_threshold(&mut self, threshold: u32) -> Result<()> {
        if threshold > MAX_BINARY_THRESHOLD {
            return Err(MeasureError::InvalidSetting {
                name: "binary threshold",
                reason: format!("{} is outside 0..={}", threshold, MAX_BINARY_THRESHOLD),
            });
        }
        self.pipeline
            .set_parameter(StepKind::BinaryThreshold, THRESHOLD, threshold)
    }

    pub fn set_cadence(&mut self, cadence: Duration) -> Result<()> {
        if cadence.is_zero() {
            return Err(MeasureError::InvalidSetting {
                name: "cadence",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.cadence = cadence;
        Ok(())
    }
}

/// Settings shared between the control path and the stream worker.
///
/// Readers take an immutable snapshot; writers replace the whole value, so a
/// snapshot never observes a half-applied edit.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Arc<MeasurementSettings>>>,
}

impl SharedSettings {
    pub fn new(settings: MeasurementSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn snapshot(&self) -> Arc<MeasurementSettings> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `edit` to a copy of the current settings and publish the copy
    /// only if the edit succeeds.
    pub fn update<T>(&self, edit: impl FnOnce(&mut MeasurementSettings) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = MeasurementSettings::clone(&guard);
        let value = edit(&mut next)?;
        *guard = Arc::new(next);
        Ok(value)
    }

    pub fn append_step<I, K, V>(&self, kind: StepKind, parameters: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.update(|s| s.pipeline.append(kind, parameters))
    }

    pub fn remove_step(&self, index: usize) -> Result<()> {
        self.update(|s| s.pipeline.remove(index).map(|_| ()))
    }

    pub fn move_step_up(&self, index: usize) -> Result<usize> {
        self.update(|s| s.pipeline.move_up(index))
    }

    pub fn move_step_down(&self, index: usize) -> Result<usize> {
        self.update(|s| s.pipeline.move_down(index))
    }

    pub fn set_min_area(&self, min_area: u32) -> Result<()> {
        self.update(|s| s.set_min_area(min_area))?;
        debug!("Minimum area: {}", min_area);
        Ok(())
    }

    pub fn set_binary_threshold(&self, threshold: u32) -> Result<()> {
        self.update(|s| s.set_binary_threshold(threshold))?;
        debug!("Binary threshold: {}", threshold);
        Ok(())
    }

    /// Calibrate from a reference region; the ratio applies to every later pass
    pub fn set_reference(&self, region: &Region, real_width: f64) -> Result<f64> {
        self.update(|s| s.calibrator.set_reference(region, real_width))
    }

    pub fn reset_calibration(&self) {
        // Resetting cannot fail
        let _ = self.update(|s| {
            s.calibrator.reset();
            Ok(())
        });
    }
}
