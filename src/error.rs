use thiserror::Error;

use crate::detection::steps::StepKind;

/// Errors reported by the measurement core
#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("step '{0}' is already in the pipeline")]
    DuplicateStep(StepKind),

    #[error("step index {index} is out of range (pipeline has {len} steps)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{stage} expects {expected}-channel input, got {actual} channel(s)")]
    UnsupportedChannelCount {
        stage: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("invalid value '{value}' for {step} parameter '{name}': {reason}")]
    InvalidParameter {
        step: StepKind,
        name: String,
        value: String,
        reason: &'static str,
    },

    #[error("unknown preprocessing step '{0}'")]
    UnknownStep(String),

    #[error("{0} is not configured in the pipeline")]
    StepNotConfigured(StepKind),

    #[error("invalid {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("reference width must be a positive number, got {0}")]
    InvalidWidth(f64),

    #[error("pixel-to-unit ratio has not been calibrated")]
    RatioNotSet,

    #[error("no region is selected")]
    NothingSelected,

    #[error("a stream session is already active")]
    AlreadyActive,

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("measurement cycle aborted: {0}")]
    CycleAborted(String),

    #[error("stream stopped after {failures} consecutive failed cycles: {cause}")]
    SessionFailed {
        failures: u32,
        cause: Box<MeasureError>,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MeasureError>;
