#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from caliper for tests
pub use caliper::{
    AnnotatedFrame, DisplaySink, Frame, MeasureError, MeasurementSettings, PipelineConfig,
    Region, SharedSettings, StepKind, StreamController,
};
