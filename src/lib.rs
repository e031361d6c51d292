pub mod annotate;
pub mod calibration;
pub mod detection;
pub mod error;
pub mod frame;
pub mod models;
pub mod pipeline;
pub mod selection;
pub mod settings;
pub mod stream;

pub use annotate::{AnnotatedFrame, LabeledBox, MeasurementRow, SizeUnit};
pub use calibration::Calibrator;
pub use detection::Measurer;
pub use detection::contours::ContourExtractor;
pub use detection::steps::{ConfiguredStep, StepCatalog, StepKind};
pub use error::{MeasureError, Result};
pub use frame::Frame;
pub use models::{BoundingBox, PhysicalSize, Region};
pub use pipeline::{PipelineConfig, Preprocessor};
pub use selection::SelectionTracker;
pub use settings::{MeasurementSettings, SharedSettings};
pub use stream::{DisplaySink, FrameSource, HaltStatus, StreamController};
