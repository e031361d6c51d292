pub mod controller;
pub mod source;
#[cfg(feature = "v4l_input")]
pub mod v4l_source;

pub use controller::{
    DEFAULT_HALT_TIMEOUT, DisplaySink, HaltStatus, MAX_CONSECUTIVE_FAILURES, StreamController,
    stream_active,
};
pub use source::{FrameSource, ImageFileSource, SyntheticSource, create_frame_source};
