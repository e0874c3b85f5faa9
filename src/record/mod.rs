//! Recording lifecycle: clip sinks and the per-stream controller.

pub mod controller;
pub mod sink;

pub use controller::{RecorderConfig, RecorderStats, RecordingController};
pub use sink::{ClipSink, MjpegSink, MjpegSinkFactory, SinkFactory};
