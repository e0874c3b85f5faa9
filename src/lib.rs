//! Event-triggered clip recording for camera streams.
//!
//! This crate implements the recording core of a camera sentry: streams are
//! watched continuously, but footage is only persisted around moments a
//! detector flags something worth keeping.
//!
//! # Architecture
//!
//! - A bounded ring buffer per stream holds the last few seconds of frames,
//!   so every clip starts with pre-event context.
//! - A detector (external model behind the `Detector` trait) produces scored
//!   detections per frame; a confidence threshold decides which of them may
//!   trigger or sustain a recording.
//! - A per-stream recording state machine opens a clip sink on a trigger,
//!   seeds it from the ring buffer, appends every subsequent frame, and
//!   counts down a post-detection window. Fresh triggers near expiry extend
//!   the clip instead of starting a new one.
//! - Finalized clips get an immutable JSON metadata sidecar; triggering
//!   frames are probabilistically captured as still snapshots with their own
//!   checksummed metadata twin.
//! - A latest-frame slot and a small HTTP API expose the live view without
//!   touching the recording path.
//!
//! # Module Structure
//!
//! - `frame`: frames and the pre-event ring buffer
//! - `ingest`: frame sources (synthetic `stub://` generator)
//! - `detect`: detections, threat tiers, trigger policy, detector seam
//! - `record`: clip sinks and the recording controller
//! - `artifacts`: clip/snapshot paths, metadata sidecars, checksums
//! - `live` / `api`: latest-frame slot and the HTTP endpoint over it
//! - `pipeline`: the per-stream processing loop and shutdown guard
//! - `config`: daemon configuration (file, env, validation)

pub mod api;
pub mod artifacts;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod live;
pub mod pipeline;
pub mod record;

pub use api::{ApiConfig, ApiHandle, LiveApiServer};
pub use artifacts::{ArtifactConfig, ArtifactWriter, ClipMetadata, SnapshotMetadata};
pub use config::{RecordingSettings, SentrydConfig};
pub use detect::{
    BoundingBox, Detection, Detector, SceneChangeDetector, ThreatTier, TierBreakpoints,
    TriggerPolicy,
};
pub use frame::{Frame, FrameRing, RGB_CHANNELS};
pub use ingest::{FrameSource, SourceConfig, SourceStats};
pub use live::LatestFrameSlot;
pub use pipeline::{Pipeline, PipelineSummary};
pub use record::{
    ClipSink, MjpegSink, MjpegSinkFactory, RecorderConfig, RecorderStats, RecordingController,
    SinkFactory,
};
