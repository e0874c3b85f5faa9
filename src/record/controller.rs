//! Recording state machine.
//!
//! One `RecordingController` per stream. Two states: Idle (no session) and
//! Recording (open session with a countdown). Evaluated once per processed
//! frame, in arrival order:
//!
//! - Idle -> Recording when a detection meets the trigger threshold. The new
//!   sink is seeded with the stream's ring buffer (oldest first); the
//!   triggering frame itself is appended through the normal recording path.
//! - While recording, every frame is appended and decrements the countdown,
//!   detections or not.
//! - Near expiry, a fresh trigger inside the extension window resets the
//!   countdown instead of letting the clip end. Both conditions must hold:
//!   time remaining at or below the window, and a trigger at most one window
//!   ago. This keeps a clip alive while a subject is continuously present
//!   without letting a single burst record forever.
//! - Countdown at zero finalizes the sink and writes the clip's metadata
//!   sidecar, which is immutable from then on.
//!
//! Sink failures abandon the session (back to Idle, no retry); the next
//! trigger starts fresh. Side-channel failures (snapshot, metadata) are
//! logged and never touch the recording path.
//!
//! Time is keyed off frame capture timestamps, not wall-clock reads, so the
//! transitions are deterministic for any given frame sequence.

use anyhow::Result;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use crate::artifacts::{
    ArtifactWriter, ClipInfo, ClipMetadata, SessionInfo, SnapshotContext, SnapshotDetection,
    TriggerInfo,
};
use crate::detect::{BoundingBox, Detection, ThreatTier, TierBreakpoints, TriggerPolicy};
use crate::frame::{Frame, FrameRing};
use crate::record::sink::{ClipSink, SinkFactory};

/// Tunables for the recording state machine.
#[derive(Clone, Copy, Debug)]
pub struct RecorderConfig {
    /// Nominal frame rate; drives every frames-to-seconds conversion.
    pub nominal_fps: u32,
    /// Seconds to keep recording after a trigger.
    pub post_detection_secs: u32,
    /// Seconds the countdown is reset to when an extension fires.
    pub extension_secs: u32,
    /// Trailing window near expiry in which a fresh trigger extends the clip.
    pub extension_window_secs: u32,
    pub trigger: TriggerPolicy,
    pub tiers: TierBreakpoints,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            nominal_fps: 30,
            post_detection_secs: 7,
            extension_secs: 7,
            extension_window_secs: 2,
            trigger: TriggerPolicy::default(),
            tiers: TierBreakpoints::default(),
        }
    }
}

/// Counters for one controller's lifetime.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecorderStats {
    pub frames_seen: u64,
    pub clips_written: u64,
    pub clips_abandoned: u64,
    pub snapshots_written: u64,
}

/// Mutable state of one open clip.
struct RecordingSession {
    sink: Box<dyn ClipSink>,
    output_path: PathBuf,
    frames_remaining: u32,
    started_at: SystemTime,
    last_trigger_at: SystemTime,
    frames_written: u64,
    pre_event_frames: usize,
    extensions: u32,
    max_concurrent_detections: usize,
    width: u32,
    height: u32,
    trigger_label: String,
    trigger_confidence: f32,
    trigger_tier: ThreatTier,
    trigger_coordinates: Vec<BoundingBox>,
    triggering_detections: usize,
}

pub struct RecordingController {
    cfg: RecorderConfig,
    stream_index: usize,
    sinks: Box<dyn SinkFactory>,
    artifacts: Arc<ArtifactWriter>,
    session: Option<RecordingSession>,
    stats: RecorderStats,
}

impl RecordingController {
    pub fn new(
        cfg: RecorderConfig,
        stream_index: usize,
        sinks: Box<dyn SinkFactory>,
        artifacts: Arc<ArtifactWriter>,
    ) -> Self {
        Self {
            cfg,
            stream_index,
            sinks,
            artifacts,
            session: None,
            stats: RecorderStats::default(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn frames_remaining(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.frames_remaining)
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Evaluate one frame together with its detections.
    ///
    /// `ring` is the stream's pre-event buffer as of this frame, i.e. the
    /// current frame has not been pushed into it yet; the caller pushes it
    /// after this returns.
    pub fn on_frame(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
        ring: &FrameRing,
    ) -> Result<()> {
        self.stats.frames_seen += 1;
        let now = frame.captured_at;

        let triggering: Vec<&Detection> = detections
            .iter()
            .filter(|d| self.cfg.trigger.is_triggering(d.confidence))
            .collect();

        if !triggering.is_empty() {
            match &mut self.session {
                Some(session) => {
                    session.last_trigger_at = now;
                    session.max_concurrent_detections =
                        session.max_concurrent_detections.max(triggering.len());
                }
                None => self.start_session(frame, &triggering, ring),
            }
        }

        let Some(session) = &mut self.session else {
            return Ok(());
        };

        // Every frame while active is appended, detection or not.
        if let Err(e) = session.sink.write_frame(frame) {
            log::error!(
                "stream {}: clip write failed, abandoning session: {:#}",
                self.stream_index,
                e
            );
            self.abandon_session();
            return Ok(());
        }
        session.frames_written += 1;
        session.frames_remaining = session.frames_remaining.saturating_sub(1);

        // Extension: both proximity-to-expiry and trigger recency must hold.
        let fps = self.cfg.nominal_fps.max(1);
        let remaining_secs = session.frames_remaining as f64 / fps as f64;
        let since_trigger = now
            .duration_since(session.last_trigger_at)
            .unwrap_or_default()
            .as_secs_f64();
        let window = self.cfg.extension_window_secs as f64;
        if remaining_secs <= window && since_trigger <= window {
            session.frames_remaining = self.cfg.extension_secs * fps;
            session.extensions += 1;
            log::info!(
                "stream {}: extending recording by {}s (last trigger {:.1}s ago)",
                self.stream_index,
                self.cfg.extension_secs,
                since_trigger
            );
        }

        log::debug!(
            "stream {}: recording, {:.1}s remaining",
            self.stream_index,
            session.frames_remaining as f64 / fps as f64
        );

        if session.frames_remaining == 0 {
            self.finalize_open_session();
        }
        Ok(())
    }

    /// Idle -> Recording. Failures here are logged and leave the controller
    /// Idle; the next trigger may try again.
    fn start_session(&mut self, frame: &Frame, triggering: &[&Detection], ring: &FrameRing) {
        let primary = triggering
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .expect("start_session requires at least one triggering detection");
        let tier = self.cfg.tiers.classify(primary.confidence);
        let path = self.artifacts.clip_path(
            frame.captured_at,
            self.stream_index,
            &primary.label,
            tier,
        );

        let mut sink = match self.sinks.create(&path, frame.width, frame.height, self.cfg.nominal_fps)
        {
            Ok(sink) => sink,
            Err(e) => {
                log::error!(
                    "stream {}: could not open clip sink {}: {:#}",
                    self.stream_index,
                    path.display(),
                    e
                );
                return;
            }
        };

        // Pre-event context, oldest first.
        let pre_event_frames = ring.len();
        for buffered in ring.drain_ordered() {
            if let Err(e) = sink.write_frame(buffered) {
                log::error!(
                    "stream {}: pre-event write failed, abandoning clip {}: {:#}",
                    self.stream_index,
                    path.display(),
                    e
                );
                if let Err(e) = sink.finalize() {
                    log::warn!("finalize of abandoned sink failed: {:#}", e);
                }
                self.stats.clips_abandoned += 1;
                return;
            }
        }

        log::info!(
            "stream {}: {} detected (confidence {:.2}, tier {}), recording to {}",
            self.stream_index,
            primary.label,
            primary.confidence,
            tier.as_str(),
            path.display()
        );

        self.session = Some(RecordingSession {
            sink,
            output_path: path.clone(),
            frames_remaining: self.cfg.post_detection_secs * self.cfg.nominal_fps.max(1),
            started_at: frame.captured_at,
            last_trigger_at: frame.captured_at,
            frames_written: pre_event_frames as u64,
            pre_event_frames,
            extensions: 0,
            max_concurrent_detections: triggering.len(),
            width: frame.width,
            height: frame.height,
            trigger_label: primary.label.clone(),
            trigger_confidence: primary.confidence,
            trigger_tier: tier,
            trigger_coordinates: triggering.iter().map(|d| d.bbox).collect(),
            triggering_detections: triggering.len(),
        });

        self.maybe_snapshot(frame, triggering, tier, &path);
    }

    /// Probabilistic still snapshot of the triggering frame. Isolated side
    /// channel: failure is logged and recording proceeds.
    fn maybe_snapshot(
        &mut self,
        frame: &Frame,
        triggering: &[&Detection],
        tier: ThreatTier,
        clip_path: &std::path::Path,
    ) {
        let p = self.artifacts.snapshot_probability();
        if p <= 0.0 || (p < 1.0 && !rand::thread_rng().gen_bool(p)) {
            return;
        }
        let primary = triggering
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .expect("snapshot requires at least one triggering detection");
        let detection = SnapshotDetection {
            label: primary.label.clone(),
            confidence: primary.confidence,
            threat_tier: tier,
            coordinates: triggering.iter().map(|d| d.bbox).collect(),
        };
        let context = SnapshotContext {
            nominal_fps: self.cfg.nominal_fps,
            frame_number: self.stats.frames_seen,
            recording_file: clip_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        };
        match self.artifacts.write_snapshot(frame, &detection, context) {
            Ok(_) => self.stats.snapshots_written += 1,
            Err(e) => log::warn!(
                "stream {}: snapshot failed (recording unaffected): {:#}",
                self.stream_index,
                e
            ),
        }
    }

    /// Recording -> Idle, abandoning the clip without metadata.
    fn abandon_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.sink.finalize() {
                log::warn!(
                    "finalize of abandoned clip {} failed: {:#}",
                    session.output_path.display(),
                    e
                );
            }
            self.stats.clips_abandoned += 1;
        }
    }

    /// Finalize the open session, if any. Exactly one finalization happens per
    /// session; calling this again afterwards is a no-op. Used both by the
    /// countdown and by the shutdown path.
    pub fn finalize_open_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Err(e) = session.sink.finalize() {
            log::error!(
                "finalizing clip {} failed, marking abandoned: {:#}",
                session.output_path.display(),
                e
            );
            self.stats.clips_abandoned += 1;
            return;
        }
        self.stats.clips_written += 1;
        log::info!(
            "stream {}: recording saved: {} ({} frames, {} extensions)",
            self.stream_index,
            session.output_path.display(),
            session.frames_written,
            session.extensions
        );

        let meta = ClipMetadata {
            clip: ClipInfo {
                filename: session
                    .output_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                created_at: crate::artifacts::rfc3339(session.started_at),
                width: session.width,
                height: session.height,
                nominal_fps: self.cfg.nominal_fps,
            },
            trigger: TriggerInfo {
                label: session.trigger_label,
                confidence: session.trigger_confidence,
                threat_tier: session.trigger_tier,
                coordinates: session.trigger_coordinates,
                triggering_detections: session.triggering_detections,
            },
            session: SessionInfo {
                pre_event_frames: session.pre_event_frames,
                frames_written: session.frames_written,
                extensions: session.extensions,
                max_concurrent_detections: session.max_concurrent_detections,
            },
        };
        if let Err(e) = self
            .artifacts
            .write_clip_metadata(&session.output_path, &meta)
        {
            log::warn!(
                "clip metadata for {} failed (clip intact): {:#}",
                session.output_path.display(),
                e
            );
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        // Last line of defense; the pipeline normally finalizes explicitly.
        self.finalize_open_session();
    }
}
