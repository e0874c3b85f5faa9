//! The frame-processing loop and its shutdown guard.
//!
//! One `Pipeline` owns every per-stream resource: source, detector, ring
//! buffer and recording controller. Frames are processed synchronously, one
//! at a time per stream, in arrival order; stream A's trigger never touches
//! stream B's session.
//!
//! Error taxonomy, per frame:
//! - unreadable frame: skip it, log, keep looping (an open session simply
//!   does not receive that frame);
//! - detector failure: treated as "no detections" for that frame, logged;
//! - sink failures: handled inside the controller (session abandoned);
//! - anything else: ends the loop; open sessions are still finalized.
//!
//! Cancellation is cooperative: a shared stop flag (set by Ctrl-C in the
//! daemon) stops frame intake, after which every open session is finalized
//! exactly once. The controllers also finalize on drop, so no exit path
//! leaves a sink open.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::artifacts::ArtifactWriter;
use crate::config::SentrydConfig;
use crate::detect::{Detection, Detector, SceneChangeDetector};
use crate::frame::{Frame, FrameRing};
use crate::ingest::FrameSource;
use crate::live::LatestFrameSlot;
use crate::record::{MjpegSinkFactory, RecordingController};

/// Stub detector defaults used when no model is plugged in.
const STUB_DETECTOR_LABEL: &str = "drone";
const STUB_DETECTOR_CONFIDENCE: f32 = 0.85;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

struct StreamState {
    source: FrameSource,
    detector: Box<dyn Detector>,
    ring: FrameRing,
    controller: RecordingController,
}

/// Counters reported when the loop ends.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineSummary {
    pub frames_processed: u64,
    pub clips_written: u64,
    pub clips_abandoned: u64,
    pub snapshots_written: u64,
}

pub struct Pipeline {
    streams: Vec<StreamState>,
    slot: LatestFrameSlot,
    stop: Arc<AtomicBool>,
    frames_processed: u64,
    /// Stop after this many frames in total (demo and tests); `None` runs
    /// until the stop flag is raised or a source ends.
    frame_limit: Option<u64>,
    /// Sleep between loop iterations to approximate the nominal rate.
    pacing: Option<Duration>,
}

impl Pipeline {
    /// Wire up sources, detectors, ring buffers and controllers from config.
    pub fn from_config(cfg: &SentrydConfig) -> Result<Self> {
        let artifacts = Arc::new(ArtifactWriter::new(cfg.artifacts.clone()));
        artifacts.ensure_dirs()?;

        let mut streams = Vec::with_capacity(cfg.sources.len());
        for (stream_index, source_cfg) in cfg.sources.iter().enumerate() {
            let source = FrameSource::new(source_cfg.clone(), stream_index)
                .with_context(|| format!("setting up source {}", stream_index))?;
            let ring = FrameRing::new(cfg.recording.buffer_seconds, source_cfg.nominal_fps);
            let controller = RecordingController::new(
                cfg.recorder_config(source_cfg.nominal_fps),
                stream_index,
                Box::new(MjpegSinkFactory),
                artifacts.clone(),
            );
            streams.push(StreamState {
                source,
                detector: Box::new(SceneChangeDetector::new(
                    STUB_DETECTOR_LABEL,
                    STUB_DETECTOR_CONFIDENCE,
                )),
                ring,
                controller,
            });
        }

        Ok(Self {
            streams,
            slot: LatestFrameSlot::new(),
            stop: Arc::new(AtomicBool::new(false)),
            frames_processed: 0,
            frame_limit: None,
            pacing: None,
        })
    }

    /// Shared flag that stops the loop cooperatively when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Slot the loop publishes the most recent frame into.
    pub fn latest_slot(&self) -> LatestFrameSlot {
        self.slot.clone()
    }

    pub fn limit_frames(&mut self, limit: u64) {
        self.frame_limit = Some(limit);
    }

    pub fn pace(&mut self, between_iterations: Duration) {
        self.pacing = Some(between_iterations);
    }

    /// Feed one externally produced (frame, detections) pair for a stream.
    ///
    /// This is the same path `run` drives internally: controller first (the
    /// ring must not yet contain the current frame), then buffer the frame
    /// and publish it to the live slot.
    pub fn process(
        &mut self,
        stream_index: usize,
        frame: Frame,
        detections: &[Detection],
    ) -> Result<()> {
        let state = self
            .streams
            .get_mut(stream_index)
            .with_context(|| format!("no stream {}", stream_index))?;
        state
            .controller
            .on_frame(&frame, detections, &state.ring)?;
        self.slot.publish(&frame);
        state.ring.push(frame);
        self.frames_processed += 1;
        Ok(())
    }

    /// Run until the stop flag, the frame limit, or a fatal fault.
    ///
    /// Open sessions are finalized on every exit path before this returns.
    pub fn run(&mut self) -> Result<PipelineSummary> {
        let result = self.run_loop();
        self.finalize_all();
        match result {
            Ok(()) => Ok(self.summary()),
            Err(e) => {
                log::error!("frame processing aborted: {:#}", e);
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<()> {
        for state in &mut self.streams {
            state.source.connect()?;
        }

        let mut last_health_log = Instant::now();
        'outer: loop {
            if self.stop.load(Ordering::SeqCst) {
                log::info!("stop requested, ending frame intake");
                break;
            }
            if let Some(limit) = self.frame_limit {
                if self.frames_processed >= limit {
                    break;
                }
            }

            for idx in 0..self.streams.len() {
                if self.stop.load(Ordering::SeqCst) {
                    break 'outer;
                }
                let state = &mut self.streams[idx];

                let frame = match state.source.next_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("stream {}: unreadable frame skipped: {:#}", idx, e);
                        continue;
                    }
                };

                let detections = match state.detector.detect(&frame) {
                    Ok(detections) => detections,
                    Err(e) => {
                        log::warn!("stream {}: detector failed on frame: {:#}", idx, e);
                        Vec::new()
                    }
                };

                state
                    .controller
                    .on_frame(&frame, &detections, &state.ring)?;
                self.slot.publish(&frame);
                state.ring.push(frame);
                self.frames_processed += 1;
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                for (idx, state) in self.streams.iter().enumerate() {
                    let stats = state.source.stats();
                    log::info!(
                        "stream {} health={} frames={} url={}",
                        idx,
                        state.source.is_healthy(),
                        stats.frames_captured,
                        stats.url
                    );
                }
                last_health_log = Instant::now();
            }

            if let Some(pacing) = self.pacing {
                std::thread::sleep(pacing);
            }
        }
        Ok(())
    }

    /// Finalize every open session. Idempotent; also reached via each
    /// controller's drop guard if this is never called.
    pub fn finalize_all(&mut self) {
        for state in &mut self.streams {
            state.controller.finalize_open_session();
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        let mut summary = PipelineSummary {
            frames_processed: self.frames_processed,
            ..PipelineSummary::default()
        };
        for state in &self.streams {
            let stats = state.controller.stats();
            summary.clips_written += stats.clips_written;
            summary.clips_abandoned += stats.clips_abandoned;
            summary.snapshots_written += stats.snapshots_written;
        }
        summary
    }
}
