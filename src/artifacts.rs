//! Snapshot and metadata side-channel.
//!
//! Every persisted artifact (clip or snapshot) gets a twin JSON document with
//! the same stem. Filenames carry a millisecond-resolution timestamp plus the
//! detected class and threat tier, so concurrent streams cannot collide.
//!
//! Failures here are the caller's to log; nothing in this module may abort the
//! recording path.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use image::ImageEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::detect::{BoundingBox, ThreatTier};
use crate::frame::{Frame, RGB_CHANNELS};
use crate::record::sink::JPEG_QUALITY;

#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    /// Directory for clips and their metadata sidecars.
    pub clips_dir: PathBuf,
    /// Directory for snapshots and their metadata sidecars.
    pub snapshots_dir: PathBuf,
    /// Probability of persisting a still snapshot at clip start.
    pub snapshot_probability: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            clips_dir: PathBuf::from("logs"),
            snapshots_dir: PathBuf::from("snapshots"),
            snapshot_probability: 0.75,
        }
    }
}

/// Sidecar document for one finished clip. Written once, then immutable.
#[derive(Debug, Serialize)]
pub struct ClipMetadata {
    pub clip: ClipInfo,
    pub trigger: TriggerInfo,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct ClipInfo {
    pub filename: String,
    pub created_at: String,
    pub width: u32,
    pub height: u32,
    pub nominal_fps: u32,
}

#[derive(Debug, Serialize)]
pub struct TriggerInfo {
    pub label: String,
    pub confidence: f32,
    pub threat_tier: ThreatTier,
    pub coordinates: Vec<BoundingBox>,
    pub triggering_detections: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub pre_event_frames: usize,
    pub frames_written: u64,
    pub extensions: u32,
    pub max_concurrent_detections: usize,
}

/// Sidecar document for one snapshot.
#[derive(Debug, Serialize)]
pub struct SnapshotMetadata {
    pub image: ImageInfo,
    pub detection: SnapshotDetection,
    pub context: SnapshotContext,
}

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub filename: String,
    pub captured_at: String,
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub format: String,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct SnapshotDetection {
    pub label: String,
    pub confidence: f32,
    pub threat_tier: ThreatTier,
    pub coordinates: Vec<BoundingBox>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotContext {
    pub nominal_fps: u32,
    pub frame_number: u64,
    pub recording_file: Option<String>,
}

/// Writes snapshots, clips' metadata sidecars and names new clip files.
pub struct ArtifactWriter {
    cfg: ArtifactConfig,
}

impl ArtifactWriter {
    pub fn new(cfg: ArtifactConfig) -> Self {
        Self { cfg }
    }

    /// Create both output directories if absent.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cfg.clips_dir)
            .with_context(|| format!("creating {}", self.cfg.clips_dir.display()))?;
        std::fs::create_dir_all(&self.cfg.snapshots_dir)
            .with_context(|| format!("creating {}", self.cfg.snapshots_dir.display()))?;
        Ok(())
    }

    pub fn snapshot_probability(&self) -> f64 {
        self.cfg.snapshot_probability
    }

    /// Path for a new clip: `clip_<stamp>_s<stream>_<label>_<tier>.mjpeg`.
    pub fn clip_path(
        &self,
        captured_at: SystemTime,
        stream_index: usize,
        label: &str,
        tier: ThreatTier,
    ) -> PathBuf {
        let stamp = artifact_stamp(captured_at);
        self.cfg.clips_dir.join(format!(
            "clip_{}_s{}_{}_{}.mjpeg",
            stamp,
            stream_index,
            sanitize_label(label),
            tier.as_str()
        ))
    }

    /// Persist a still snapshot of `frame` plus its metadata twin.
    pub fn write_snapshot(
        &self,
        frame: &Frame,
        detection: &SnapshotDetection,
        context: SnapshotContext,
    ) -> Result<PathBuf> {
        let stamp = artifact_stamp(frame.captured_at);
        let filename = format!(
            "snapshot_{}_s{}_{}_{}_{:.2}.jpg",
            stamp,
            frame.stream_index,
            sanitize_label(&detection.label),
            detection.threat_tier.as_str(),
            detection.confidence
        );
        let path = self.cfg.snapshots_dir.join(&filename);

        let mut jpeg = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        encoder
            .write_image(
                frame.pixels(),
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .context("encoding snapshot")?;
        std::fs::write(&path, &jpeg)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        log::info!("saved snapshot to {}", path.display());

        let meta = SnapshotMetadata {
            image: ImageInfo {
                filename,
                captured_at: rfc3339(frame.captured_at),
                width: frame.width,
                height: frame.height,
                channels: RGB_CHANNELS,
                format: "jpg".to_string(),
                sha256: hex::encode(Sha256::digest(&jpeg)),
            },
            detection: SnapshotDetection {
                label: detection.label.clone(),
                confidence: detection.confidence,
                threat_tier: detection.threat_tier,
                coordinates: detection.coordinates.clone(),
            },
            context,
        };
        write_sidecar(&path, &meta)?;
        Ok(path)
    }

    /// Write the metadata twin for a finished clip.
    pub fn write_clip_metadata(&self, clip_path: &Path, meta: &ClipMetadata) -> Result<PathBuf> {
        write_sidecar(clip_path, meta)
    }
}

fn write_sidecar<T: Serialize>(artifact_path: &Path, meta: &T) -> Result<PathBuf> {
    let sidecar = artifact_path.with_extension("json");
    let json = serde_json::to_vec_pretty(meta)?;
    std::fs::write(&sidecar, json)
        .with_context(|| format!("writing metadata {}", sidecar.display()))?;
    Ok(sidecar)
}

/// Millisecond-resolution local timestamp stem, e.g. `20260827_141503_217`.
fn artifact_stamp(at: SystemTime) -> String {
    let local: DateTime<Local> = at.into();
    local.format("%Y%m%d_%H%M%S_%3f").to_string()
}

pub(crate) fn rfc3339(at: SystemTime) -> String {
    let utc: DateTime<Utc> = at.into();
    utc.to_rfc3339()
}

/// Keep labels filesystem-safe.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn writer(dir: &Path) -> ArtifactWriter {
        ArtifactWriter::new(ArtifactConfig {
            clips_dir: dir.join("logs"),
            snapshots_dir: dir.join("snapshots"),
            snapshot_probability: 1.0,
        })
    }

    fn test_frame() -> Frame {
        Frame::new(
            vec![200u8; 8 * 8 * 3],
            8,
            8,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            0,
        )
        .unwrap()
    }

    #[test]
    fn snapshot_gets_metadata_twin() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = writer(dir.path());
        writer.ensure_dirs()?;

        let bbox = BoundingBox::new(1.0, 1.0, 6.0, 6.0)?;
        let path = writer.write_snapshot(
            &test_frame(),
            &SnapshotDetection {
                label: "drone".to_string(),
                confidence: 0.91,
                threat_tier: ThreatTier::High,
                coordinates: vec![bbox],
            },
            SnapshotContext {
                nominal_fps: 30,
                frame_number: 42,
                recording_file: Some("clip_x.mjpeg".to_string()),
            },
        )?;

        assert!(path.exists());
        let sidecar = path.with_extension("json");
        assert!(sidecar.exists());

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&sidecar)?)?;
        assert_eq!(json["detection"]["label"], "drone");
        assert_eq!(json["detection"]["threat_tier"], "High");
        assert_eq!(json["context"]["frame_number"], 42);
        assert_eq!(json["image"]["channels"], 3);
        // Checksum matches what was written.
        let written = std::fs::read(&path)?;
        assert_eq!(
            json["image"]["sha256"],
            hex::encode(Sha256::digest(&written))
        );
        Ok(())
    }

    #[test]
    fn clip_paths_encode_label_tier_and_stream() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path());
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let path = writer.clip_path(at, 3, "fixed wing", ThreatTier::Medium);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("clip_"));
        assert!(name.contains("_s3_"));
        assert!(name.contains("fixed_wing"));
        assert!(name.ends_with("_Medium.mjpeg"));
    }

    #[test]
    fn stamps_differ_at_millisecond_resolution() {
        let a = artifact_stamp(UNIX_EPOCH + Duration::from_millis(1_000));
        let b = artifact_stamp(UNIX_EPOCH + Duration::from_millis(1_001));
        assert_ne!(a, b);
    }
}
