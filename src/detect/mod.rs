//! Detection results, threat tiers and the detector seam.
//!
//! The object detector itself is external: anything that can turn a frame into
//! a set of `(label, confidence, bounding box)` detections plugs in behind the
//! `Detector` trait. This module owns what the pipeline does with those
//! results:
//! - `Detection` / `BoundingBox`: validated detection values.
//! - `TierBreakpoints::classify`: pure confidence -> `ThreatTier` mapping.
//! - `TriggerPolicy::is_triggering`: whether a detection may start or sustain
//!   a recording (distinct from, and usually lower than, any display filter).

use anyhow::{anyhow, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::frame::Frame;

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if !(x1 < x2 && y1 < y2) {
            return Err(anyhow!(
                "degenerate bounding box ({}, {}, {}, {})",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// One detection on one frame.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub stream_index: usize,
}

impl Detection {
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
        stream_index: usize,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("confidence {} outside [0, 1]", confidence));
        }
        Ok(Self {
            label: label.into(),
            confidence,
            bbox,
            stream_index,
        })
    }
}

/// Coarse severity label derived from confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ThreatTier {
    Low,
    Medium,
    High,
}

impl ThreatTier {
    /// Label form used in filenames and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatTier::Low => "Low",
            ThreatTier::Medium => "Medium",
            ThreatTier::High => "High",
        }
    }
}

/// The two confidence breakpoints separating Low/Medium/High.
#[derive(Clone, Copy, Debug)]
pub struct TierBreakpoints {
    pub medium: f32,
    pub high: f32,
}

impl Default for TierBreakpoints {
    fn default() -> Self {
        Self {
            medium: 0.65,
            high: 0.8,
        }
    }
}

impl TierBreakpoints {
    pub fn new(medium: f32, high: f32) -> Result<Self> {
        if !(0.0 < medium && medium < high && high <= 1.0) {
            return Err(anyhow!(
                "tier breakpoints must satisfy 0 < medium < high <= 1 (got {} / {})",
                medium,
                high
            ));
        }
        Ok(Self { medium, high })
    }

    /// Deterministic, total over [0, 1].
    pub fn classify(&self, confidence: f32) -> ThreatTier {
        if confidence > self.high {
            ThreatTier::High
        } else if confidence > self.medium {
            ThreatTier::Medium
        } else {
            ThreatTier::Low
        }
    }
}

/// Which detections are eligible to start or sustain a recording.
#[derive(Clone, Copy, Debug)]
pub struct TriggerPolicy {
    pub threshold: f32,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl TriggerPolicy {
    pub fn is_triggering(&self, confidence: f32) -> bool {
        confidence >= self.threshold
    }
}

/// Seam for the external object detector.
pub trait Detector {
    /// Detections for one frame. Zero or more per frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Stub detector: flags frame-to-frame scene change by pixel digest.
///
/// Lets the full pipeline run end-to-end without a model. A changed scene
/// produces one centred detection at a fixed confidence.
pub struct SceneChangeDetector {
    label: String,
    confidence: f32,
    last_digest: Option<[u8; 32]>,
}

impl SceneChangeDetector {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            last_digest: None,
        }
    }
}

impl Detector for SceneChangeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let changed = match self.last_digest {
            Some(prev) => prev != digest,
            None => false,
        };
        self.last_digest = Some(digest);

        if !changed {
            return Ok(vec![]);
        }

        let w = frame.width as f32;
        let h = frame.height as f32;
        let bbox = BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75)?;
        Ok(vec![Detection::new(
            self.label.clone(),
            self.confidence,
            bbox,
            frame.stream_index,
        )?])
    }
}
