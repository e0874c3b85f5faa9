use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::artifacts::ArtifactConfig;
use crate::detect::{TierBreakpoints, TriggerPolicy};
use crate::ingest::SourceConfig;
use crate::record::RecorderConfig;

const DEFAULT_SOURCE_URL: &str = "stub://front_camera";
const DEFAULT_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_BUFFER_SECS: u32 = 15;
const DEFAULT_POST_DETECTION_SECS: u32 = 7;
const DEFAULT_EXTENSION_SECS: u32 = 7;
const DEFAULT_EXTENSION_WINDOW_SECS: u32 = 2;
const DEFAULT_TRIGGER_THRESHOLD: f32 = 0.5;
const DEFAULT_TIER_MEDIUM: f32 = 0.65;
const DEFAULT_TIER_HIGH: f32 = 0.8;
const DEFAULT_SNAPSHOT_PROBABILITY: f64 = 0.75;
const DEFAULT_CLIPS_DIR: &str = "logs";
const DEFAULT_SNAPSHOTS_DIR: &str = "snapshots";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8799";

#[derive(Debug, Deserialize, Default)]
struct SentrydConfigFile {
    sources: Option<Vec<SourceConfigFile>>,
    recording: Option<RecordingConfigFile>,
    artifacts: Option<ArtifactsConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    buffer_seconds: Option<u32>,
    post_detection_seconds: Option<u32>,
    extension_seconds: Option<u32>,
    extension_window_seconds: Option<u32>,
    trigger_threshold: Option<f32>,
    tier_medium: Option<f32>,
    tier_high: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ArtifactsConfigFile {
    clips_dir: Option<String>,
    snapshots_dir: Option<String>,
    snapshot_probability: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SentrydConfig {
    pub sources: Vec<SourceConfig>,
    pub recording: RecordingSettings,
    pub artifacts: ArtifactConfig,
    pub api_addr: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordingSettings {
    /// Seconds of pre-event context held in each stream's ring buffer.
    pub buffer_seconds: u32,
    pub post_detection_secs: u32,
    pub extension_secs: u32,
    pub extension_window_secs: u32,
    pub trigger_threshold: f32,
    pub tier_medium: f32,
    pub tier_high: f32,
}

impl SentrydConfig {
    /// Load from the JSON file named by `SENTRY_CONFIG` (if set), then apply
    /// environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentrydConfigFile) -> Self {
        let sources = match file.sources {
            Some(entries) if !entries.is_empty() => entries
                .into_iter()
                .map(|entry| SourceConfig {
                    url: entry.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                    nominal_fps: entry.fps.unwrap_or(DEFAULT_FPS),
                    width: entry.width.unwrap_or(DEFAULT_WIDTH),
                    height: entry.height.unwrap_or(DEFAULT_HEIGHT),
                })
                .collect(),
            _ => vec![SourceConfig {
                url: DEFAULT_SOURCE_URL.to_string(),
                nominal_fps: DEFAULT_FPS,
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
            }],
        };

        let recording = file.recording.unwrap_or_default();
        let recording = RecordingSettings {
            buffer_seconds: recording.buffer_seconds.unwrap_or(DEFAULT_BUFFER_SECS),
            post_detection_secs: recording
                .post_detection_seconds
                .unwrap_or(DEFAULT_POST_DETECTION_SECS),
            extension_secs: recording
                .extension_seconds
                .unwrap_or(DEFAULT_EXTENSION_SECS),
            extension_window_secs: recording
                .extension_window_seconds
                .unwrap_or(DEFAULT_EXTENSION_WINDOW_SECS),
            trigger_threshold: recording
                .trigger_threshold
                .unwrap_or(DEFAULT_TRIGGER_THRESHOLD),
            tier_medium: recording.tier_medium.unwrap_or(DEFAULT_TIER_MEDIUM),
            tier_high: recording.tier_high.unwrap_or(DEFAULT_TIER_HIGH),
        };

        let artifacts_file = file.artifacts.unwrap_or_default();
        let artifacts = ArtifactConfig {
            clips_dir: artifacts_file
                .clips_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIPS_DIR)),
            snapshots_dir: artifacts_file
                .snapshots_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOTS_DIR)),
            snapshot_probability: artifacts_file
                .snapshot_probability
                .unwrap_or(DEFAULT_SNAPSHOT_PROBABILITY),
        };

        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        Self {
            sources,
            recording,
            artifacts,
            api_addr,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTRY_SOURCE_URL") {
            if !url.trim().is_empty() {
                if let Some(first) = self.sources.first_mut() {
                    first.url = url;
                }
            }
        }
        if let Ok(addr) = std::env::var("SENTRY_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("SENTRY_CLIPS_DIR") {
            if !dir.trim().is_empty() {
                self.artifacts.clips_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("SENTRY_SNAPSHOTS_DIR") {
            if !dir.trim().is_empty() {
                self.artifacts.snapshots_dir = PathBuf::from(dir);
            }
        }
        if let Ok(threshold) = std::env::var("SENTRY_TRIGGER_THRESHOLD") {
            self.recording.trigger_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SENTRY_TRIGGER_THRESHOLD must be a number in (0, 1]"))?;
        }
        if let Ok(fps) = std::env::var("SENTRY_FPS") {
            let fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("SENTRY_FPS must be a positive integer"))?;
            for source in &mut self.sources {
                source.nominal_fps = fps;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(anyhow!("at least one source must be configured"));
        }
        for source in &self.sources {
            if source.nominal_fps == 0 {
                return Err(anyhow!("source '{}' fps must be >= 1", source.url));
            }
            if source.width == 0 || source.height == 0 {
                return Err(anyhow!("source '{}' dimensions must be non-zero", source.url));
            }
        }
        let r = &self.recording;
        if r.buffer_seconds == 0 {
            return Err(anyhow!("recording.buffer_seconds must be >= 1"));
        }
        if r.post_detection_secs == 0 {
            return Err(anyhow!("recording.post_detection_seconds must be >= 1"));
        }
        if !(0.0 < r.trigger_threshold && r.trigger_threshold <= 1.0) {
            return Err(anyhow!("recording.trigger_threshold must be in (0, 1]"));
        }
        TierBreakpoints::new(r.tier_medium, r.tier_high)?;
        let p = self.artifacts.snapshot_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(anyhow!("artifacts.snapshot_probability must be in [0, 1]"));
        }
        Ok(())
    }

    /// Recorder tunables for a stream running at `nominal_fps`.
    pub fn recorder_config(&self, nominal_fps: u32) -> RecorderConfig {
        RecorderConfig {
            nominal_fps,
            post_detection_secs: self.recording.post_detection_secs,
            extension_secs: self.recording.extension_secs,
            extension_window_secs: self.recording.extension_window_secs,
            trigger: TriggerPolicy {
                threshold: self.recording.trigger_threshold,
            },
            tiers: TierBreakpoints {
                medium: self.recording.tier_medium,
                high: self.recording.tier_high,
            },
        }
    }
}

impl Default for SentrydConfig {
    fn default() -> Self {
        Self::from_file(SentrydConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<SentrydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
