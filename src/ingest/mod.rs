//! Frame ingestion sources.
//!
//! Camera/file acquisition is an external collaborator; this module ships only
//! the `stub://` synthetic source used by the demo binary and tests, behind
//! the same backend-enum surface a real camera source would use.
//!
//! Sources produce `Frame` instances that flow into the per-stream ring
//! buffer and, while a clip is open, into the active sink.

use anyhow::{anyhow, Result};
use std::time::SystemTime;

use crate::frame::{Frame, RGB_CHANNELS};

/// Configuration for one frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source URL. `stub://<name>` selects the synthetic generator.
    pub url: String,
    /// Nominal frame rate (frames per second).
    pub nominal_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            nominal_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// A frame source for one stream.
pub struct FrameSource {
    backend: SourceBackend,
    stream_index: usize,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
}

impl FrameSource {
    pub fn new(config: SourceConfig, stream_index: usize) -> Result<Self> {
        if config.url.starts_with("stub://") {
            Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(config)),
                stream_index,
            })
        } else {
            Err(anyhow!(
                "source '{}' requires a camera ingestion backend, which is not compiled in; \
                 use a stub:// URL",
                config.url
            ))
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(self.stream_index),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for the demo and tests
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Simulated scene state; bumping it simulates an object entering.
    scene_state: u8,
}

impl SyntheticSource {
    fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FrameSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self, stream_index: usize) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            SystemTime::now(),
            stream_index,
        )
    }

    /// Static background with a scene change every 50 frames.
    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count =
            self.config.width as usize * self.config.height as usize * RGB_CHANNELS;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
