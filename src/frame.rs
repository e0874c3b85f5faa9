//! Frames and the pre-event ring buffer.
//!
//! - `Frame`: Immutable RGB pixel buffer with capture timestamp and stream index.
//!   Pixel data is shared (`Arc`), so cloning a frame into a sink or the live
//!   slot never copies the image.
//! - `FrameRing`: Bounded per-stream FIFO of recent frames. Insertion is O(1)
//!   and evicts the oldest frame once full. The ring is the source of the
//!   pre-event context prepended to every new clip.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::SystemTime;

/// Bytes per pixel for the RGB frames this pipeline carries.
pub const RGB_CHANNELS: usize = 3;

/// Immutable captured frame.
///
/// Produced by the ingestion layer, pushed into the per-stream `FrameRing`,
/// and (while a clip is open) written to the active sink. Never mutated after
/// creation.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Wall-clock capture time. Also drives the controller's trigger-recency
    /// arithmetic, keeping the state machine deterministic under test.
    pub captured_at: SystemTime,
    /// Index of the originating stream in multi-stream operation.
    pub stream_index: usize,
}

impl Frame {
    /// Create a frame from tightly packed RGB pixels.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: SystemTime,
        stream_index: usize,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * RGB_CHANNELS;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame pixel buffer is {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels: Arc::from(pixels),
            width,
            height,
            captured_at,
            stream_index,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Bounded ring buffer of recent frames for one stream.
///
/// Capacity is fixed at construction from `buffer_seconds x nominal_fps`. If
/// the true frame rate differs from the nominal rate, the buffer represents a
/// best-effort time window.
pub struct FrameRing {
    buffer: std::collections::VecDeque<Frame>,
    capacity: usize,
}

impl FrameRing {
    /// Create a ring sized for `buffer_seconds` of footage at `nominal_fps`.
    pub fn new(buffer_seconds: u32, nominal_fps: u32) -> Self {
        let capacity = (buffer_seconds as usize * nominal_fps as usize).max(1);
        Self {
            buffer: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest when at capacity. O(1), never fails.
    pub fn push(&mut self, frame: Frame) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(frame);
    }

    /// All buffered frames, oldest first, without mutating the buffer.
    ///
    /// Used to seed a new clip with pre-event context. Cloning is cheap: the
    /// pixel buffers are shared.
    pub fn drain_ordered(&self) -> impl Iterator<Item = &Frame> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
