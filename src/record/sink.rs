//! Clip sinks.
//!
//! A `ClipSink` receives frames for one recording session and must support
//! streaming append-writes: frames go out as they arrive, and `finalize`
//! flushes whatever has been written so the file is complete. The shipped
//! container is MJPEG (concatenated JPEG frames), which is append-only by
//! construction and playable by common tooling.

use anyhow::{anyhow, Context, Result};
use image::ImageEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

/// Write side of one clip.
pub trait ClipSink {
    /// Append one frame. Frames must match the dimensions the sink was
    /// created with.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the clip. Idempotent: a second call after a successful
    /// finalize is a no-op.
    fn finalize(&mut self) -> Result<()>;

    fn path(&self) -> &Path;
}

/// Creates sinks for new recording sessions.
pub trait SinkFactory {
    fn create(&self, path: &Path, width: u32, height: u32, fps: u32) -> Result<Box<dyn ClipSink>>;
}

/// JPEG quality used for clip frames and snapshots.
pub const JPEG_QUALITY: u8 = 90;

/// MJPEG file sink: a stream of JPEG-encoded frames.
pub struct MjpegSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    width: u32,
    height: u32,
}

impl MjpegSink {
    pub fn create(path: &Path, width: u32, height: u32) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating clip file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            width,
            height,
        })
    }
}

impl ClipSink for MjpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("clip sink {} is already finalized", self.path.display()))?;
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame is {}x{}, sink {} expects {}x{}",
                frame.width,
                frame.height,
                self.path.display(),
                self.width,
                self.height
            ));
        }
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut *writer, JPEG_QUALITY);
        encoder
            .write_image(
                frame.pixels(),
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .with_context(|| format!("encoding frame into {}", self.path.display()))?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("flushing clip {}", self.path.display()))?;
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Default factory producing `MjpegSink`s. The nominal fps is recorded in the
/// clip's metadata sidecar rather than the container itself.
pub struct MjpegSinkFactory;

impl SinkFactory for MjpegSinkFactory {
    fn create(&self, path: &Path, width: u32, height: u32, _fps: u32) -> Result<Box<dyn ClipSink>> {
        Ok(Box::new(MjpegSink::create(path, width, height)?))
    }
}

// ----------------------------------------------------------------------------
// In-memory sink for controller tests
// ----------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn small_frame() -> Frame {
        Frame::new(vec![128u8; 4 * 4 * 3], 4, 4, SystemTime::now(), 0).unwrap()
    }

    #[test]
    fn mjpeg_sink_appends_and_finalizes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.mjpeg");
        let mut sink = MjpegSink::create(&path, 4, 4)?;

        sink.write_frame(&small_frame())?;
        sink.write_frame(&small_frame())?;
        sink.finalize()?;

        let bytes = std::fs::read(&path)?;
        assert!(!bytes.is_empty());
        // JPEG SOI marker at the start of the stream.
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[test]
    fn finalize_is_idempotent_and_blocks_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.mjpeg");
        let mut sink = MjpegSink::create(&path, 4, 4)?;

        sink.finalize()?;
        sink.finalize()?;
        assert!(sink.write_frame(&small_frame()).is_err());
        Ok(())
    }

    #[test]
    fn mismatched_dimensions_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.mjpeg");
        let mut sink = MjpegSink::create(&path, 8, 8)?;
        assert!(sink.write_frame(&small_frame()).is_err());
        Ok(())
    }
}
