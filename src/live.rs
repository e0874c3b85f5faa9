//! Shared latest-frame slot.
//!
//! The capture loop writes the most recent frame into a mutex-guarded slot;
//! any number of reader threads (the live API, for one) take a copy. The lock
//! is held only for the swap or the clone, so readers never block the writer
//! beyond that, and the writer never waits on readers.
//!
//! The slot is distinct from the per-stream ring buffer: the recording path
//! consumes its own ordered frame stream and never reads this slot.

use std::sync::{Arc, Mutex};

use crate::frame::Frame;

#[derive(Clone, Default)]
pub struct LatestFrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    published: u64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents with this frame.
    pub fn publish(&self, frame: &Frame) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.frame = Some(frame.clone());
        state.published += 1;
    }

    /// Copy of the most recent frame, or `None` when nothing has been
    /// captured yet.
    pub fn latest(&self) -> Option<Frame> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.frame.clone()
    }

    /// How many frames have been published into the slot.
    pub fn published(&self) -> u64 {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag, 0, 0], 1, 1, SystemTime::now(), 0).unwrap()
    }

    #[test]
    fn empty_slot_reads_none() {
        let slot = LatestFrameSlot::new();
        assert!(slot.latest().is_none());
        assert_eq!(slot.published(), 0);
    }

    #[test]
    fn readers_see_the_latest_publish() {
        let slot = LatestFrameSlot::new();
        slot.publish(&frame(1));
        slot.publish(&frame(2));

        let seen = slot.latest().expect("frame");
        assert_eq!(seen.pixels()[0], 2);
        assert_eq!(slot.published(), 2);
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let slot = LatestFrameSlot::new();
        let writer_slot = slot.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..100u8 {
                writer_slot.publish(&frame(i));
            }
        });

        let reader_slot = slot.clone();
        let reader = std::thread::spawn(move || {
            let mut last = 0u8;
            for _ in 0..100 {
                if let Some(f) = reader_slot.latest() {
                    // Published tags only ever move forward.
                    assert!(f.pixels()[0] >= last);
                    last = f.pixels()[0];
                }
            }
        });

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(slot.published(), 100);
    }
}
