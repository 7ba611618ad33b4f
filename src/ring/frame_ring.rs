//! Framed ring buffer for playback (`spec.md` §4.A).
//!
//! Stores whole [`Frame`]s rather than bytes; capacity is measured in bytes
//! of frame payload. Single producer (the playback reader thread), single
//! consumer (the decoder-feeder step of the same engine's action loop) —
//! the internal mutex only serializes `put`/`drop_front`/`clear` against
//! `front`, it is not a substitute for synchronizing producer and consumer
//! logic, which the playback engine already does with its own lock.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::frame::Frame;

struct Inner {
    frames: VecDeque<Frame>,
    bytes: usize,
}

/// A bounded FIFO of [`Frame`]s, sized in bytes rather than frame count.
pub struct FrameRing {
    inner: Mutex<Inner>,
    capacity_bytes: usize,
}

impl FrameRing {
    /// Builds an empty ring with the given byte capacity.
    pub fn new(capacity_bytes: usize) -> Self {
        Self { inner: Mutex::new(Inner { frames: VecDeque::new(), bytes: 0 }), capacity_bytes }
    }

    /// Attempts to enqueue `frame`. Returns `false` (frame is returned to the
    /// caller to retry after the consumer drains) when admitting it would
    /// exceed the byte capacity — except that a ring with no frames at all
    /// always admits one, so an oversized single frame is never stuck.
    pub fn put(&self, frame: Frame) -> Result<(), Frame> {
        let mut inner = self.inner.lock();
        let would_be = inner.bytes + frame.len();
        if !inner.frames.is_empty() && would_be > self.capacity_bytes {
            return Err(frame);
        }
        inner.bytes = would_be;
        inner.frames.push_back(frame);
        Ok(())
    }

    /// Returns a clone of the oldest frame without removing it, or `None` if
    /// the ring is empty.
    pub fn front(&self) -> Option<Frame> {
        self.inner.lock().frames.front().cloned()
    }

    /// Removes the oldest frame. No-op if the ring is already empty.
    pub fn drop_front(&self) {
        let mut inner = self.inner.lock();
        if let Some(f) = inner.frames.pop_front() {
            inner.bytes -= f.len();
        }
    }

    /// Flushes all buffered frames.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.bytes = 0;
    }

    /// Number of frames currently buffered.
    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Total payload bytes currently buffered.
    pub fn byte_count(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Whether the ring holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }
}
