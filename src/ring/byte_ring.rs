//! Linear byte ring buffer for live TS input (`spec.md` §4.A).
//!
//! Capacity is fixed at construction and rounded down to a whole number of
//! [`TS_PACKET_SIZE`](crate::ts::TS_PACKET_SIZE) packets so that a producer
//! writing whole packets can never straddle the wrap point mid-packet. The
//! ring is lossless unless the producer outruns the consumer; an overrun is
//! reported as a recoverable [`RingError::Overflow`] rather than panicking —
//! the sync-byte scan in [`ByteRing::get`] resynchronizes on the next read.

use std::io::Read;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::ts::{SYNC_BYTE, TS_PACKET_SIZE};

/// Default read/write timeout for [`ByteRing`] operations (`spec.md` §4.A).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Recoverable conditions reported by [`ByteRing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The producer offered more bytes than the ring had room for; `dropped`
    /// bytes were discarded. The caller should log and continue reading —
    /// the TS sync-byte scan recovers packet alignment on the consumer side.
    #[error("ring buffer overflow: {dropped} bytes dropped")]
    Overflow {
        /// Number of bytes that could not be stored.
        dropped: usize,
    },
    /// No data became available within the configured read timeout.
    #[error("ring buffer read timed out")]
    ReadTimeout,
}

struct Inner {
    data: Vec<u8>,
    head: usize,
    len: usize,
}

impl Inner {
    fn cap(&self) -> usize {
        self.data.len()
    }

    fn free(&self) -> usize {
        self.cap() - self.len
    }

    fn push_slice(&mut self, bytes: &[u8]) {
        let cap = self.cap();
        let tail = (self.head + self.len) % cap;
        let first = bytes.len().min(cap - tail);
        self.data[tail..tail + first].copy_from_slice(&bytes[..first]);
        if first < bytes.len() {
            let rest = bytes.len() - first;
            self.data[0..rest].copy_from_slice(&bytes[first..]);
        }
        self.len += bytes.len();
    }

    /// Copies up to `max` contiguous-in-logical-order bytes starting at
    /// `head` into a freshly allocated `Vec`, without consuming them.
    fn peek(&self, max: usize) -> Vec<u8> {
        let n = max.min(self.len);
        let cap = self.cap();
        let mut out = Vec::with_capacity(n);
        let first = n.min(cap - self.head);
        out.extend_from_slice(&self.data[self.head..self.head + first]);
        if first < n {
            out.extend_from_slice(&self.data[0..n - first]);
        }
        out
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.head = (self.head + n) % self.cap();
        self.len -= n;
    }
}

/// A bounded, TS-packet-aligned byte ring with timed blocking reads/writes.
///
/// Single producer (the device's DVR thread, or a test harness), single
/// consumer (the same thread's fan-out loop calling [`ByteRing::get`]).
pub struct ByteRing {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ByteRing {
    /// Builds a ring sized to hold at least `min_capacity` bytes, rounded up
    /// to a whole number of TS packets, using the default 100 ms timeouts.
    pub fn new(min_capacity: usize) -> Self {
        Self::with_timeouts(min_capacity, DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// As [`ByteRing::new`], with explicit read/write timeouts.
    pub fn with_timeouts(min_capacity: usize, read_timeout: Duration, write_timeout: Duration) -> Self {
        let packets = (min_capacity.max(1) + TS_PACKET_SIZE - 1) / TS_PACKET_SIZE;
        let cap = packets.max(1) * TS_PACKET_SIZE;
        Self {
            inner: Mutex::new(Inner { data: vec![0u8; cap], head: 0, len: 0 }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            read_timeout,
            write_timeout,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap()
    }

    /// Bytes currently stored, not yet consumed.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether the ring currently holds no data.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all buffered data.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.head = 0;
        inner.len = 0;
        self.not_full.notify_all();
    }

    /// Writes `data` into the ring, waiting up to the configured write
    /// timeout for room. Writes as many bytes as fit; any bytes beyond the
    /// ring's free capacity are dropped and reported via
    /// [`RingError::Overflow`] — the caller should log and keep reading.
    pub fn put(&self, data: &[u8]) -> Result<(), RingError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        if inner.free() < data.len() {
            let deadline = self.write_timeout;
            let result = self.not_full.wait_for(&mut inner, deadline);
            let _ = result;
        }
        let writable = data.len().min(inner.free());
        inner.push_slice(&data[..writable]);
        drop(inner);
        self.not_empty.notify_all();
        if writable < data.len() {
            Err(RingError::Overflow { dropped: data.len() - writable })
        } else {
            Ok(())
        }
    }

    /// Reads from `reader` into the ring's free space, performing at most
    /// one underlying `read` call — callers loop for sustained input.
    /// Returns the number of bytes read (`0` at EOF).
    pub fn read_from(&self, reader: &mut impl Read) -> std::io::Result<usize> {
        let mut inner = self.inner.lock();
        let cap = inner.cap();
        let tail = (inner.head + inner.len) % cap;
        let free = inner.free();
        if free == 0 {
            return Ok(0);
        }
        let contiguous = free.min(cap - tail);
        let mut tmp = vec![0u8; contiguous];
        let n = reader.read(&mut tmp)?;
        inner.push_slice(&tmp[..n]);
        drop(inner);
        if n > 0 {
            self.not_empty.notify_all();
        }
        Ok(n)
    }

    /// Returns up to `max` bytes from the front of the ring without
    /// consuming them, blocking up to the configured read timeout for data
    /// to arrive. Enforces TS alignment: if the data does not begin with
    /// [`SYNC_BYTE`], bytes are discarded up to the next sync byte (or the
    /// whole available run, if none is found) and the skip count is logged.
    /// Returns `None` on timeout with no data, or if nothing but garbage was
    /// found.
    pub fn get(&self, max: usize) -> Result<Vec<u8>, RingError> {
        let mut inner = self.inner.lock();
        if inner.len == 0 {
            let deadline = self.read_timeout;
            let timed_out = self.not_empty.wait_for(&mut inner, deadline).timed_out();
            if timed_out && inner.len == 0 {
                return Err(RingError::ReadTimeout);
            }
        }
        self.resync_locked(&mut inner);
        if inner.len == 0 {
            return Err(RingError::ReadTimeout);
        }
        Ok(inner.peek(max))
    }

    /// Advances the read cursor past `n` already-[`get`](Self::get) bytes.
    pub fn consume(&self, n: usize) {
        let mut inner = self.inner.lock();
        inner.consume(n);
        drop(inner);
        self.not_full.notify_all();
    }

    /// Convenience: removes and returns exactly one TS packet if a fully
    /// buffered, sync-aligned packet is available.
    pub fn get_ts_packet(&self) -> Result<Vec<u8>, RingError> {
        let packet = self.get(TS_PACKET_SIZE)?;
        if packet.len() < TS_PACKET_SIZE {
            return Err(RingError::ReadTimeout);
        }
        self.consume(TS_PACKET_SIZE);
        Ok(packet)
    }

    fn resync_locked(&self, inner: &mut Inner) {
        if inner.len == 0 || inner.data[inner.head] == SYNC_BYTE {
            return;
        }
        let cap = inner.cap();
        let mut skipped = 0usize;
        while inner.len > 0 {
            if inner.data[inner.head] == SYNC_BYTE {
                break;
            }
            inner.head = (inner.head + 1) % cap;
            inner.len -= 1;
            skipped += 1;
        }
        log::warn!("ByteRing: discarded {skipped} bytes resynchronizing to TS sync byte");
    }
}
