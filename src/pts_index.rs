//! PTS→frame-index circular lookup (`spec.md` §3, §4.B).
//!
//! The decoder's STC is always slightly ahead of anything the playback
//! reader has queued, so an exact PTS match is rare — [`PtsIndex::find`]
//! returns the nearest entry, computed with 33-bit-wrap tolerance since PTS
//! values are a 33-bit clock stored here in the low 32 bits.

use parking_lot::Mutex;

/// Fixed capacity of the circular PTS index (`spec.md` §4.B).
pub const CAPACITY: usize = 500;

#[derive(Clone, Copy)]
struct Entry {
    pts: u32,
    index: i64,
}

struct Inner {
    slots: [Option<Entry>; CAPACITY],
    write: usize,
    read: usize,
    count: usize,
    last_found: i64,
}

/// A small bounded circular map from PTS (low 32 bits of the 33-bit
/// presentation clock) to frame index, used to translate the hardware
/// decoder's STC into a position in the recording.
pub struct PtsIndex {
    inner: Mutex<Inner>,
}

impl Default for PtsIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PtsIndex {
    /// An empty index. [`PtsIndex::find`] returns `0` until the first
    /// successful lookup.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { slots: [None; CAPACITY], write: 0, read: 0, count: 0, last_found: 0 }),
        }
    }

    /// Appends an entry at the write cursor, overwriting the oldest entry
    /// once the index is full.
    pub fn put(&self, pts: u32, index: i64) {
        let mut inner = self.inner.lock();
        let w = inner.write;
        inner.slots[w] = Some(Entry { pts, index });
        inner.write = (w + 1) % CAPACITY;
        if inner.count < CAPACITY {
            inner.count += 1;
        } else {
            inner.read = (inner.read + 1) % CAPACITY;
        }
    }

    /// Finds the entry whose PTS is nearest to `pts`, scanning backwards
    /// from the newest entry. Distance is computed as `min(|a-b|, 2^32 -
    /// |a-b|)` so a wrap of the 33-bit PTS clock around the 32-bit slot
    /// does not throw off the match. On an empty index, returns the last
    /// previously found index (or `0` initially) rather than jumping to an
    /// arbitrary position.
    pub fn find(&self, pts: u32) -> i64 {
        let mut inner = self.inner.lock();
        if inner.count == 0 {
            return inner.last_found;
        }
        let mut best_delta = u32::MAX;
        let mut best_index = inner.last_found;
        let mut i = inner.write;
        for _ in 0..inner.count {
            i = (i + CAPACITY - 1) % CAPACITY;
            if let Some(e) = inner.slots[i] {
                let raw = e.pts.wrapping_sub(pts);
                let d = raw.min(pts.wrapping_sub(e.pts));
                if d < best_delta {
                    best_delta = d;
                    best_index = e.index;
                }
            }
        }
        inner.last_found = best_index;
        best_index
    }

    /// Flushes the index, preserving the last-found position for future
    /// lookups on an otherwise-empty index.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots = [None; CAPACITY];
        inner.write = 0;
        inner.read = 0;
        inner.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_returns_zero_initially() {
        let idx = PtsIndex::new();
        assert_eq!(idx.find(12345), 0);
    }

    #[test]
    fn empty_index_returns_last_found_after_clear() {
        let idx = PtsIndex::new();
        idx.put(1000, 42);
        assert_eq!(idx.find(1000), 42);
        idx.clear();
        assert_eq!(idx.find(999_999), 42);
    }

    #[test]
    fn finds_nearest_entry() {
        let idx = PtsIndex::new();
        idx.put(1000, 1);
        idx.put(2000, 2);
        idx.put(3000, 3);
        assert_eq!(idx.find(2100), 2);
        assert_eq!(idx.find(2900), 3);
    }

    #[test]
    fn handles_33_bit_pts_wrap() {
        let idx = PtsIndex::new();
        // near the top of the 32-bit range
        idx.put(u32::MAX - 10, 100);
        // a PTS that wrapped around to a small value should still be "close"
        let wrapped = 20u32;
        assert_eq!(idx.find(wrapped), 100);
    }

    #[test]
    fn overwrites_oldest_entry_once_full() {
        let idx = PtsIndex::new();
        for i in 0..(CAPACITY + 10) {
            idx.put(i as u32, i as i64);
        }
        // the very first entries should have been evicted
        assert_ne!(idx.find(0), 0);
    }

    #[quickcheck_macros::quickcheck]
    fn find_is_wrap_tolerant_and_exact_on_a_single_entry(pts: u32, index: i64) -> bool {
        let idx = PtsIndex::new();
        idx.put(pts, index);
        // the only entry in the index is always its own nearest match,
        // regardless of where `pts` sits relative to the 32-bit wrap point.
        idx.find(pts) == index
    }

    #[quickcheck_macros::quickcheck]
    fn find_prefers_the_wrap_tolerant_closer_of_two_entries(a: u32, b: u32, query: u32) -> bool {
        let idx = PtsIndex::new();
        idx.put(a, 1);
        idx.put(b, 2);
        let wrap_dist = |x: u32, y: u32| x.wrapping_sub(y).min(y.wrapping_sub(x));
        let (dist_a, dist_b) = (wrap_dist(a, query), wrap_dist(b, query));
        let found = idx.find(query);
        // ties favor the newer entry (`b`), since `find` scans newest-first
        // and only replaces its best match on a strictly smaller distance.
        if dist_a < dist_b {
            found == 1
        } else {
            found == 2
        }
    }
}
