//! The unit of data moving through the playback engine's framed ring
//! (`spec.md` §3: `Frame { bytes, length, index, pts, independent? }`).

use bytes::Bytes;

/// A single frame read from a recording, awaiting delivery to the decoder.
///
/// Invariant (`spec.md` §3): `independent ⇒ pts.is_some() && index` refers to
/// an I-frame. This is enforced by construction: [`Frame::independent`]
/// requires a `pts`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame bytes (PES or TS, depending on playback mode).
    pub bytes: Bytes,
    /// Frame index in the recording's index file.
    pub index: i64,
    /// Presentation time stamp, when known (always known for independent frames).
    pub pts: Option<u32>,
    /// Whether this frame is self-contained (an I-frame) — a seek target.
    pub independent: bool,
}

impl Frame {
    /// A non-independent (dependent) frame: no PTS guarantee.
    pub fn dependent(bytes: Bytes, index: i64, pts: Option<u32>) -> Self {
        Self { bytes, index, pts, independent: false }
    }

    /// An independent (I-frame) frame. Requires a PTS per the invariant.
    pub fn independent(bytes: Bytes, index: i64, pts: u32) -> Self {
        Self { bytes, index, pts: Some(pts), independent: true }
    }

    /// Length of the frame payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_frame_always_has_pts() {
        let f = Frame::independent(Bytes::from_static(b"abc"), 10, 12345);
        assert!(f.independent);
        assert_eq!(f.pts, Some(12345));
    }
}
