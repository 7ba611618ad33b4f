//! The fixed PID-handle table a [`super::Device`] owns (`spec.md` §3:
//! "`PidHandle`: `{pid, stream_type, use_count, opaque_handle}`. The device
//! owns a fixed small array indexed by semantic slot: video, audio, dolby,
//! teletext, subtitle, pcr, and N general-purpose 'other' slots.").

use crate::channel::Pid;
use crate::device::driver::DeviceDriver;

/// Number of general-purpose filter slots beyond the six named ones.
pub const OTHER_SLOTS: usize = 8;

/// Which semantic slot a PID occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidSlotKind {
    /// The single video elementary stream.
    Video,
    /// The single non-Dolby audio elementary stream.
    Audio,
    /// The single Dolby/AC3 elementary stream.
    Dolby,
    /// Teletext.
    Teletext,
    /// Subtitles.
    Subtitle,
    /// Program clock reference; may legitimately hold PID 0.
    Pcr,
    /// One of [`OTHER_SLOTS`] general-purpose slots, used for PSI filters and
    /// anything else that isn't one of the named kinds.
    Other,
}

/// One entry in the table. `use_count == 0` iff the slot is free iff `pid ==
/// 0`, except [`PidSlotKind::Pcr`] which may legitimately carry PID 0 while
/// in use (it piggybacks on the video PID in that case).
#[derive(Debug, Clone, Copy, Default)]
pub struct PidHandle {
    /// The PID armed in this slot, or `0` if free.
    pub pid: Pid,
    /// MPEG-2 stream type byte from the PMT, informational only.
    pub stream_type: u8,
    /// Reference count; a PID requested twice shares one hardware filter.
    pub use_count: u32,
    /// Driver-defined opaque filter handle, set by `open_filter`.
    pub opaque_handle: Option<u64>,
}

impl PidHandle {
    fn is_free(&self) -> bool {
        self.use_count == 0
    }
}

/// The device's whole PID-handle table: the six named slots plus
/// [`OTHER_SLOTS`] general-purpose ones.
#[derive(Debug, Clone)]
pub struct PidTable {
    video: PidHandle,
    audio: PidHandle,
    dolby: PidHandle,
    teletext: PidHandle,
    subtitle: PidHandle,
    pcr: PidHandle,
    other: [PidHandle; OTHER_SLOTS],
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PidTable {
    /// An empty table: every slot free, every PID zero.
    pub fn new() -> Self {
        Self {
            video: PidHandle::default(),
            audio: PidHandle::default(),
            dolby: PidHandle::default(),
            teletext: PidHandle::default(),
            subtitle: PidHandle::default(),
            pcr: PidHandle::default(),
            other: [PidHandle::default(); OTHER_SLOTS],
        }
    }

    fn named_slot(&mut self, kind: PidSlotKind) -> Option<&mut PidHandle> {
        match kind {
            PidSlotKind::Video => Some(&mut self.video),
            PidSlotKind::Audio => Some(&mut self.audio),
            PidSlotKind::Dolby => Some(&mut self.dolby),
            PidSlotKind::Teletext => Some(&mut self.teletext),
            PidSlotKind::Subtitle => Some(&mut self.subtitle),
            PidSlotKind::Pcr => Some(&mut self.pcr),
            PidSlotKind::Other => None,
        }
    }

    /// Arms `pid` in the slot for `kind`. For named slots there is exactly
    /// one handle, shared via refcount; for [`PidSlotKind::Other`] this finds
    /// an existing handle for the same PID or the first free general-purpose
    /// slot. Returns `false` ("PID table exhausted", `spec.md` §7) only when
    /// `kind` is `Other` and every general-purpose slot is occupied by a
    /// different PID.
    pub fn add_pid(
        &mut self,
        driver: &dyn DeviceDriver,
        pid: Pid,
        stream_type: u8,
        kind: PidSlotKind,
    ) -> bool {
        if kind == PidSlotKind::Other {
            if let Some(h) = self.other.iter_mut().find(|h| !h.is_free() && h.pid == pid) {
                h.use_count += 1;
                if h.use_count == 2 {
                    driver.set_pid(h, kind, true);
                }
                return true;
            }
            let Some(h) = self.other.iter_mut().find(|h| h.is_free()) else {
                return false;
            };
            h.pid = pid;
            h.stream_type = stream_type;
            h.use_count = 1;
            driver.set_pid(h, kind, true);
            return true;
        }
        let h = self.named_slot(kind).expect("named slot");
        if h.is_free() {
            h.pid = pid;
            h.stream_type = stream_type;
            h.use_count = 1;
            driver.set_pid(h, kind, true);
        } else {
            debug_assert_eq!(h.pid, pid, "named PID slot reused for a different PID");
            h.use_count += 1;
            if h.use_count == 2 {
                driver.set_pid(h, kind, true);
            }
        }
        true
    }

    /// Releases one reference to `pid` in the slot for `kind`. When the
    /// refcount reaches zero, closes any open filter and disarms the
    /// hardware. Returns `false` if `pid` was not found armed in that slot.
    pub fn del_pid(&mut self, driver: &dyn DeviceDriver, pid: Pid, kind: PidSlotKind) -> bool {
        if kind == PidSlotKind::Other {
            let Some(h) = self.other.iter_mut().find(|h| !h.is_free() && h.pid == pid) else {
                return false;
            };
            Self::release(driver, h, kind);
            return true;
        }
        let h = self.named_slot(kind).expect("named slot");
        if h.is_free() || h.pid != pid {
            return false;
        }
        Self::release(driver, h, kind);
        true
    }

    fn release(driver: &dyn DeviceDriver, h: &mut PidHandle, kind: PidSlotKind) {
        h.use_count = h.use_count.saturating_sub(1);
        if h.use_count == 0 {
            if let Some(handle) = h.opaque_handle.take() {
                driver.close_filter(handle);
            }
            driver.set_pid(h, kind, false);
            h.pid = 0;
            h.stream_type = 0;
        }
    }

    /// Whether every slot is free (the table's state before any `add_pid`).
    pub fn is_empty(&self) -> bool {
        [self.video, self.audio, self.dolby, self.teletext, self.subtitle, self.pcr]
            .iter()
            .all(PidHandle::is_free)
            && self.other.iter().all(PidHandle::is_free)
    }

    /// Current handle for a named slot (read-only), or `None` for `Other`
    /// (which has no single handle).
    pub fn get(&self, kind: PidSlotKind) -> Option<PidHandle> {
        match kind {
            PidSlotKind::Video => Some(self.video),
            PidSlotKind::Audio => Some(self.audio),
            PidSlotKind::Dolby => Some(self.dolby),
            PidSlotKind::Teletext => Some(self.teletext),
            PidSlotKind::Subtitle => Some(self.subtitle),
            PidSlotKind::Pcr => Some(self.pcr),
            PidSlotKind::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::driver::dummy::DummyDriver;

    #[test]
    fn add_then_del_returns_table_to_empty() {
        let driver = DummyDriver::new();
        let mut table = PidTable::new();
        assert!(table.add_pid(&driver, 101, 0x02, PidSlotKind::Video));
        assert!(table.add_pid(&driver, 102, 0x04, PidSlotKind::Audio));
        assert!(!table.is_empty());
        assert!(table.del_pid(&driver, 101, PidSlotKind::Video));
        assert!(table.del_pid(&driver, 102, PidSlotKind::Audio));
        assert!(table.is_empty());
    }

    #[test]
    fn double_add_shares_one_handle_via_refcount() {
        let driver = DummyDriver::new();
        let mut table = PidTable::new();
        assert!(table.add_pid(&driver, 101, 0, PidSlotKind::Audio));
        assert!(table.add_pid(&driver, 101, 0, PidSlotKind::Audio));
        assert_eq!(table.get(PidSlotKind::Audio).unwrap().use_count, 2);
        assert!(table.del_pid(&driver, 101, PidSlotKind::Audio));
        assert_eq!(table.get(PidSlotKind::Audio).unwrap().use_count, 1);
        assert!(table.del_pid(&driver, 101, PidSlotKind::Audio));
        assert!(table.is_empty());
    }

    #[test]
    fn other_slots_exhaust_and_release() {
        let driver = DummyDriver::new();
        let mut table = PidTable::new();
        for pid in 0..OTHER_SLOTS as Pid {
            assert!(table.add_pid(&driver, 200 + pid, 0, PidSlotKind::Other));
        }
        assert!(!table.add_pid(&driver, 999, 0, PidSlotKind::Other));
        assert!(table.del_pid(&driver, 200, PidSlotKind::Other));
        assert!(table.add_pid(&driver, 999, 0, PidSlotKind::Other));
    }
}
