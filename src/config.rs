//! Process-wide tunables for the device/receiver/player core.
//!
//! This is deliberately small: language preference order, the multi-speed
//! trick-play flag, and the handful of timeouts `spec.md` §5 names by value.
//! It is not a configuration-file format — that remains an external concern
//! (the narrow `SkinMessage`/`StatusSink` collaborators in [`crate::external`]
//! are how the core talks to whatever owns config files and keymaps).

use lazy_static::lazy_static;
use std::sync::RwLock;
use std::time::Duration;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::default());
}

/// Tunable knobs read by the device, arbiter, and playback engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Preferred audio/subtitle languages, most preferred first (ISO 639, 3-letter).
    pub language_preferences: Vec<String>,
    /// Prefer Dolby (AC3) audio over normal stereo/mono when both are available.
    pub prefer_dolby: bool,
    /// Multi-speed trick-play: cycle through the speed table one step at a
    /// time rather than jumping straight to the fastest entry.
    pub multi_speed_mode: bool,
    /// Linear ring buffer read timeout (§4.A).
    pub ring_read_timeout: Duration,
    /// Linear ring buffer write timeout (§4.A).
    pub ring_write_timeout: Duration,
    /// Channel "occupied" reservation window (§5).
    pub max_occupied_timeout: Duration,
    /// Device-ready probe timeout (§5).
    pub device_ready_timeout: Duration,
    /// Scramble-detection "give up, detach" threshold (§4.E).
    pub scramble_detach_after: Duration,
    /// Scramble-detection "confirmed clear, stop checking" threshold (§4.E).
    pub scramble_ok_after: Duration,
    /// Playback stuck-at-EOF threshold (§4.G).
    pub max_stuck_at_eof: Duration,
    /// Resume backup, expressed in seconds of playback at nominal fps (§4.G).
    pub resume_backup_seconds: u32,
    /// Largest single frame the playback reader will request or admit
    /// (§7: "Frame size overflow"); larger requests are clamped, and a
    /// missing index file limits blind reads to this many bytes.
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language_preferences: Vec::new(),
            prefer_dolby: false,
            multi_speed_mode: true,
            ring_read_timeout: Duration::from_millis(100),
            ring_write_timeout: Duration::from_millis(100),
            max_occupied_timeout: Duration::from_secs(60),
            device_ready_timeout: Duration::from_secs(30),
            scramble_detach_after: Duration::from_secs(3),
            scramble_ok_after: Duration::from_secs(10),
            max_stuck_at_eof: Duration::from_secs(3),
            resume_backup_seconds: 10,
            max_frame_size: 8 * 1024 * 1024,
        }
    }
}

/// Returns a clone of the current configuration.
pub fn current() -> Config {
    CONFIG.read().unwrap().clone()
}

/// Replaces the current configuration wholesale.
pub fn set(config: Config) {
    *CONFIG.write().unwrap() = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_spec() {
        let c = Config::default();
        assert_eq!(c.ring_read_timeout, Duration::from_millis(100));
        assert_eq!(c.scramble_detach_after, Duration::from_secs(3));
        assert_eq!(c.scramble_ok_after, Duration::from_secs(10));
        assert_eq!(c.max_stuck_at_eof, Duration::from_secs(3));
    }

    #[test]
    fn set_and_read_roundtrip() {
        let mut c = current();
        c.prefer_dolby = true;
        set(c.clone());
        assert!(current().prefer_dolby);
        // restore default for other tests running in-process
        set(Config::default());
    }
}
