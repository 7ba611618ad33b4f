//! Narrow collaborator traits the core consumes but does not own
//! (`spec.md` §6). Everything outside the device/receiver/player subsystem
//! — EPG, the skin, recording cut/index storage, SVDRP — is reached only
//! through these interfaces.

use crate::channel::{Channel, ChannelId};

/// Looks channels up by number or ID. Implemented by whatever owns the
/// actual channel list and favorites/retune bookkeeping; the core only
/// reads through this trait.
pub trait ChannelCatalog: Send + Sync {
    /// Looks up a channel by its user-facing number.
    fn get_by_number(&self, number: u32) -> Option<Channel>;
    /// Looks up a channel by its stable ID.
    fn get_by_id(&self, id: ChannelId) -> Option<Channel>;
}

/// One entry the [`RecordingIndex`] maps a frame index to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Which file in the recording's numbered sequence.
    pub file_number: u16,
    /// Byte offset within that file.
    pub file_offset: u64,
    /// Whether this frame is an I-frame (independent, seekable).
    pub independent: bool,
    /// Frame length in bytes, or `-1` meaning "read to EOF of this file".
    pub length: i64,
}

/// The on-disk frame index for a recording (`spec.md` §6, §4.G). The core
/// reads and writes resume state through this trait; it never touches the
/// index file format directly.
pub trait RecordingIndex: Send + Sync {
    /// Looks up the `(file, offset, independent?, length)` for `frame`.
    fn get(&self, frame: i64) -> Option<IndexEntry>;
    /// Finds the nearest I-frame at or after (`forward`) / before
    /// (`!forward`) `frame`, returning its index and position, or `None` if
    /// there isn't one in that direction.
    fn get_next_iframe(&self, frame: i64, forward: bool) -> Option<(i64, IndexEntry)>;
    /// The index of the last frame in the recording.
    fn last(&self) -> i64;
    /// The previously saved resume position, if any.
    fn get_resume(&self) -> Option<i64>;
    /// Persists `frame` as the resume position.
    fn store_resume(&self, frame: i64);
    /// Whether the index file loaded successfully. When `false`, playback
    /// still proceeds (`spec.md` §7), reading blind up to `MAXFRAMESIZE`.
    fn ok(&self) -> bool;
    /// Whether the recording is still being written to (timeshift/live
    /// pause), which changes trick-play EOF behavior.
    fn is_still_recording(&self) -> bool;
}

/// Raw byte access to a recording's numbered file sequence (`spec.md` §6:
/// "Recording file layout"). The playback engine's non-blocking reader
/// (`spec.md` §4.G, §5) is the only caller; it drives this trait from a
/// dedicated thread so the engine thread never blocks on file I/O.
pub trait RecordingFile: Send + Sync {
    /// Opens (or switches the current position to) `file_number`, returning
    /// `false` if that file does not exist.
    fn open(&self, file_number: u16) -> bool;
    /// Reads up to `max_len` bytes starting at `offset` within the file
    /// last opened by [`RecordingFile::open`]. A short read is not an
    /// error — the caller treats fewer bytes than requested as "read to
    /// EOF of this file" (`spec.md` §6: `length == -1`).
    fn read_at(&self, file_number: u16, offset: u64, max_len: usize) -> std::io::Result<Vec<u8>>;
}

/// Receives notifications of channel switches and volume changes
/// (`spec.md` §6). Purely an outbound notification sink — the core never
/// reads anything back through it.
pub trait StatusSink: Send + Sync {
    /// Reports that `device` switched to `channel_number`.
    fn channel_switch(&self, device: u32, channel_number: u32, live_view: bool);
    /// Reports a volume change; `absolute` distinguishes a set value from a
    /// relative adjustment.
    fn set_volume(&self, delta: i32, absolute: bool);
}

/// Severity of a [`SkinMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Purely informational.
    Info,
    /// A recoverable problem the user should know about.
    Warning,
    /// An operation failed outright.
    Error,
}

/// Surfaces user-visible failures (`spec.md` §7: "Channel not available"
/// and "Can't start Transfer Mode" are the only two categories the core
/// uses this for).
pub trait SkinMessage: Send + Sync {
    /// Displays `text` at the given `level`.
    fn message(&self, level: MessageLevel, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSkin(Mutex<Vec<(MessageLevel, String)>>);

    impl SkinMessage for RecordingSkin {
        fn message(&self, level: MessageLevel, text: &str) {
            self.0.lock().unwrap().push((level, text.to_string()));
        }
    }

    #[test]
    fn skin_message_trait_object_is_usable() {
        let skin: Box<dyn SkinMessage> = Box::new(RecordingSkin(Mutex::new(Vec::new())));
        skin.message(MessageLevel::Error, "channel not available");
    }
}
