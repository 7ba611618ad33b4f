//! Channel data model (`spec.md` §3).

/// Opaque identifier for a channel, stable across retunes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

/// A 13-bit MPEG-TS PID. Non-zero when carrying a real elementary stream.
pub type Pid = u16;

/// An elementary audio/subtitle stream carried by a channel, with its language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePid {
    /// 13-bit PID of the elementary stream. Must be non-zero per the
    /// channel invariant in `spec.md` §3.
    pub pid: Pid,
    /// ISO 639 language code, e.g. `"eng"`.
    pub language: String,
}

impl LanguagePid {
    /// Builds a new PID/language pair, panicking in debug builds if `pid`
    /// violates the 13-bit non-zero invariant.
    pub fn new(pid: Pid, language: impl Into<String>) -> Self {
        debug_assert!(pid != 0 && pid < 0x2000, "channel PID must be 13-bit and non-zero");
        Self { pid, language: language.into() }
    }
}

/// The conditional-access scheme identifying which CAM can decrypt a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaId(pub u16);

/// A tunable channel: the fields the core needs to select a device, arm PID
/// filters, and present audio/subtitle choices. Everything else (EPG name,
/// transponder parameters, favorites) lives outside the core.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stable channel identifier.
    pub id: ChannelId,
    /// User-facing channel number, used only for lookups by the catalog.
    pub number: u32,
    /// Video elementary stream PID. `0` means radio/audio-only channel.
    pub video_pid: Pid,
    /// Normal (non-Dolby) audio PIDs with language.
    pub audio_pids: Vec<LanguagePid>,
    /// Dolby/AC3 audio PIDs with language.
    pub dolby_pids: Vec<LanguagePid>,
    /// Subtitle PIDs with language.
    pub subtitle_pids: Vec<LanguagePid>,
    /// Conditional access IDs this channel is encrypted with. Empty means
    /// free-to-air.
    pub caids: Vec<CaId>,
    /// Restrict device selection to a specific card number (1-based), or
    /// `None` to allow any device.
    pub card_index: Option<u32>,
}

impl Channel {
    /// A channel requires conditional access when it declares at least one CAID.
    pub fn is_encrypted(&self) -> bool {
        !self.caids.is_empty()
    }

    /// Free-to-air is simply the negation of [`Channel::is_encrypted`].
    pub fn is_free_to_air(&self) -> bool {
        !self.is_encrypted()
    }
}
