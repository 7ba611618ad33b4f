//! Track table (`spec.md` §3: `Track { kind, index, pid, language, description }`).

use crate::channel::Pid;

/// Kind of elementary stream a [`Track`] slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Normal (non-Dolby) audio.
    Audio,
    /// Dolby Digital / AC3 audio.
    Dolby,
    /// Subtitles (DVB subtitle or teletext-based).
    Subtitle,
}

/// Maximum language tag length, matching the fixed-size `language[4]` field
/// of `spec.md` §3 (3-letter ISO 639 code plus terminator).
pub const MAX_LANGUAGE_LEN: usize = 4;
/// Maximum description length, matching the fixed-size `description[64]`
/// field of `spec.md` §3.
pub const MAX_DESCRIPTION_LEN: usize = 64;

/// One entry in a device's per-kind track table.
#[derive(Debug, Clone)]
pub struct Track {
    /// Audio, Dolby, or subtitle.
    pub kind: TrackKind,
    /// Position within the device's fixed-size table for this kind.
    pub index: usize,
    /// Elementary stream PID.
    pub pid: Pid,
    /// Language code, truncated to [`MAX_LANGUAGE_LEN`] bytes.
    pub language: String,
    /// Human-readable description, truncated to [`MAX_DESCRIPTION_LEN`] bytes.
    pub description: String,
}

impl Track {
    /// Builds a track, truncating `language`/`description` to their
    /// fixed-size budgets rather than erroring — matching the original's
    /// fixed-size char-array semantics.
    pub fn new(kind: TrackKind, index: usize, pid: Pid, language: &str, description: &str) -> Self {
        Self {
            kind,
            index,
            pid,
            language: truncate(language, MAX_LANGUAGE_LEN - 1),
            description: truncate(description, MAX_DESCRIPTION_LEN - 1),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// A fixed-size table of tracks for one [`TrackKind`], with a "current"
/// selection. Mirrors the device's per-kind track arrays in `spec.md` §3:
/// "Only one 'current' audio and one 'current' subtitle track at a time."
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl TrackTable {
    /// An empty track table.
    pub fn new() -> Self {
        Self { tracks: Vec::new(), current: None }
    }

    /// Replaces the table's contents, clearing the current selection.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.current = None;
    }

    /// All tracks currently in the table.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The currently selected track, if any.
    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Index of the currently selected track, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Selects the track at `index`. Returns `false` if out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.current = Some(index);
            true
        } else {
            false
        }
    }

    /// Selects the first track whose language matches one of `preferences`,
    /// in preference order; falls back to index 0 if the table is
    /// non-empty and nothing in `preferences` matched. Mirrors
    /// `ensure_audio_track`/`ensure_subtitle_track` (`spec.md` §4.E).
    pub fn select_by_language_preference(&mut self, preferences: &[String]) -> bool {
        for pref in preferences {
            if let Some(i) = self.tracks.iter().position(|t| &t.language == pref) {
                self.current = Some(i);
                return true;
            }
        }
        if !self.tracks.is_empty() {
            self.current = Some(0);
            return true;
        }
        false
    }

    /// Number of tracks in the table.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the table has no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
