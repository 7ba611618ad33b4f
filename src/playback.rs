//! Threaded playback engine (`spec.md` §4.G): a trick-play state machine
//! that reads a recording through a [`RecordingIndex`]/[`RecordingFile`]
//! pair, frames it into a [`FrameRing`], and feeds a [`Device`]'s decoder
//! while keeping a [`PtsIndex`] in sync with the decoder's STC.
//!
//! Two threads per engine (`spec.md` §5): the engine thread itself (the
//! "reader thread" of §4.G) runs [`Engine::run`]'s five-step loop; a second
//! [`NonBlockingReader`] thread services file reads so the engine thread
//! never blocks on I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config;
use crate::device::Device;
use crate::external::{RecordingFile, RecordingIndex};
use crate::frame::Frame;
use crate::pts_index::PtsIndex;
use crate::ring::FrameRing;
use crate::ts::{pes_get_pts, ts_get_pts, SYNC_BYTE, TS_PACKET_SIZE};
use crate::utils::cancel::join_with_deadline;

/// Nominal frame rate assumed when converting seconds to frame counts
/// (`skip_seconds`, resume backoff) in the absence of per-recording fps
/// metadata — `spec.md` §4.G names `RESUMEBACKUP` only in seconds.
const NOMINAL_FPS: i64 = 25;

/// Trick-play speed table (`spec.md` §4.G): direction is folded into the
/// sign, `1` is normal forward play. Indexing is zero-based, so "normal
/// speed index 4" in the one-based prose of §4.G is [`NORMAL_SPEED_INDEX`].
const SPEEDS: [i32; 7] = [-8, -4, -2, 1, 2, 4, 12];

/// Index of normal forward speed (`1`) within [`SPEEDS`].
const NORMAL_SPEED_INDEX: usize = 3;

/// I-frame stride factor for trick-play reads (`spec.md` §4.G: "stride ≈
/// ±round(0.4 · fps)"). Applied to the fps-independent `abs(speed)`
/// multiplier rather than to a real per-recording fps, since none is
/// threaded through `RecordingIndex`.
const TRICK_STRIDE_FACTOR: f64 = 0.4 * NOMINAL_FPS as f64;

// ---------------------------------------------------------------------
// Non-blocking file reader
// ---------------------------------------------------------------------

struct PendingRead {
    file_number: u16,
    offset: u64,
    max_len: usize,
}

struct ReaderBox {
    request: Option<PendingRead>,
    outcome: Option<std::io::Result<Vec<u8>>>,
}

/// A dedicated worker thread that services file reads for the engine
/// thread so the engine's main loop never blocks on I/O (`spec.md` §4.G,
/// §5: "a second thread that services `request(file, length)` and posts
/// results asynchronously").
struct NonBlockingReader {
    file: Arc<dyn RecordingFile>,
    state: Mutex<ReaderBox>,
    posted: Condvar,
    ready: Condvar,
    running: AtomicBool,
    open_file: Mutex<Option<u16>>,
}

impl NonBlockingReader {
    fn new(file: Arc<dyn RecordingFile>) -> Arc<Self> {
        Arc::new(Self {
            file,
            state: Mutex::new(ReaderBox { request: None, outcome: None }),
            posted: Condvar::new(),
            ready: Condvar::new(),
            running: AtomicBool::new(true),
            open_file: Mutex::new(None),
        })
    }

    /// Posts a read request, waking the worker thread. The engine never
    /// has more than one read in flight, so any unclaimed prior outcome is
    /// discarded.
    fn request(&self, file_number: u16, offset: u64, max_len: usize) {
        let mut state = self.state.lock();
        state.request = Some(PendingRead { file_number, offset, max_len });
        state.outcome = None;
        self.posted.notify_one();
    }

    /// Waits up to `ms` for the posted request to complete (`spec.md` §5:
    /// "calls `wait_for_data_ms(3)`"), returning its outcome if one landed
    /// within the window.
    fn wait_for_data_ms(&self, ms: u64) -> Option<std::io::Result<Vec<u8>>> {
        let mut state = self.state.lock();
        if state.outcome.is_none() {
            self.ready.wait_for(&mut state, Duration::from_millis(ms));
        }
        state.outcome.take()
    }

    fn run(self: Arc<Self>) {
        while self.running.load(Ordering::Acquire) {
            let request = {
                let mut state = self.state.lock();
                if state.request.is_none() {
                    // spec.md §5: "waits on a condition variable with 1-s timeout"
                    self.posted.wait_for(&mut state, Duration::from_secs(1));
                }
                state.request.take()
            };
            let Some(request) = request else { continue };

            let mut open_file = self.open_file.lock();
            if *open_file != Some(request.file_number) && !self.file.open(request.file_number) {
                drop(open_file);
                self.post_outcome(Err(std::io::Error::new(std::io::ErrorKind::NotFound, "recording file not found")));
                continue;
            }
            *open_file = Some(request.file_number);
            drop(open_file);

            let outcome = self.file.read_at(request.file_number, request.offset, request.max_len);
            self.post_outcome(outcome);
        }
    }

    fn post_outcome(&self, outcome: std::io::Result<Vec<u8>>) {
        let mut state = self.state.lock();
        state.outcome = Some(outcome);
        drop(state);
        self.ready.notify_one();
    }

    fn cancel(&self) {
        self.running.store(false, Ordering::Release);
        self.posted.notify_one();
    }
}

// ---------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------

/// Coarse playback mode. Direction and rate live in [`EngineState::speed_index`]
/// (`spec.md` §4.G folds direction into the speed table's sign); this
/// enum only distinguishes whether the reader is advancing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Playing,
    Paused,
    /// One frame was decoded and the decoder is frozen on it (`goto(pos,
    /// true)`); becomes `Paused` once that single frame reaches the ring's
    /// consumer step.
    Still,
}

/// A read in flight, or a built frame waiting for ring space.
enum Pending {
    Reading { frame_index: i64, independent: bool },
    Ready(Frame),
}

struct EngineState {
    mode: Mode,
    speed_index: usize,
    /// The next frame index to request (forward) or the one just fed
    /// (backward bookkeeping uses the same field; see `plan_next_read`).
    frame_index: i64,
    pending: Option<Pending>,
    /// Progress into the oldest ring frame's bytes, for partial decoder
    /// writes (`spec.md` §4.G step 3).
    feed_offset: usize,
    /// When we first noticed the decoder's STC had stopped advancing at
    /// EOF (`spec.md` §4.G step 5).
    stuck_since: Option<Instant>,
    last_stc: i64,
    /// Sequential read position used only when `RecordingIndex::ok()` is
    /// false (`spec.md` §7: "Index-file missing ... reads up to
    /// MAXFRAMESIZE blind").
    blind_file: u16,
    blind_offset: u64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            mode: Mode::Paused,
            speed_index: NORMAL_SPEED_INDEX,
            frame_index: 0,
            pending: None,
            feed_offset: 0,
            stuck_since: None,
            last_stc: 0,
            blind_file: 0,
            blind_offset: 0,
        }
    }

    fn direction_forward(&self) -> bool {
        SPEEDS[self.speed_index] >= 0
    }

    /// Resets everything the "direction change flushes ring + PTS index"
    /// ordering guarantee (`spec.md` §5) covers.
    fn reset_in_flight(&mut self) {
        self.pending = None;
        self.feed_offset = 0;
        self.stuck_since = None;
    }
}

/// The threaded trick-play engine over one recording (`spec.md` §4.G).
/// Owns its reader thread and its [`NonBlockingReader`]'s worker thread;
/// both are started by [`Engine::start`] and stopped by [`Engine::stop`].
pub struct Engine {
    device: Arc<Device>,
    index: Arc<dyn RecordingIndex>,
    reader: Arc<NonBlockingReader>,
    ring: Arc<FrameRing>,
    pts_index: Arc<PtsIndex>,
    state: Mutex<EngineState>,
    running: AtomicBool,
    engine_thread: StdMutex<Option<JoinHandle<()>>>,
    reader_thread: StdMutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Builds an idle engine. Call [`Engine::start`] to begin reading.
    pub fn new(device: Arc<Device>, index: Arc<dyn RecordingIndex>, file: Arc<dyn RecordingFile>) -> Arc<Self> {
        let ring_capacity = config::current().max_frame_size * 4;
        Arc::new(Self {
            device,
            index,
            reader: NonBlockingReader::new(file),
            ring: Arc::new(FrameRing::new(ring_capacity)),
            pts_index: Arc::new(PtsIndex::new()),
            state: Mutex::new(EngineState::new()),
            running: AtomicBool::new(false),
            engine_thread: StdMutex::new(None),
            reader_thread: StdMutex::new(None),
        })
    }

    /// Restores the saved resume position (snapped to the preceding
    /// I-frame, backed off by `resume_backup_seconds`) and starts both
    /// threads (`spec.md` §4.G: "Resume").
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if let Some(resume) = self.index.get_resume() {
                state.frame_index = self.backed_off_iframe(resume);
            }
            state.mode = Mode::Playing;
        }
        self.running.store(true, Ordering::Release);

        let reader = Arc::clone(&self.reader);
        *self.reader_thread.lock().unwrap() = Some(thread::spawn(move || reader.run()));

        let engine = Arc::clone(self);
        *self.engine_thread.lock().unwrap() = Some(thread::spawn(move || engine.run()));
    }

    /// Saves the resume position, cancels both threads, and joins them
    /// with the deadlines `spec.md` §5 names (9 s engine, 3 s reader).
    pub fn stop(&self) {
        {
            let state = self.state.lock();
            let current = self.pts_index.find(self.device.stc() as u32);
            let resume = self.backed_off_iframe(current);
            drop(state);
            self.index.store_resume(resume);
        }
        self.running.store(false, Ordering::Release);
        self.reader.cancel();
        if let Some(handle) = self.engine_thread.lock().unwrap().take() {
            join_with_deadline(handle, Duration::from_secs(9), "playback engine");
        }
        if let Some(handle) = self.reader_thread.lock().unwrap().take() {
            join_with_deadline(handle, Duration::from_secs(3), "non-blocking reader");
        }
    }

    fn backed_off_iframe(&self, frame: i64) -> i64 {
        let backoff = i64::from(config::current().resume_backup_seconds) * NOMINAL_FPS;
        let target = (frame - backoff).max(0);
        self.index.get_next_iframe(target, false).map(|(idx, _)| idx).unwrap_or(target)
    }

    /// Resumes normal-speed forward play.
    pub fn play(&self) {
        let mut state = self.state.lock();
        let changed = state.speed_index != NORMAL_SPEED_INDEX || state.mode != Mode::Playing;
        state.speed_index = NORMAL_SPEED_INDEX;
        state.mode = Mode::Playing;
        if changed {
            state.reset_in_flight();
        }
        self.device.driver().play();
    }

    /// Freezes on the current frame.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        state.mode = Mode::Paused;
        self.device.driver().freeze();
    }

    /// Cycles the speed table one step toward faster forward (multi-speed
    /// mode) or jumps straight to the fastest forward entry (single-speed
    /// mode) — `spec.md` §4.G.
    pub fn forward(&self) {
        let mut state = self.state.lock();
        self.cycle(&mut state, true);
    }

    /// Cycles the speed table one step toward faster backward, or jumps
    /// straight to it in single-speed mode.
    pub fn backward(&self) {
        let mut state = self.state.lock();
        self.cycle(&mut state, false);
    }

    fn cycle(&self, state: &mut EngineState, toward_forward: bool) {
        let was_forward = state.direction_forward();
        let cfg = config::current();
        state.speed_index = if cfg.multi_speed_mode {
            if toward_forward {
                (state.speed_index + 1).min(SPEEDS.len() - 1)
            } else {
                state.speed_index.saturating_sub(1)
            }
        } else if toward_forward {
            SPEEDS.len() - 1
        } else {
            0
        };
        state.mode = Mode::Playing;
        if state.direction_forward() != was_forward {
            self.ring.clear();
            self.pts_index.clear();
            state.reset_in_flight();
        }
        self.apply_trick_speed(state.speed_index);
    }

    fn apply_trick_speed(&self, speed_index: usize) {
        let driver = self.device.driver();
        if speed_index == NORMAL_SPEED_INDEX {
            driver.play();
        } else {
            driver.trick_speed(SPEEDS[speed_index].clamp(-63, 63));
        }
    }

    /// Jumps `n` frames relative to the current position (may be negative).
    pub fn skip_frames(&self, n: i64) {
        let mut state = self.state.lock();
        let target = (state.frame_index + n).max(0);
        self.seek(&mut state, target, false);
    }

    /// Jumps `s` seconds relative to the current position, using the
    /// nominal frame rate.
    pub fn skip_seconds(&self, s: i64) {
        self.skip_frames(s * NOMINAL_FPS);
    }

    /// Jumps to an absolute frame index. When `still`, the engine decodes
    /// exactly that frame and then freezes (`spec.md` §4.G: `goto(pos,
    /// still)`).
    pub fn goto(&self, pos: i64, still: bool) {
        let mut state = self.state.lock();
        self.seek(&mut state, pos.max(0), still);
    }

    fn seek(&self, state: &mut EngineState, target: i64, still: bool) {
        state.frame_index = target;
        state.reset_in_flight();
        self.ring.clear();
        self.pts_index.clear();
        self.device.clear();
        state.mode = if still { Mode::Still } else { Mode::Playing };
        if !still {
            self.apply_trick_speed(state.speed_index);
        }
    }

    /// Current position and the recording's last frame index (`spec.md`
    /// §4.G: "Position queries").
    pub fn get_index(&self) -> (i64, i64) {
        let current = self.pts_index.find(self.device.stc() as u32);
        (current, self.index.last())
    }

    /// The engine thread body: the five-step loop of `spec.md` §4.G.
    fn run(self: Arc<Self>) {
        while self.running.load(Ordering::Acquire) {
            let mode = self.state.lock().mode;
            if mode != Mode::Playing {
                thread::sleep(Duration::from_millis(3));
                continue;
            }

            if !self.ensure_read_in_flight() {
                // EOF handled inside; `handle_eof` only flips `mode` once
                // `max_stuck_at_eof` has elapsed, so without a sleep here
                // this spins at 100% CPU for the whole stuck-at-EOF window.
                thread::sleep(Duration::from_millis(3));
                continue;
            }
            self.poll_reader();
            self.feed_decoder();
        }
    }

    /// Step 1/2: if nothing is being built, plan and post the next read;
    /// if a read already completed, frame it and offer it to the ring.
    /// Returns `false` when the recording has no more frames in the
    /// current direction (EOF handling already run).
    fn ensure_read_in_flight(&self) -> bool {
        let mut state = self.state.lock();
        if state.pending.is_none() {
            match self.plan_next_read(&state) {
                Some((frame_index, file_number, offset, max_len, independent)) => {
                    self.reader.request(file_number, offset, max_len);
                    state.pending = Some(Pending::Reading { frame_index, independent });
                }
                None => {
                    drop(state);
                    self.handle_eof();
                    return false;
                }
            }
        }
        true
    }

    fn plan_next_read(&self, state: &EngineState) -> Option<(i64, u16, u64, usize, bool)> {
        let cfg = config::current();
        if !self.index.ok() {
            return Some((state.frame_index, state.blind_file, state.blind_offset, cfg.max_frame_size, false));
        }

        let forward = state.direction_forward();
        let trick = state.speed_index != NORMAL_SPEED_INDEX;
        let ibp = trick && forward && self.device.driver().has_ibp_trick_speed();

        let frame_index = if trick && !ibp {
            let stride = (TRICK_STRIDE_FACTOR * SPEEDS[state.speed_index].unsigned_abs() as f64 / SPEEDS[NORMAL_SPEED_INDEX + 1] as f64)
                .round()
                .max(1.0) as i64;
            let target = if forward { state.frame_index + stride } else { state.frame_index - stride };
            self.index.get_next_iframe(target.max(0), forward)?.0
        } else if !forward {
            if state.frame_index <= 0 {
                return None;
            }
            state.frame_index - 1
        } else {
            state.frame_index
        };

        let entry = self.index.get(frame_index)?;
        let max_len = if entry.length < 0 { cfg.max_frame_size } else { (entry.length as usize).min(cfg.max_frame_size) };
        Some((frame_index, entry.file_number, entry.file_offset, max_len, entry.independent))
    }

    /// Step 2: poll the non-blocking reader; when it completes, wrap the
    /// bytes into a [`Frame`] and offer it to the ring (retrying the same
    /// built frame next iteration if the ring was full).
    fn poll_reader(&self) {
        let mut state = self.state.lock();
        let frame = match &state.pending {
            Some(Pending::Reading { frame_index, independent }) => {
                let (frame_index, independent) = (*frame_index, *independent);
                drop(state);
                let Some(outcome) = self.reader.wait_for_data_ms(3) else { return };
                state = self.state.lock();
                match outcome {
                    Ok(bytes) => {
                        let bytes = bytes::Bytes::from(bytes);
                        let pts = extract_pts(&bytes);
                        Some(match (independent, pts) {
                            (true, Some(pts)) => Frame::independent(bytes, frame_index, pts),
                            _ => Frame::dependent(bytes, frame_index, pts),
                        })
                    }
                    Err(err) => {
                        log::error!("playback: fatal read error: {err}");
                        self.running.store(false, Ordering::Release);
                        return;
                    }
                }
            }
            Some(Pending::Ready(_)) => {
                let Some(Pending::Ready(frame)) = state.pending.take() else { unreachable!() };
                Some(frame)
            }
            None => None,
        };

        let Some(frame) = frame else { return };
        let forward = state.direction_forward();
        if !self.index.ok() {
            state.blind_offset += frame.len() as u64;
        } else {
            state.frame_index = if forward { frame.index + 1 } else { frame.index };
        }
        match self.ring.put(frame) {
            Ok(()) => state.pending = None,
            Err(frame) => state.pending = Some(Pending::Ready(frame)),
        }
    }

    /// Step 3/4: feed the oldest ring frame to the decoder, honoring
    /// partial writes, and record its PTS once fully delivered.
    fn feed_decoder(&self) {
        let Some(frame) = self.ring.front() else { return };
        let ts_aligned = !frame.bytes.is_empty() && frame.bytes.len() % TS_PACKET_SIZE == 0 && frame.bytes[0] == SYNC_BYTE;

        let mut state = self.state.lock();
        let offset = state.feed_offset;

        let consumed_all = if ts_aligned {
            let mut pos = offset;
            loop {
                if pos >= frame.bytes.len() {
                    break true;
                }
                let packet = &frame.bytes[pos..pos + TS_PACKET_SIZE];
                if self.device.play_ts(packet, false) == 0 {
                    state.feed_offset = pos;
                    drop(state);
                    self.device.poll(10);
                    return;
                }
                pos += TS_PACKET_SIZE;
            }
        } else {
            let consumed = self.device.play_pes(&frame.bytes[offset..], false);
            if consumed == 0 {
                drop(state);
                self.device.poll(10);
                return;
            }
            state.feed_offset += consumed;
            state.feed_offset >= frame.bytes.len()
        };

        if !consumed_all {
            return;
        }

        if let Some(pts) = frame.pts {
            self.pts_index.put(pts, frame.index);
        }
        state.feed_offset = 0;
        let still = state.mode == Mode::Still;
        drop(state);
        self.ring.drop_front();

        if still {
            self.device.driver().freeze();
            self.state.lock().mode = Mode::Paused;
        }
    }

    /// Step 5: stick the last frame in the decoder until the STC stops
    /// advancing for `max_stuck_at_eof`; forward stops, backward resumes
    /// normal play.
    fn handle_eof(&self) {
        let cfg = config::current();
        let mut state = self.state.lock();
        let forward = state.direction_forward();
        let stc = self.device.stc();
        let stuck_since = *state.stuck_since.get_or_insert_with(Instant::now);
        if stc != state.last_stc {
            state.stuck_since = Some(Instant::now());
            state.last_stc = stc;
            return;
        }
        state.last_stc = stc;
        if stuck_since.elapsed() < cfg.max_stuck_at_eof {
            return;
        }
        if forward {
            log::info!("playback: reached end of recording, stopping");
            state.mode = Mode::Paused;
            self.running.store(false, Ordering::Release);
        } else {
            log::info!("playback: reached start of recording, resuming normal play");
            state.speed_index = NORMAL_SPEED_INDEX;
            state.mode = Mode::Playing;
            state.stuck_since = None;
            drop(state);
            self.device.driver().play();
        }
    }
}

/// Extracts a PTS from either a TS-aligned frame (first packet carrying
/// payload-unit-start) or a bare PES frame.
fn extract_pts(bytes: &bytes::Bytes) -> Option<u32> {
    if !bytes.is_empty() && bytes.len() % TS_PACKET_SIZE == 0 && bytes[0] == SYNC_BYTE {
        ts_get_pts(&bytes[..TS_PACKET_SIZE], TS_PACKET_SIZE)
    } else {
        pes_get_pts(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::InMemoryChannelCamRelations;
    use crate::device::driver::dummy::DummyDriver;
    use crate::external::IndexEntry;
    use parking_lot::Mutex as PMutex;
    use std::collections::HashMap;

    struct FakeIndex {
        entries: HashMap<i64, IndexEntry>,
        last: i64,
        resume: PMutex<Option<i64>>,
        ok: bool,
    }

    impl RecordingIndex for FakeIndex {
        fn get(&self, frame: i64) -> Option<IndexEntry> {
            self.entries.get(&frame).copied()
        }
        fn get_next_iframe(&self, frame: i64, forward: bool) -> Option<(i64, IndexEntry)> {
            let mut keys: Vec<i64> = self.entries.keys().copied().filter(|&k| self.entries[&k].independent).collect();
            keys.sort_unstable();
            if forward {
                keys.into_iter().find(|&k| k >= frame).map(|k| (k, self.entries[&k]))
            } else {
                keys.into_iter().rev().find(|&k| k <= frame).map(|k| (k, self.entries[&k]))
            }
        }
        fn last(&self) -> i64 {
            self.last
        }
        fn get_resume(&self) -> Option<i64> {
            *self.resume.lock()
        }
        fn store_resume(&self, frame: i64) {
            *self.resume.lock() = Some(frame);
        }
        fn ok(&self) -> bool {
            self.ok
        }
        fn is_still_recording(&self) -> bool {
            false
        }
    }

    struct FakeFile {
        files: HashMap<u16, Vec<u8>>,
        opened: PMutex<Option<u16>>,
    }

    impl RecordingFile for FakeFile {
        fn open(&self, file_number: u16) -> bool {
            if self.files.contains_key(&file_number) {
                *self.opened.lock() = Some(file_number);
                true
            } else {
                false
            }
        }
        fn read_at(&self, file_number: u16, offset: u64, max_len: usize) -> std::io::Result<Vec<u8>> {
            let data = self.files.get(&file_number).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))?;
            let start = (offset as usize).min(data.len());
            let end = (start + max_len).min(data.len());
            Ok(data[start..end].to_vec())
        }
    }

    fn fresh_device() -> Arc<Device> {
        let driver = Arc::new(DummyDriver::new());
        Device::new(0, driver, Arc::new(InMemoryChannelCamRelations::new()), true)
    }

    fn bare_pes(payload: &[u8]) -> Vec<u8> {
        let mut b = vec![0x00, 0x00, 0x01, 0xE0];
        let packet_length = (3 + payload.len()) as u16;
        b.extend_from_slice(&packet_length.to_be_bytes());
        b.push(0x80);
        b.push(0x00);
        b.push(0x00);
        b.extend_from_slice(payload);
        b
    }

    #[test]
    fn non_blocking_reader_round_trips_a_request() {
        let mut files = HashMap::new();
        files.insert(0u16, vec![1, 2, 3, 4, 5]);
        let file = Arc::new(FakeFile { files, opened: PMutex::new(None) });
        let reader = NonBlockingReader::new(file);
        let worker = Arc::clone(&reader);
        let handle = thread::spawn(move || worker.run());

        reader.request(0, 1, 3);
        let outcome = reader.wait_for_data_ms(500).expect("outcome posted within timeout");
        assert_eq!(outcome.unwrap(), vec![2, 3, 4]);

        reader.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn non_blocking_reader_reports_missing_file() {
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let reader = NonBlockingReader::new(file);
        let worker = Arc::clone(&reader);
        let handle = thread::spawn(move || worker.run());

        reader.request(7, 0, 10);
        let outcome = reader.wait_for_data_ms(500).expect("outcome posted within timeout");
        assert!(outcome.is_err());

        reader.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn forward_cycles_one_step_in_multi_speed_mode() {
        config::set(config::Config { multi_speed_mode: true, ..config::Config::default() });
        let device = fresh_device();
        let index = Arc::new(FakeIndex { entries: HashMap::new(), last: 0, resume: PMutex::new(None), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        engine.forward();
        assert_eq!(engine.state.lock().speed_index, NORMAL_SPEED_INDEX + 1);
        engine.forward();
        assert_eq!(engine.state.lock().speed_index, NORMAL_SPEED_INDEX + 2);
        config::set(config::Config::default());
    }

    #[test]
    fn forward_jumps_to_fastest_entry_in_single_speed_mode() {
        config::set(config::Config { multi_speed_mode: false, ..config::Config::default() });
        let device = fresh_device();
        let index = Arc::new(FakeIndex { entries: HashMap::new(), last: 0, resume: PMutex::new(None), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        engine.forward();
        assert_eq!(engine.state.lock().speed_index, SPEEDS.len() - 1);
        config::set(config::Config::default());
    }

    #[test]
    fn direction_change_flushes_ring_and_pts_index() {
        let device = fresh_device();
        let index = Arc::new(FakeIndex { entries: HashMap::new(), last: 0, resume: PMutex::new(None), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        engine.pts_index.put(42, 7);
        engine.ring.put(Frame::dependent(bytes::Bytes::from_static(b"x"), 1, None)).unwrap();
        assert!(!engine.ring.is_empty());

        engine.backward(); // one step down from normal speed (index 3 -> 2) flips the sign
        assert!(engine.ring.is_empty());
        assert_eq!(engine.pts_index.find(999), 0);
    }

    #[test]
    fn goto_still_seeks_and_marks_still_mode() {
        let device = fresh_device();
        let index = Arc::new(FakeIndex { entries: HashMap::new(), last: 100, resume: PMutex::new(None), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        engine.goto(50, true);
        let state = engine.state.lock();
        assert_eq!(state.frame_index, 50);
        assert_eq!(state.mode, Mode::Still);
    }

    #[test]
    fn get_index_reports_pts_index_lookup_and_last_frame() {
        let device = fresh_device();
        let index = Arc::new(FakeIndex { entries: HashMap::new(), last: 900, resume: PMutex::new(None), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        engine.pts_index.put(1000, 200);
        let (current, total) = engine.get_index();
        assert_eq!(current, 200);
        assert_eq!(total, 900);
    }

    #[test]
    fn resume_backs_off_and_snaps_to_preceding_iframe() {
        let device = fresh_device();
        let mut entries = HashMap::new();
        entries.insert(0, IndexEntry { file_number: 0, file_offset: 0, independent: true, length: 10 });
        entries.insert(50, IndexEntry { file_number: 0, file_offset: 10, independent: true, length: 10 });
        entries.insert(300, IndexEntry { file_number: 0, file_offset: 20, independent: true, length: 10 });
        let index = Arc::new(FakeIndex { entries, last: 300, resume: PMutex::new(Some(300)), ok: true });
        let file = Arc::new(FakeFile { files: HashMap::new(), opened: PMutex::new(None) });
        let engine = Engine::new(device, index, file);

        // resume_backup_seconds(10) * NOMINAL_FPS(25) = 250; 300 - 250 = 50,
        // which is itself an I-frame.
        let backed_off = engine.backed_off_iframe(300);
        assert_eq!(backed_off, 50);
    }

    #[test]
    fn extract_pts_reads_from_a_bare_pes_frame() {
        let pes = bare_pes(&[1, 2, 3]);
        assert_eq!(extract_pts(&bytes::Bytes::from(pes)), None);
    }
}
