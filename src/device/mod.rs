//! Per-tuner device: PID filter table, receiver slots, DVR fan-out thread,
//! track table, and decoder interface (`spec.md` §3, §4.E). The largest
//! single component of the core (§2: "30%").
//!
//! Hardware specifics live behind [`driver::DeviceDriver`] (Design Notes §9:
//! "The Device subclass hierarchy ... becomes a single `Device` struct
//! holding a 'driver' capability object"); this module is the one concrete
//! `Device` type every tuner kind (and the dummy test driver) shares.

pub mod driver;
pub mod fanout;
pub mod pid_table;
pub mod ps1;
pub mod scramble;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::cam::{CamSlot, ChannelCamRelations, IDLE_PRIORITY};
use crate::channel::{Channel, ChannelId, Pid};
use crate::config;
use crate::receiver::{Receiver, ReceiverHandle};
use crate::track::{Track, TrackKind, TrackTable};
use crate::ts::{ts_pid, PatPmtParser, PesReassembler, TS_PACKET_SIZE};

use driver::{DeviceDriver, PlayMode};
use pid_table::{PidSlotKind, PidTable};
use ps1::Ps1Counter;
use scramble::ScrambleDetector;

/// Fixed size of the receiver slot table (`spec.md` §3: `receivers[MAXRECEIVERS]`).
pub const MAX_RECEIVERS: usize = 16;

/// Priority floor added when a device is primary and displaying live TV
/// (`spec.md` §4.E: "plus a floor of TRANSFER ... Idle otherwise").
pub const TRANSFER_PRIORITY: i32 = 0;

/// Outcome of [`Device::set_channel`]/[`Device::switch_channel`] (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetChannelResult {
    /// Tuned successfully.
    Ok,
    /// This device cannot provide the channel at all.
    NotAvailable,
    /// The channel needed Transfer mode and no source device was available.
    NoTransfer,
    /// The hardware rejected the tuning request.
    Failed,
}

/// The non-owning "player" side of the Device↔Player coupling (Design Notes
/// §9): whatever currently owns `attach_player` gets an activation callback,
/// symmetric to [`Receiver::activate`].
pub trait Player: Send + Sync {
    /// Called by the device on attach (`true`) and detach (`false`).
    fn activate(&self, on: bool);
}

struct AttachedReceiver {
    receiver: Arc<dyn Receiver>,
    pids: Vec<Pid>,
    attached: Arc<AtomicBool>,
}

/// A per-tuner device (`spec.md` §3, §4.E). Created once at startup by the
/// process-wide registry ([`crate::context::RuntimeContext`]), never copied.
pub struct Device {
    card_index: u32,
    primary: AtomicBool,
    driver: Arc<dyn DeviceDriver>,
    cam_relations: Arc<dyn ChannelCamRelations>,

    pid_table: Mutex<PidTable>,
    receivers: Mutex<Vec<Option<AttachedReceiver>>>,
    running: Arc<AtomicBool>,
    fanout_thread: StdMutex<Option<JoinHandle<()>>>,

    current_channel: Mutex<Option<Channel>>,
    live_view: AtomicBool,

    audio_tracks: Mutex<TrackTable>,
    dolby_tracks: Mutex<TrackTable>,
    subtitle_tracks: Mutex<TrackTable>,
    current_audio_is_dolby: AtomicBool,

    cam_slot: Mutex<Option<Arc<dyn CamSlot>>>,
    scramble: Mutex<ScrambleDetector>,

    player: Mutex<Option<Arc<dyn Player>>>,

    pat_pmt: Mutex<PatPmtParser>,
    video_reasm: Mutex<PesReassembler>,
    audio_reasm: Mutex<PesReassembler>,
    subtitle_reasm: Mutex<PesReassembler>,
    ps1: Mutex<Ps1Counter>,

    occupied_until: Mutex<Option<Instant>>,
    transfer_source: AtomicBool,
}

impl Device {
    /// Builds a device around `driver`, wired to `cam_relations` for
    /// recording scramble-detection outcomes (`spec.md` §4.E).
    pub fn new(card_index: u32, driver: Arc<dyn DeviceDriver>, cam_relations: Arc<dyn ChannelCamRelations>, primary: bool) -> Arc<Self> {
        let mut receivers = Vec::with_capacity(MAX_RECEIVERS);
        receivers.resize_with(MAX_RECEIVERS, || None);
        Arc::new(Self {
            card_index,
            primary: AtomicBool::new(primary),
            driver,
            cam_relations,
            pid_table: Mutex::new(PidTable::new()),
            receivers: Mutex::new(receivers),
            running: Arc::new(AtomicBool::new(false)),
            fanout_thread: StdMutex::new(None),
            current_channel: Mutex::new(None),
            live_view: AtomicBool::new(false),
            audio_tracks: Mutex::new(TrackTable::new()),
            dolby_tracks: Mutex::new(TrackTable::new()),
            subtitle_tracks: Mutex::new(TrackTable::new()),
            current_audio_is_dolby: AtomicBool::new(false),
            cam_slot: Mutex::new(None),
            scramble: Mutex::new(ScrambleDetector::new()),
            player: Mutex::new(None),
            pat_pmt: Mutex::new(PatPmtParser::new()),
            video_reasm: Mutex::new(PesReassembler::new()),
            audio_reasm: Mutex::new(PesReassembler::new()),
            subtitle_reasm: Mutex::new(PesReassembler::new()),
            ps1: Mutex::new(Ps1Counter::new()),
            occupied_until: Mutex::new(None),
            transfer_source: AtomicBool::new(false),
        })
    }

    /// Stable hardware card index.
    pub fn card_index(&self) -> u32 {
        self.card_index
    }

    /// Whether this is the process's one primary device.
    pub fn is_primary(&self) -> bool {
        self.primary.load(Ordering::Acquire)
    }

    /// Marks (or unmarks) this device as primary. The registry is
    /// responsible for ensuring exactly one device is primary at a time.
    pub fn set_primary(&self, primary: bool) {
        self.primary.store(primary, Ordering::Release);
    }

    /// The channel currently tuned, if any.
    pub fn current_channel(&self) -> Option<Channel> {
        self.current_channel.lock().clone()
    }

    /// The CAM slot currently assigned, if any.
    pub fn cam_slot(&self) -> Option<Arc<dyn CamSlot>> {
        self.cam_slot.lock().clone()
    }

    /// Assigns (or releases, if `None`) a CAM slot, (re)starting the
    /// scramble detector on assignment.
    pub fn set_cam_slot(&self, slot: Option<Arc<dyn CamSlot>>) {
        let has_slot = slot.is_some();
        *self.cam_slot.lock() = slot;
        let mut sc = self.scramble.lock();
        if has_slot {
            sc.start(Instant::now());
        } else {
            sc.reset();
        }
    }

    /// The device's decoder System Time Clock.
    pub fn stc(&self) -> i64 {
        self.driver.get_stc()
    }

    /// Blocks up to `timeout_ms` for the decoder to accept more data
    /// (`spec.md` §4.G: used when the framed ring's consumer is stalled).
    pub fn poll(&self, timeout_ms: u64) -> bool {
        self.driver.poll(timeout_ms)
    }

    /// Flushes the decoder and stops playback.
    pub fn clear(&self) {
        self.driver.clear();
        self.video_reasm.lock().reset();
        self.audio_reasm.lock().reset();
        self.subtitle_reasm.lock().reset();
    }

    // -- Receiver attach/detach (`spec.md` §4.E public contract) --------

    /// Finds a free receiver slot, arms `receiver`'s PIDs (as
    /// [`PidSlotKind::Other`] filters — fixed video/audio/dolby/subtitle
    /// slots are armed separately by [`Device::set_channel`] for live
    /// viewing), and starts the fan-out thread if this is the first
    /// receiver. Rolls back and returns `None` on any PID add failure or if
    /// no receiver slot is free.
    pub fn attach(self: &Arc<Self>, receiver: Arc<dyn Receiver>) -> Option<ReceiverHandle> {
        let pids = receiver.pids().to_vec();
        let mut receivers = self.receivers.lock();
        let slot = receivers.iter().position(|r| r.is_none())?;

        let mut table = self.pid_table.lock();
        let mut armed = Vec::with_capacity(pids.len());
        for &pid in &pids {
            if table.add_pid(self.driver.as_ref(), pid, 0, PidSlotKind::Other) {
                armed.push(pid);
            } else {
                for p in armed {
                    table.del_pid(self.driver.as_ref(), p, PidSlotKind::Other);
                }
                return None;
            }
        }
        drop(table);

        let attached = Arc::new(AtomicBool::new(true));
        receivers[slot] = Some(AttachedReceiver { receiver: receiver.clone(), pids, attached: attached.clone() });
        drop(receivers);

        self.start_fanout();
        receiver.activate(true);
        Some(ReceiverHandle::new(Arc::downgrade(self), slot, attached))
    }

    /// Releases `handle`'s slot, decrements its PID refcounts, and stops the
    /// fan-out thread once no receivers remain.
    pub fn detach(&self, handle: &ReceiverHandle) {
        let slot = handle.slot();
        let entry = {
            let mut receivers = self.receivers.lock();
            receivers.get_mut(slot).and_then(Option::take)
        };
        let Some(entry) = entry else { return };
        let mut table = self.pid_table.lock();
        for pid in &entry.pids {
            table.del_pid(self.driver.as_ref(), *pid, PidSlotKind::Other);
        }
        drop(table);
        entry.receiver.activate(false);
        handle.mark_detached();
        entry.attached.store(false, Ordering::Release);
        self.stop_fanout_if_idle();
    }

    /// Detaches every attached receiver.
    pub fn detach_all(&self) {
        let mut receivers = self.receivers.lock();
        let mut table = self.pid_table.lock();
        for slot in receivers.iter_mut() {
            if let Some(entry) = slot.take() {
                for pid in &entry.pids {
                    table.del_pid(self.driver.as_ref(), *pid, PidSlotKind::Other);
                }
                entry.receiver.activate(false);
                entry.attached.store(false, Ordering::Release);
            }
        }
        drop(table);
        drop(receivers);
        self.stop_fanout_if_idle();
    }

    /// Detaches every receiver that wants `pid`.
    pub fn detach_all_for_pid(&self, pid: Pid) {
        let mut receivers = self.receivers.lock();
        let mut table = self.pid_table.lock();
        for slot in receivers.iter_mut() {
            let wants = slot.as_ref().is_some_and(|e| e.pids.contains(&pid));
            if wants {
                if let Some(entry) = slot.take() {
                    for p in &entry.pids {
                        table.del_pid(self.driver.as_ref(), *p, PidSlotKind::Other);
                    }
                    entry.receiver.activate(false);
                    entry.attached.store(false, Ordering::Release);
                }
            }
        }
        drop(table);
        drop(receivers);
        self.stop_fanout_if_idle();
    }

    fn start_fanout(self: &Arc<Self>) {
        let mut thread = self.fanout_thread.lock().unwrap();
        if thread.is_some() {
            return;
        }
        self.running.store(true, Ordering::Release);
        let device = self.clone();
        *thread = Some(std::thread::spawn(move || fanout::run(device)));
    }

    fn stop_fanout_if_idle(&self) {
        let idle = self.receivers.lock().iter().all(|r| r.is_none());
        if !idle {
            return;
        }
        self.running.store(false, Ordering::Release);
        let mut thread = self.fanout_thread.lock().unwrap();
        let Some(handle) = thread.take() else { return };
        // The fan-out thread's own scramble-detection path (`detach_all` ->
        // `stop_fanout_if_idle`) can land here while running on that very
        // thread; joining it would be a self-join deadlock. `running` is
        // already cleared above, so the loop in `fanout::run` will exit on
        // its own — just drop the handle and let it finish unjoined.
        if handle.thread().id() == std::thread::current().id() {
            drop(handle);
            return;
        }
        drop(thread);
        let _ = handle.join();
    }

    // -- Channel tuning (`spec.md` §4.E) ---------------------------------

    /// Tunes directly to `channel`, assuming this device's capability has
    /// already been confirmed (by [`crate::arbiter::Arbiter::choose`]).
    /// Does not itself dispatch to Transfer mode — see
    /// [`crate::transfer`] for the bridge that handles `NotAvailable` on a
    /// live-view request.
    pub fn set_channel(&self, channel: &Channel, live_view: bool) -> SetChannelResult {
        let provides = self.driver.provides_channel(channel, IDLE_PRIORITY);
        if !provides.provides {
            return SetChannelResult::NotAvailable;
        }
        if provides.needs_detach {
            self.detach_all();
        }
        self.pat_pmt.lock().reset();
        if !self.driver.set_channel_device(channel) {
            return SetChannelResult::Failed;
        }
        *self.current_channel.lock() = Some(channel.clone());
        if let Some(cam) = self.cam_slot.lock().clone() {
            cam.start_decrypting();
            self.scramble.lock().start(Instant::now());
        }
        if live_view {
            self.live_view.store(true, Ordering::Release);
            self.update_tracks(channel);
            let prefs = config::current().language_preferences;
            self.ensure_audio_track(false, &prefs);
            self.ensure_subtitle_track(&prefs);
        }
        SetChannelResult::Ok
    }

    /// Retries [`Device::set_channel`] up to 3 times on `Failed`. Does not
    /// surface user messages itself — callers route `NotAvailable`/`NoTransfer`
    /// through [`crate::external::SkinMessage`].
    pub fn switch_channel(&self, channel: &Channel, live_view: bool) -> SetChannelResult {
        for attempt in 0..3 {
            match self.set_channel(channel, live_view) {
                SetChannelResult::Failed if attempt < 2 => continue,
                other => return other,
            }
        }
        SetChannelResult::Failed
    }

    fn update_tracks(&self, channel: &Channel) {
        let audio = channel
            .audio_pids
            .iter()
            .enumerate()
            .map(|(i, lp)| Track::new(TrackKind::Audio, i, lp.pid, &lp.language, ""))
            .collect();
        let dolby = channel
            .dolby_pids
            .iter()
            .enumerate()
            .map(|(i, lp)| Track::new(TrackKind::Dolby, i, lp.pid, &lp.language, ""))
            .collect();
        let subtitle = channel
            .subtitle_pids
            .iter()
            .enumerate()
            .map(|(i, lp)| Track::new(TrackKind::Subtitle, i, lp.pid, &lp.language, ""))
            .collect();
        self.audio_tracks.lock().set_tracks(audio);
        self.dolby_tracks.lock().set_tracks(dolby);
        self.subtitle_tracks.lock().set_tracks(subtitle);
    }

    /// Selects audio track `index` from the currently-preferred table
    /// (normal or Dolby, per [`crate::config::Config::prefer_dolby`]).
    pub fn set_current_audio_track(&self, index: usize) -> bool {
        let use_dolby = self.current_audio_is_dolby.load(Ordering::Acquire);
        let mut table = if use_dolby { self.dolby_tracks.lock() } else { self.audio_tracks.lock() };
        table.select(index)
    }

    /// Selects subtitle track `index`. `manual` distinguishes an explicit
    /// user choice from the automatic language-preference selection (both
    /// take the same path here; the distinction matters to callers deciding
    /// whether to persist the choice).
    pub fn set_current_subtitle_track(&self, index: usize, manual: bool) -> bool {
        let _ = manual;
        self.subtitle_tracks.lock().select(index)
    }

    /// Ensures an audio track is selected, honoring the Dolby-preference
    /// flag and the language preference list. `force` reselects even if a
    /// track is already current.
    pub fn ensure_audio_track(&self, force: bool, language_preferences: &[String]) {
        let prefer_dolby = config::current().prefer_dolby;
        let dolby_available = !self.dolby_tracks.lock().is_empty();
        let use_dolby = prefer_dolby && dolby_available;
        self.current_audio_is_dolby.store(use_dolby, Ordering::Release);
        let mut table = if use_dolby { self.dolby_tracks.lock() } else { self.audio_tracks.lock() };
        if force || table.current().is_none() {
            table.select_by_language_preference(language_preferences);
        }
    }

    /// Ensures a subtitle track is selected per the language preference list.
    pub fn ensure_subtitle_track(&self, language_preferences: &[String]) {
        let mut table = self.subtitle_tracks.lock();
        if table.current().is_none() {
            table.select_by_language_preference(language_preferences);
        }
    }

    // -- Playback (`spec.md` §4.E) ---------------------------------------

    /// Attaches `player` as this device's playback target, optionally
    /// recording `channel` so [`Device::play_ts`] can route PIDs (Transfer
    /// mode feeds a device that was never itself tuned via
    /// [`Device::set_channel`], so it has no other way to learn which PIDs
    /// are video/audio/subtitle).
    pub fn attach_player(&self, player: Arc<dyn Player>, channel: Option<Channel>) -> bool {
        if !self.driver.can_replay() {
            return false;
        }
        if self.player.lock().is_some() {
            return false;
        }
        if let Some(channel) = channel {
            *self.current_channel.lock() = Some(channel);
        }
        self.pat_pmt.lock().reset();
        self.video_reasm.lock().reset();
        self.audio_reasm.lock().reset();
        self.subtitle_reasm.lock().reset();
        self.driver.set_play_mode(PlayMode::AudioVideo);
        *self.player.lock() = Some(player.clone());
        player.activate(true);
        true
    }

    /// Detaches the current player, if any.
    pub fn detach_player(&self) {
        if let Some(player) = self.player.lock().take() {
            player.activate(false);
            self.driver.clear();
            self.driver.set_play_mode(PlayMode::None);
        }
    }

    /// Feeds one 188-byte TS packet to the decoder, routing by PID through
    /// the per-stream-kind TS→PES reassemblers. Calling with an empty slice
    /// resets all three reassemblers and the PAT/PMT parser (`spec.md` §8,
    /// invariant 6) — used between channel/direction switches.
    ///
    /// Returns `TS_PACKET_SIZE` if the packet was accepted, or `0` if the
    /// decoder was saturated and the completed PES this packet closed out
    /// needs to be retried by the caller (Transfer mode backs off and
    /// resends; `spec.md` §4.H).
    pub fn play_ts(&self, data: &[u8], video_only: bool) -> usize {
        if data.is_empty() {
            self.video_reasm.lock().reset();
            self.audio_reasm.lock().reset();
            self.subtitle_reasm.lock().reset();
            self.pat_pmt.lock().reset();
            return 0;
        }
        if data.len() < TS_PACKET_SIZE {
            return 0;
        }
        let pid = ts_pid(data);
        self.pat_pmt.lock().put_ts(data);

        let channel = self.current_channel.lock().clone();
        let Some(channel) = channel else { return TS_PACKET_SIZE };

        let is_video = channel.video_pid != 0 && (pid == channel.video_pid || Some(pid) == self.pat_pmt.lock().vpid());
        let is_audio = channel.audio_pids.iter().any(|p| p.pid == pid) || channel.dolby_pids.iter().any(|p| p.pid == pid);
        let is_subtitle = channel.subtitle_pids.iter().any(|p| p.pid == pid);

        let mut accepted = true;
        if is_video {
            let pes = { let mut r = self.video_reasm.lock(); r.put_ts(data); r.get_pes() };
            if let Some(pes) = pes {
                let consumed = self.driver.play_video(&pes);
                if consumed < pes.len() {
                    self.video_reasm.lock().set_repeat_last();
                    accepted = false;
                }
            }
        } else if is_audio && !video_only {
            let pes = { let mut r = self.audio_reasm.lock(); r.put_ts(data); r.get_pes() };
            if let Some(pes) = pes {
                let consumed = self.play_pes(&pes, video_only);
                if consumed < pes.len() {
                    self.audio_reasm.lock().set_repeat_last();
                    accepted = false;
                }
            }
        } else if is_subtitle && !video_only {
            let pes = { let mut r = self.subtitle_reasm.lock(); r.put_ts(data); r.get_pes() };
            if let Some(pes) = pes {
                let consumed = self.driver.play_subtitle(&pes);
                if consumed < pes.len() {
                    self.subtitle_reasm.lock().set_repeat_last();
                    accepted = false;
                }
            }
        }
        if accepted {
            TS_PACKET_SIZE
        } else {
            0
        }
    }

    /// Feeds one whole PES packet directly to the decoder, dispatching on
    /// `stream_id` (used for PES-framed recordings that were never
    /// TS-multiplexed). `0xBD` (private stream 1) goes through
    /// [`Device::play_pes_packet`]'s sub-stream inspection.
    pub fn play_pes(&self, data: &[u8], video_only: bool) -> usize {
        if data.len() < 4 {
            return 0;
        }
        match data[3] {
            0xE0..=0xEF => self.driver.play_video(data),
            0xBD => self.play_pes_packet(data, video_only),
            0xC0..=0xDF if !video_only => self.driver.play_audio(data, data[3]),
            _ => 0,
        }
    }

    /// Handles a private-stream-1 (`0xBD`) PES packet: SPU, AC3/DTS, or LPCM
    /// sub-streams distinguished by the sub-stream-id byte at `data[8] + 9`
    /// (`spec.md` §4.E). Maintains the legacy pre-1.3.19-recording
    /// compatibility counter (`spec.md` §4.E, scenario S6): once it crosses
    /// [`ps1::MIN_PRE_1_3_19_PRIVATESTREAM`], every `0xBD` packet is treated
    /// as AC3 mono regardless of its sub-stream-id byte.
    pub fn play_pes_packet(&self, data: &[u8], video_only: bool) -> usize {
        if data.len() < 9 {
            return 0;
        }
        let header_data_len = data[8] as usize;
        let sub_idx = 9 + header_data_len;
        if sub_idx >= data.len() {
            return 0;
        }
        let sub_id = data[sub_idx];
        let recognized = matches!(sub_id, 0x20..=0x3F | 0x80..=0x8F | 0xA0..=0xAF);

        let mut ps1 = self.ps1.lock();
        if ps1.is_legacy_mode() {
            if recognized {
                ps1.note_known();
            } else {
                ps1.note_unknown();
            }
            drop(ps1);
            if video_only {
                return 0;
            }
            return self.driver.play_audio(data, 0xBD);
        }

        if recognized {
            ps1.note_known();
            drop(ps1);
            if video_only {
                return 0;
            }
            return match sub_id {
                0x20..=0x3F => self.driver.play_subtitle(data),
                _ => self.driver.play_audio(data, sub_id),
            };
        }

        ps1.note_unknown();
        let entered_legacy = ps1.is_legacy_mode();
        drop(ps1);
        if entered_legacy {
            log::info!("device {}: entering pre-1.3.19 PS1/AC3 compatibility mode", self.card_index);
            self.dolby_tracks.lock().set_tracks(vec![Track::new(TrackKind::Dolby, 0, 0, "", "AC3")]);
        }
        0
    }

    // -- Priority (`spec.md` §4.E) ----------------------------------------

    /// Max attached-receiver priority, plus a floor of [`TRANSFER_PRIORITY`]
    /// when this device is primary and displaying live TV.
    pub fn priority(&self) -> i32 {
        let receivers = self.receivers.lock();
        let max_receiver = receivers.iter().flatten().map(|r| r.receiver.priority()).max();
        drop(receivers);
        let floor = if self.is_primary() && self.live_view.load(Ordering::Acquire) {
            TRANSFER_PRIORITY
        } else {
            IDLE_PRIORITY
        };
        max_receiver.map(|p| p.max(floor)).unwrap_or(floor)
    }

    /// Whether the device has no attached receivers and isn't playing back.
    pub fn is_idle(&self) -> bool {
        self.receivers.lock().iter().all(|r| r.is_none()) && self.player.lock().is_none()
    }

    /// Whether the device currently has at least one attached receiver
    /// (`spec.md` §4.F, arbiter field "device is currently receiving").
    pub fn is_receiving(&self) -> bool {
        self.receivers.lock().iter().any(|r| r.is_some())
    }

    /// Whether this device is currently feeding a [`crate::transfer::Transfer`]
    /// bridge, rather than a plain recording/live-view receiver.
    pub fn is_transfer_source(&self) -> bool {
        self.transfer_source.load(Ordering::Acquire)
    }

    /// Marks (or unmarks) this device as the source side of a Transfer
    /// bridge. Called by [`crate::transfer::bridge`] on attach/detach.
    pub fn set_transfer_source(&self, on: bool) {
        self.transfer_source.store(on, Ordering::Release);
    }

    /// Access to the driver, for the arbiter's capability queries.
    pub fn driver(&self) -> &dyn DeviceDriver {
        self.driver.as_ref()
    }

    /// Sets the "occupied until" deadline (`spec.md` §5: `MAXOCCUPIEDTIMEOUT`).
    pub fn set_occupied_until(&self, deadline: Option<Instant>) {
        *self.occupied_until.lock() = deadline;
    }

    /// Whether the device's occupied-reservation window has expired.
    pub fn occupied_expired(&self, now: Instant) -> bool {
        match *self.occupied_until.lock() {
            Some(until) => now > until,
            None => true,
        }
    }
}
