//! Transfer-mode bridge (`spec.md` §4.H): forwards one device's live TS feed
//! into another device's decoder, for channels the target device's own
//! hardware cannot tune.
//!
//! A [`Transfer`] is attached as a [`Receiver`] on the source device and as
//! a [`Player`](crate::device::Player) on the target ("primary") device.
//! [`bridge`] wires both attachments up together and pushes a synthesized
//! PAT/PMT so the target decoder can lock onto the stream before it has
//! seen the real tables; every subsequently received TS packet is forwarded
//! straight through via `primary.play_ts`. No buffering is added — live-TV
//! latency is the invariant this bridge exists to preserve (`spec.md` §8,
//! invariant 7).
//!
//! [`switch_channel`] is the control-layer entry point that ties this
//! bridge to [`crate::arbiter::Arbiter`] and [`crate::device::Device::switch_channel`]:
//! it is what `spec.md` §4.E means by "`set_channel` ... dispatches to
//! Transfer mode via the arbiter" on a live-view request the target device
//! cannot satisfy itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::arbiter::Arbiter;
use crate::channel::{Channel, ChannelId, Pid};
use crate::context::RuntimeContext;
use crate::device::{Device, Player, SetChannelResult};
use crate::external::MessageLevel;
use crate::receiver::{Receiver, ReceiverHandle};
use crate::ts::PatPmtGenerator;

/// Number of times [`Transfer::forward`] retries a packet the primary
/// decoder rejects before giving up (`spec.md` §4.H, §5).
const MAX_RETRIES: u32 = 20;
/// Delay between retries (`spec.md` §4.H, §5).
const RETRY_WAIT: Duration = Duration::from_millis(5);

/// The bridge itself: a [`Receiver`] on the source device whose `receive`
/// forwards straight into the primary device's decoder, and a
/// [`Player`](crate::device::Player) on the primary device (a purely
/// passive role here — the primary never pulls anything from a `Transfer`,
/// it only needs somewhere to attach).
pub struct Transfer {
    channel: Channel,
    pids: Vec<Pid>,
    priority: i32,
    primary: Arc<Device>,
    active: AtomicBool,
}

impl Transfer {
    fn new(channel: Channel, priority: i32, primary: Arc<Device>) -> Arc<Self> {
        let mut pids = Vec::new();
        if channel.video_pid != 0 {
            pids.push(channel.video_pid);
        }
        pids.extend(channel.audio_pids.iter().map(|p| p.pid));
        pids.extend(channel.dolby_pids.iter().map(|p| p.pid));
        pids.extend(channel.subtitle_pids.iter().map(|p| p.pid));
        Arc::new(Self { channel, pids, priority, primary, active: AtomicBool::new(false) })
    }

    fn set_active(&self, on: bool) {
        self.active.store(on, Ordering::Release);
    }

    /// Synthesizes and pushes a PAT and every PMT packet for the bridged
    /// channel (`spec.md` §4.H, §4.C "supplement").
    fn push_pat_pmt(&self) {
        let generator = PatPmtGenerator::new(&self.channel);
        self.forward(&generator.pat());
        let mut index = 0;
        while let Some(pmt) = generator.pmt(index) {
            self.forward(&pmt);
            index += 1;
        }
    }

    /// Forwards one 188-byte TS packet to the primary decoder, retrying up
    /// to [`MAX_RETRIES`] times at [`RETRY_WAIT`] intervals if it reports
    /// saturation (`play_ts` returning `0`). On exhaustion, logs and clears
    /// the primary decoder to resynchronize (`spec.md` §4.H).
    fn forward(&self, packet: &[u8]) {
        for attempt in 0..MAX_RETRIES {
            if self.primary.play_ts(packet, false) > 0 {
                return;
            }
            if attempt + 1 < MAX_RETRIES {
                thread::sleep(RETRY_WAIT);
            }
        }
        log::warn!(
            "transfer: primary device {} rejected packet after {MAX_RETRIES} retries, clearing to resync",
            self.primary.card_index()
        );
        self.primary.clear();
    }
}

impl Receiver for Transfer {
    fn pids(&self) -> &[Pid] {
        &self.pids
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn channel_id(&self) -> ChannelId {
        self.channel.id
    }

    fn receive(&self, packet: &[u8]) {
        if self.active.load(Ordering::Acquire) {
            self.forward(packet);
        }
    }

    fn activate(&self, _on: bool) {}
}

impl Player for Transfer {
    fn activate(&self, _on: bool) {}
}

/// A live bridge: holds both attachments and tears them down together on
/// drop. The caller keeps this alive for as long as Transfer mode should
/// run; dropping it (or calling [`TransferHandle::stop`] explicitly) ends
/// the bridge.
pub struct TransferHandle {
    source: Arc<Device>,
    primary: Arc<Device>,
    receiver_handle: Option<ReceiverHandle>,
    transfer: Arc<Transfer>,
}

impl TransferHandle {
    /// The channel this bridge is forwarding.
    pub fn channel_id(&self) -> ChannelId {
        self.transfer.channel.id
    }

    /// The source device supplying the feed.
    pub fn source(&self) -> &Arc<Device> {
        &self.source
    }

    /// The primary device receiving it.
    pub fn primary(&self) -> &Arc<Device> {
        &self.primary
    }

    /// Tears the bridge down: stops forwarding, detaches the receiver from
    /// the source device, and detaches the player from the primary. Safe to
    /// call more than once; subsequent calls are no-ops.
    pub fn stop(&mut self) {
        self.transfer.set_active(false);
        if let Some(handle) = self.receiver_handle.take() {
            self.source.detach(&handle);
            self.source.set_transfer_source(false);
            self.primary.detach_player();
        }
    }
}

impl Drop for TransferHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wires a [`Transfer`] up between `source` (supplying the feed) and
/// `primary` (receiving it): attaches the bridge as a receiver on `source`,
/// as a player on `primary`, marks `source` as the transfer-mode feed
/// (`spec.md` §4.F: the arbiter's "device is the transfer-mode receiver"
/// bit), and pushes the synthesized PAT/PMT. Returns `None` if either
/// attachment is refused (`spec.md` §7: "Transfer start failure").
pub fn bridge(source: Arc<Device>, primary: Arc<Device>, channel: Channel, priority: i32) -> Option<TransferHandle> {
    let transfer = Transfer::new(channel.clone(), priority, primary.clone());
    let receiver: Arc<dyn Receiver> = transfer.clone();
    let receiver_handle = source.attach(receiver)?;
    source.set_transfer_source(true);

    let player: Arc<dyn Player> = transfer.clone();
    if !primary.attach_player(player, Some(channel)) {
        source.detach(&receiver_handle);
        source.set_transfer_source(false);
        return None;
    }

    transfer.set_active(true);
    transfer.push_pat_pmt();

    Some(TransferHandle { source, primary, receiver_handle: Some(receiver_handle), transfer })
}

/// Outcome of [`switch_channel`], mirroring [`SetChannelResult`] but
/// carrying the live [`TransferHandle`] when the switch went through
/// Transfer mode (the caller must keep it alive for the duration of the
/// live view).
pub enum SetChannelOutcome {
    /// Tuned directly, or bridged via Transfer mode. `transfer` is `Some`
    /// only in the bridged case.
    Ok {
        /// The live bridge, if this switch went through Transfer mode.
        transfer: Option<TransferHandle>,
    },
    /// Neither `device` nor any other device (directly or via Transfer) can
    /// provide the channel.
    NotAvailable,
    /// `device` cannot provide the channel and no source device was
    /// available to bridge from.
    NoTransfer,
    /// The hardware rejected the tuning request on `device` itself (this
    /// never falls back to Transfer mode — `spec.md` §4.E only dispatches
    /// to Transfer on `NotAvailable`, not `Failed`).
    Failed,
}

/// The control-layer entry point for channel switching (`spec.md` §4.E
/// `set_channel`'s Transfer dispatch, folded together with
/// [`Device::switch_channel`]'s retry and this crate's `SkinMessage`/
/// `StatusSink` reporting, since [`Device`] itself holds neither — see
/// Design Notes §9 on `RuntimeContext`).
///
/// Tries `device.switch_channel` first; if it reports `NotAvailable` for a
/// live-view request, asks the arbiter for a source device and bridges
/// through Transfer mode instead. Surfaces exactly the two
/// [`crate::external::SkinMessage`] categories `spec.md` §7 names:
/// "Channel not available" and "Can't start Transfer Mode".
pub fn switch_channel(
    ctx: &RuntimeContext,
    device: &Arc<Device>,
    channel: &Channel,
    priority: i32,
    live_view: bool,
) -> SetChannelOutcome {
    match device.switch_channel(channel, live_view) {
        SetChannelResult::Ok => {
            if live_view {
                ctx.status.channel_switch(device.card_index(), channel.number, true);
            }
            SetChannelOutcome::Ok { transfer: None }
        }
        SetChannelResult::Failed => SetChannelOutcome::Failed,
        SetChannelResult::NoTransfer => SetChannelOutcome::NoTransfer,
        SetChannelResult::NotAvailable if live_view => {
            let source = Arbiter::choose(ctx, channel, priority, true, false).filter(|d| !Arc::ptr_eq(d, device));
            let bridged = source.and_then(|source| bridge(source, device.clone(), channel.clone(), priority));
            match bridged {
                Some(handle) => {
                    ctx.status.channel_switch(device.card_index(), channel.number, true);
                    SetChannelOutcome::Ok { transfer: Some(handle) }
                }
                None => {
                    ctx.skin.message(MessageLevel::Error, "Can't start Transfer Mode");
                    SetChannelOutcome::NoTransfer
                }
            }
        }
        SetChannelResult::NotAvailable => {
            ctx.skin.message(MessageLevel::Error, "Channel not available");
            SetChannelOutcome::NotAvailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::InMemoryChannelCamRelations;
    use crate::device::driver::dummy::DummyDriver;
    use crate::device::driver::{DeviceDriver, ProvidesChannel, TsPoll};
    use crate::external::{ChannelCatalog, SkinMessage, StatusSink};
    use crate::ts::TS_PACKET_SIZE;
    use std::sync::Mutex as StdMutex;

    struct NoCatalog;
    impl ChannelCatalog for NoCatalog {
        fn get_by_number(&self, _number: u32) -> Option<Channel> {
            None
        }
        fn get_by_id(&self, _id: ChannelId) -> Option<Channel> {
            None
        }
    }
    struct NoStatus;
    impl StatusSink for NoStatus {
        fn channel_switch(&self, _device: u32, _channel_number: u32, _live_view: bool) {}
        fn set_volume(&self, _delta: i32, _absolute: bool) {}
    }
    struct NoSkin;
    impl SkinMessage for NoSkin {
        fn message(&self, _level: MessageLevel, _text: &str) {}
    }

    /// Refuses to tune anything, but happily accepts playback/transfer.
    struct Refusing;
    impl DeviceDriver for Refusing {
        fn provides_channel(&self, _c: &Channel, _p: i32) -> ProvidesChannel {
            ProvidesChannel::NO
        }
        fn set_channel_device(&self, _c: &Channel) -> bool {
            true
        }
        fn get_ts_packet(&self) -> TsPoll {
            TsPoll::None
        }
    }

    /// A driver that records every `play_video` call it receives, standing
    /// in for a real decoder so the bridge's forwarding path is observable.
    #[derive(Default)]
    struct RecordingDriver {
        video_calls: StdMutex<Vec<Vec<u8>>>,
    }
    impl DeviceDriver for RecordingDriver {
        fn provides_channel(&self, _c: &Channel, _p: i32) -> ProvidesChannel {
            ProvidesChannel { provides: true, needs_detach: false }
        }
        fn set_channel_device(&self, _c: &Channel) -> bool {
            true
        }
        fn get_ts_packet(&self) -> TsPoll {
            TsPoll::None
        }
        fn play_video(&self, data: &[u8]) -> usize {
            self.video_calls.lock().unwrap().push(data.to_vec());
            data.len()
        }
    }

    fn fresh_ctx() -> RuntimeContext {
        RuntimeContext::new(Arc::new(NoCatalog), Arc::new(InMemoryChannelCamRelations::new()), Arc::new(NoStatus), Arc::new(NoSkin))
    }

    fn channel_with_video(pid: u16) -> Channel {
        Channel {
            id: ChannelId(1),
            number: 1,
            video_pid: pid,
            audio_pids: vec![],
            dolby_pids: vec![],
            subtitle_pids: vec![],
            caids: vec![],
            card_index: None,
        }
    }

    /// A bounded-length (non-zero `packet_length`) video PES, so the
    /// reassembler closes it out on this single TS packet rather than
    /// waiting for a second start code.
    fn bounded_video_pes(payload: &[u8]) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, 0xE0];
        let packet_length = (3 + payload.len()) as u16;
        pes.extend_from_slice(&packet_length.to_be_bytes());
        pes.extend_from_slice(&[0x80, 0x00, 0x00]);
        pes.extend_from_slice(payload);
        pes
    }

    fn video_ts_packet(pid: u16, payload: &[u8]) -> [u8; TS_PACKET_SIZE] {
        let mut p = [0xFFu8; TS_PACKET_SIZE];
        p[0] = 0x47;
        p[1] = 0x40 | (((pid >> 8) & 0x1F) as u8);
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10;
        let n = payload.len().min(TS_PACKET_SIZE - 4);
        p[4..4 + n].copy_from_slice(&payload[..n]);
        p
    }

    #[test]
    fn bridged_packet_is_forwarded_byte_for_byte_s2() {
        let primary_driver = Arc::new(RecordingDriver::default());
        let source = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
        let primary = Device::new(1, primary_driver.clone(), Arc::new(InMemoryChannelCamRelations::new()), true);
        let channel = channel_with_video(100);
        let mut handle = bridge(source.clone(), primary.clone(), channel.clone(), 0).expect("bridge established");

        assert!(source.is_transfer_source());

        let payload: Vec<u8> = std::iter::repeat(0xABu8).take(20).collect();
        let pes = bounded_video_pes(&payload);
        let packet = video_ts_packet(100, &pes);

        handle.transfer.receive(&packet);

        let calls = primary_driver.video_calls.lock().unwrap();
        assert_eq!(calls.len(), 1, "exactly one play_video call for the one forwarded packet");
        assert_eq!(calls[0], pes, "forwarded PES is byte-identical to what the source delivered");
        drop(calls);

        handle.stop();
    }

    #[test]
    fn retry_gives_up_and_clears_after_max_retries() {
        struct AlwaysRejects;
        impl DeviceDriver for AlwaysRejects {
            fn provides_channel(&self, _c: &Channel, _p: i32) -> ProvidesChannel {
                ProvidesChannel { provides: true, needs_detach: false }
            }
            fn set_channel_device(&self, _c: &Channel) -> bool {
                true
            }
            fn get_ts_packet(&self) -> TsPoll {
                TsPoll::None
            }
            fn play_video(&self, _data: &[u8]) -> usize {
                0
            }
        }
        let source = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
        let primary = Device::new(1, Arc::new(AlwaysRejects), Arc::new(InMemoryChannelCamRelations::new()), true);
        let channel = channel_with_video(100);
        let mut handle = bridge(source.clone(), primary.clone(), channel, 0).expect("bridge established");

        let pes = bounded_video_pes(&[1, 2, 3]);
        let packet = video_ts_packet(100, &pes);
        // Exercises the retry-then-clear path; bounded by MAX_RETRIES * RETRY_WAIT.
        handle.transfer.receive(&packet);

        handle.stop();
    }

    #[test]
    fn switch_channel_surfaces_not_available_for_a_non_live_request() {
        let ctx = fresh_ctx();
        let device = Device::new(0, Arc::new(Refusing), Arc::new(InMemoryChannelCamRelations::new()), true);
        ctx.register_device(device.clone());
        // Not live view, so a NotAvailable result never dispatches to Transfer mode.
        let outcome = switch_channel(&ctx, &device, &channel_with_video(100), 0, false);
        assert!(matches!(outcome, SetChannelOutcome::NotAvailable));
    }

    #[test]
    fn switch_channel_surfaces_no_transfer_when_live_view_has_no_source_device() {
        let ctx = fresh_ctx();
        let device = Device::new(0, Arc::new(Refusing), Arc::new(InMemoryChannelCamRelations::new()), true);
        ctx.register_device(device.clone());
        let outcome = switch_channel(&ctx, &device, &channel_with_video(100), 0, true);
        assert!(matches!(outcome, SetChannelOutcome::NoTransfer));
    }

    #[test]
    fn switch_channel_bridges_through_transfer_when_primary_cannot_tune() {
        let ctx = fresh_ctx();
        let primary = Device::new(0, Arc::new(Refusing), Arc::new(InMemoryChannelCamRelations::new()), true);
        let source = Device::new(1, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
        ctx.register_device(primary.clone());
        ctx.register_device(source.clone());

        let outcome = switch_channel(&ctx, &primary, &channel_with_video(100), 0, true);
        match outcome {
            SetChannelOutcome::Ok { transfer } => {
                let mut handle = transfer.expect("bridged through transfer mode");
                assert_eq!(handle.source().card_index(), 1);
                assert_eq!(handle.primary().card_index(), 0);
                assert!(source.is_transfer_source());
                handle.stop();
            }
            _ => panic!("expected a bridged Ok outcome"),
        }
    }

}
