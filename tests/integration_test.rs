//! Higher-level, cross-module scenarios that don't fit neatly in any one
//! module's `#[cfg(test)]` block: arbiter selection feeding into device
//! attach/detach, exercised end to end against the in-memory dummy driver.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use dvrio::arbiter::Arbiter;
use dvrio::cam::InMemoryChannelCamRelations;
use dvrio::channel::{Channel, ChannelId, Pid};
use dvrio::context::RuntimeContext;
use dvrio::device::driver::dummy::DummyDriver;
use dvrio::device::driver::{DeviceDriver, ProvidesChannel, TsPoll};
use dvrio::device::Device;
use dvrio::external::{ChannelCatalog, MessageLevel, SkinMessage, StatusSink};
use dvrio::receiver::Receiver;

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

fn fresh_context() -> RuntimeContext {
    RuntimeContext::new(
        Arc::new(NoCatalog),
        Arc::new(InMemoryChannelCamRelations::new()),
        Arc::new(NoStatus),
        Arc::new(NoSkin),
    )
}

fn test_channel(card_index: Option<u32>) -> Channel {
    Channel {
        id: ChannelId(7),
        number: 7,
        video_pid: 100,
        audio_pids: vec![],
        dolby_pids: vec![],
        subtitle_pids: vec![],
        caids: vec![],
        card_index,
    }
}

struct CountingReceiver {
    pids: Vec<Pid>,
    channel: ChannelId,
}

impl Receiver for CountingReceiver {
    fn pids(&self) -> &[Pid] {
        &self.pids
    }
    fn priority(&self) -> i32 {
        0
    }
    fn channel_id(&self) -> ChannelId {
        self.channel
    }
    fn receive(&self, _packet: &[u8]) {}
    fn activate(&self, _on: bool) {}
}

/// Two tuners are registered; the channel restricts selection to card 1, so
/// the arbiter must skip the first device even though its dummy driver would
/// otherwise happily accept the channel.
#[test]
fn arbiter_picks_the_device_that_provides_the_requested_card() {
    let ctx = fresh_context();
    let d0 = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
    let d1 = Device::new(1, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
    ctx.register_device(d0.clone());
    ctx.register_device(d1.clone());

    let channel = test_channel(Some(1));
    let chosen = Arbiter::choose(&ctx, &channel, 0, false, false).expect("a device should be selected");
    assert_eq!(chosen.card_index(), 1);
}

/// Attaching through the device the arbiter selected, then detaching,
/// returns the PID table to empty (S1, driven through `Arbiter::choose`
/// rather than constructed by hand).
#[test]
fn attach_after_arbiter_selection_then_detach_clears_pid_table() {
    let ctx = fresh_context();
    let device = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
    ctx.register_device(device.clone());

    let channel = test_channel(None);
    let chosen = Arbiter::choose(&ctx, &channel, 0, false, false).expect("device should be selectable");
    assert_eq!(chosen.card_index(), device.card_index());

    let receiver: Arc<dyn Receiver> = Arc::new(CountingReceiver { pids: vec![101, 102], channel: channel.id });
    let handle = chosen.attach(receiver).expect("attach should succeed on a fresh device");
    assert!(handle.is_attached());

    chosen.detach(&handle);
    assert!(!handle.is_attached());
    assert!(chosen.is_idle());
}

/// A device whose driver refuses to provide the requested card index is
/// never selected, even when another device on the registry would accept
/// it; `choose` returns `None` rather than falling back silently.
#[test]
fn arbiter_returns_none_when_no_device_provides_the_channel() {
    struct Refusing;
    impl DeviceDriver for Refusing {
        fn provides_channel(&self, _channel: &Channel, _priority: i32) -> ProvidesChannel {
            ProvidesChannel::NO
        }
        fn set_channel_device(&self, _channel: &Channel) -> bool {
            true
        }
        fn get_ts_packet(&self) -> TsPoll {
            TsPoll::None
        }
    }

    let ctx = fresh_context();
    let device = Device::new(0, Arc::new(Refusing), Arc::new(InMemoryChannelCamRelations::new()), false);
    ctx.register_device(device);

    let channel = test_channel(None);
    assert!(Arbiter::choose(&ctx, &channel, 0, false, false).is_none());
}
