//! Device Arbiter (`spec.md` §4.F): the process-wide decision of which
//! device (and, for encrypted channels, which CAM slot) serves a channel
//! request. Grounded in `original_source/device.c`'s `cDevice::GetDevice`
//! impact-bitfield scoring.
//!
//! The original builds one `int` per candidate from a dozen boolean/small
//! integer fields, most-significant first, and keeps the device with the
//! smallest value. This module reproduces that ordering exactly (§4.F's
//! table) rather than replacing it with a seemingly-equivalent weighted sum,
//! since later reimplementors comparing traces against the original need the
//! same tie-breaking behavior.

use std::sync::Arc;

use crate::cam::{CamSlot, IDLE_PRIORITY};
use crate::channel::Channel;
use crate::context::RuntimeContext;
use crate::device::Device;

/// CAM slot priority contribution when a channel needs no CA at all.
const NO_CAM_PRIORITY: i32 = IDLE_PRIORITY;

/// Selects a device (and CAM slot, if the channel is encrypted) for
/// `channel`, or picks a fast pre-tuning candidate for transponder scans.
pub struct Arbiter;

impl Arbiter {
    /// The central decision (`spec.md` §4.F). Returns `None` if no device
    /// can provide the channel, or if the channel is encrypted and no CAM
    /// slot can decrypt it.
    ///
    /// Unless `query_only`, also performs the selection's side effects:
    /// detaching receivers the switch displaces, reassigning the CAM slot,
    /// and releasing any CAM slot the chosen device previously held but is
    /// no longer using.
    pub fn choose(
        ctx: &RuntimeContext,
        channel: &Channel,
        requested_priority: i32,
        live_view: bool,
        query_only: bool,
    ) -> Option<Arc<Device>> {
        let cam_slot = if channel.is_encrypted() {
            Some(Self::best_cam_slot(ctx, channel)?)
        } else {
            None
        };

        let mut best: Option<(u32, Arc<Device>, bool)> = None;
        for device in ctx.devices() {
            if let Some(card) = channel.card_index {
                if device.card_index() != card {
                    continue;
                }
            }
            let provides = device.driver().provides_channel(channel, requested_priority);
            if !provides.provides {
                continue;
            }
            let score = Self::impact(ctx, &device, channel, cam_slot.as_deref(), live_view, provides.needs_detach);
            let better = match &best {
                None => true,
                Some((b, _, _)) => score < *b,
            };
            if better {
                best = Some((score, device.clone(), provides.needs_detach));
            }
        }

        let (_, chosen, needs_detach) = best?;

        if !query_only {
            if needs_detach {
                chosen.detach_all();
            }
            if let Some(slot) = &cam_slot {
                if let Some(existing) = slot.device() {
                    if existing != chosen.card_index() {
                        if let Some(other) = ctx.device_by_index(existing) {
                            other.detach_all();
                        }
                    }
                }
                let previous = chosen.cam_slot();
                slot.assign(Some(chosen.card_index()), false);
                chosen.set_cam_slot(Some(slot.clone()));
                if let Some(prev) = previous {
                    if prev.slot_number() != slot.slot_number() && !prev.is_decrypting() {
                        prev.assign(None, false);
                    }
                }
            }
        }

        Some(chosen)
    }

    /// Fast path for pre-tuning a transponder (`spec.md` §4.F), e.g. an
    /// EPG scanner: prefer a device already there, then one that could
    /// switch without disturbing current use, then the lowest-priority
    /// non-occupied device below `priority`.
    pub fn choose_for_transponder(ctx: &RuntimeContext, channel: &Channel, priority: i32) -> Option<Arc<Device>> {
        let devices = ctx.devices();
        if let Some(d) = devices.iter().find(|d| d.driver().is_tuned_to_transponder(channel)) {
            return Some(d.clone());
        }
        if let Some(d) = devices.iter().find(|d| d.driver().may_switch_transponder(channel)) {
            return Some(d.clone());
        }
        devices
            .iter()
            .filter(|d| d.priority() < priority)
            .min_by_key(|d| d.priority())
            .cloned()
    }

    /// Finds the best CAM slot able to decrypt `channel`: ready, matches a
    /// CAID, and not already known to fail for this channel. Ties broken by
    /// highest priority.
    fn best_cam_slot(ctx: &RuntimeContext, channel: &Channel) -> Option<Arc<dyn CamSlot>> {
        ctx.cam_slots()
            .into_iter()
            .filter(|slot| slot.module_status() == crate::cam::ModuleStatus::Ready)
            .filter(|slot| slot.provides_ca(&channel.caids))
            .filter(|slot| !ctx.cam_relations.cam_checked(channel.id, slot.slot_number()))
            .max_by_key(|slot| slot.priority())
    }

    /// Builds the 32-bit impact score for `device` (`spec.md` §4.F table,
    /// most-significant field first; smaller overall score wins).
    fn impact(
        ctx: &RuntimeContext,
        device: &Device,
        channel: &Channel,
        cam_slot: Option<&dyn CamSlot>,
        live_view: bool,
        needs_detach: bool,
    ) -> u32 {
        let mut score: u32 = 0;

        let is_receiving = device.is_receiving();
        let is_transfer_receiver = device.is_transfer_source();

        // 1 bit: live view, non-primary device, or needs detach
        score = (score << 1) | bit(live_view && !device.is_primary() || needs_detach);

        // 1 bit: not receiving AND (not transfer-receiver OR is primary)
        score = (score << 1) | bit(!is_receiving && (!is_transfer_receiver || device.is_primary()));

        // 1 bit: device is currently receiving
        score = (score << 1) | bit(is_receiving);

        // 4 bits: number of delivery systems supported minus 1
        let systems = device.driver().num_provided_systems().saturating_sub(1).min(0xF);
        score = (score << 4) | systems;

        // 1 bit: device is the transfer-mode receiver
        score = (score << 1) | bit(is_transfer_receiver);

        // 8 bits: device priority - IDLE
        score = (score << 8) | priority_field(device.priority());

        // 8 bits: CAM slot priority - IDLE (or IDLE if no CAM needed)
        let cam_priority = cam_slot.map(|c| c.priority()).unwrap_or(NO_CAM_PRIORITY);
        score = (score << 8) | priority_field(cam_priority);

        // 1 bit: attaching would require detaching existing receivers
        score = (score << 1) | bit(needs_detach);

        // 1 bit: device has CI while channel is FTA
        score = (score << 1) | bit(device.driver().has_ci() && channel.is_free_to_air());

        // 1 bit: device is "avoid recording"
        score = (score << 1) | bit(device.driver().avoid_recording());

        // 1 bit: CAM is not yet known to decrypt this channel
        let cam_unconfirmed = match cam_slot {
            Some(slot) => !ctx.cam_relations.cam_decrypt(channel.id, slot.slot_number()),
            None => false,
        };
        score = (score << 1) | bit(cam_unconfirmed);

        // 1 bit: device is primary
        score = (score << 1) | bit(device.is_primary());

        score
    }
}

fn bit(value: bool) -> u32 {
    value as u32
}

fn priority_field(priority: i32) -> u32 {
    (priority - IDLE_PRIORITY).clamp(0, 255) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::InMemoryChannelCamRelations;
    use crate::channel::ChannelId;
    use crate::device::driver::dummy::DummyDriver;
    use crate::external::{ChannelCatalog, MessageLevel, SkinMessage, StatusSink};

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

    fn fresh_ctx() -> RuntimeContext {
        RuntimeContext::new(Arc::new(NoCatalog), Arc::new(InMemoryChannelCamRelations::new()), Arc::new(NoStatus), Arc::new(NoSkin))
    }

    fn unencrypted_channel() -> Channel {
        Channel {
            id: ChannelId(1),
            number: 1,
            video_pid: 100,
            audio_pids: vec![],
            dolby_pids: vec![],
            subtitle_pids: vec![],
            caids: vec![],
            card_index: None,
        }
    }

    #[test]
    fn picks_the_only_device_that_provides_the_channel() {
        let ctx = fresh_ctx();
        let device = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), true);
        ctx.register_device(device.clone());
        let chosen = Arbiter::choose(&ctx, &unencrypted_channel(), 0, true, false).expect("a device is chosen");
        assert_eq!(chosen.card_index(), device.card_index());
    }

    #[test]
    fn encrypted_channel_with_no_cam_slot_returns_none() {
        let ctx = fresh_ctx();
        let device = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), true);
        ctx.register_device(device);
        let mut ch = unencrypted_channel();
        ch.caids.push(crate::channel::CaId(0x0100));
        assert!(Arbiter::choose(&ctx, &ch, 0, true, false).is_none());
    }

    #[test]
    fn card_index_restriction_is_honored() {
        let ctx = fresh_ctx();
        let d0 = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), true);
        let d1 = Device::new(1, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), false);
        ctx.register_device(d0);
        ctx.register_device(d1.clone());
        let mut ch = unencrypted_channel();
        ch.card_index = Some(1);
        let chosen = Arbiter::choose(&ctx, &ch, 0, true, false).expect("device 1 chosen");
        assert_eq!(chosen.card_index(), 1);
        let _ = d1;
    }

    #[test]
    fn query_only_does_not_detach_receivers() {
        let ctx = fresh_ctx();
        let device = Device::new(0, Arc::new(DummyDriver::new()), Arc::new(InMemoryChannelCamRelations::new()), true);
        ctx.register_device(device);
        let chosen = Arbiter::choose(&ctx, &unencrypted_channel(), 0, true, true);
        assert!(chosen.is_some());
    }
}
