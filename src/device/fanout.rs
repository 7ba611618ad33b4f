//! The DVR reader ("action") thread (`spec.md` §4.E, §5): one OS thread per
//! [`super::Device`], started on the first `attach` and cancelled when the
//! last receiver detaches.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config;
use crate::device::driver::TsPoll;
use crate::device::scramble::ScrambleOutcome;
use crate::device::Device;
use crate::ts::{ts_pid, ts_scrambled};

/// Runs the fan-out loop until `device.running` is cleared or the driver
/// reports its DVR closed. Intended to be the body of the thread spawned by
/// [`Device::attach`](super::Device::attach) on the 0→1 receiver transition.
pub(crate) fn run(device: Arc<Device>) {
    if !device.driver.open_dvr() {
        log::error!("device {}: open_dvr failed, fan-out thread exiting", device.card_index());
        return;
    }
    log::debug!("device {}: fan-out thread started", device.card_index());
    while device.running.load(Ordering::Acquire) {
        match device.driver.get_ts_packet() {
            TsPoll::Packet(packet) => {
                dispatch(&device, &packet);
                detect_scramble(&device, &packet);
            }
            // `spec.md` §5: a real driver blocks here up to its own timeout;
            // a non-blocking one (e.g. the dummy test driver) returns `None`
            // immediately, so a short sleep keeps this loop from spinning a
            // core at 100% whenever the queue is empty.
            TsPoll::None => std::thread::sleep(Duration::from_millis(10)),
            TsPoll::Closed => break,
        }
    }
    device.driver.close_dvr();
    log::debug!("device {}: fan-out thread stopped", device.card_index());
}

fn dispatch(device: &Arc<Device>, packet: &[u8; 188]) {
    let pid = ts_pid(packet);
    let receivers = device.receivers.lock();
    for slot in receivers.iter().flatten() {
        if slot.receiver.wants_pid(pid) {
            slot.receiver.receive(packet);
        }
    }
}

fn detect_scramble(device: &Arc<Device>, packet: &[u8; 188]) {
    let mut sc = device.scramble.lock();
    if !sc.is_detecting() {
        return;
    }
    let cfg = config::current();
    let outcome = sc.feed(ts_scrambled(packet), Instant::now(), cfg.scramble_detach_after, cfg.scramble_ok_after);
    drop(sc);
    match outcome {
        ScrambleOutcome::Pending => {}
        ScrambleOutcome::MustDetach => {
            log::warn!("device {}: CAM failed to decrypt within timeout, detaching receivers", device.card_index());
            let (channel_id, slot_number) = {
                let channel = device.current_channel.lock();
                let slot = device.cam_slot.lock();
                (channel.as_ref().map(|c| c.id), slot.as_ref().map(|s| s.slot_number()))
            };
            device.detach_all();
            if let (Some(channel_id), Some(slot_number)) = (channel_id, slot_number) {
                device.cam_relations.set_checked(channel_id, slot_number);
            }
        }
        ScrambleOutcome::Ok => {
            log::debug!("device {}: CAM confirmed decrypting", device.card_index());
            let (channel_id, slot_number) = {
                let channel = device.current_channel.lock();
                let slot = device.cam_slot.lock();
                (channel.as_ref().map(|c| c.id), slot.as_ref().map(|s| s.slot_number()))
            };
            if let (Some(channel_id), Some(slot_number)) = (channel_id, slot_number) {
                device.cam_relations.set_decrypt(channel_id, slot_number);
            }
        }
    }
}
