//! The PID-fan-out consumer side of the device plane (`spec.md` §3, §4.D).
//!
//! A [`Receiver`] declares the PIDs and priority it wants at construction and
//! never changes them while attached. [`Device::attach`](crate::device::Device::attach)
//! is the only way a receiver starts seeing packets; [`ReceiverHandle`] is the
//! attachment token the caller holds afterwards and must explicitly detach
//! before dropping (Design Notes §9: "a debug-only check in the Receiver
//! destructor should enforce 'not currently attached'").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::channel::{ChannelId, Pid};
use crate::device::Device;

/// An opaque consumer of one device's TS fan-out.
///
/// `receive` is called from the device's DVR reader thread, one packet at a
/// time; it must not block indefinitely or it stalls every other receiver
/// attached to the same device.
pub trait Receiver: Send + Sync {
    /// The PIDs this receiver wants, fixed for the receiver's lifetime.
    fn pids(&self) -> &[Pid];
    /// Whether `pid` is one this receiver wants.
    fn wants_pid(&self, pid: Pid) -> bool {
        self.pids().contains(&pid)
    }
    /// Scheduling priority, used by [`crate::device::Device::priority`].
    fn priority(&self) -> i32;
    /// The channel this receiver was constructed for.
    fn channel_id(&self) -> ChannelId;
    /// Delivers one TS packet. Must return promptly.
    fn receive(&self, packet: &[u8]);
    /// Called by the device on attach (`true`) and detach (`false`).
    fn activate(&self, on: bool);
}

/// The attachment token returned by [`Device::attach`]. The creator of a
/// [`Receiver`] holds this (or drops it immediately, if it never intends to
/// detach cleanly, which will panic in debug builds).
pub struct ReceiverHandle {
    device: Weak<Device>,
    slot: usize,
    attached: Arc<AtomicBool>,
}

impl ReceiverHandle {
    pub(crate) fn new(device: Weak<Device>, slot: usize, attached: Arc<AtomicBool>) -> Self {
        Self { device, slot, attached }
    }

    /// Whether this attachment is still live (i.e. `detach` has not been
    /// called on it, and the device has not unilaterally detached it — e.g.
    /// on scramble-detach or `detach_all`).
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// The slot index this receiver occupies in the device's receiver table.
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// The device this receiver is (or was) attached to, if it still exists.
    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.upgrade()
    }

    pub(crate) fn mark_detached(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub(crate) fn attached_flag(&self) -> Arc<AtomicBool> {
        self.attached.clone()
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        debug_assert!(
            !self.is_attached(),
            "ReceiverHandle dropped while still attached; call Device::detach first"
        );
    }
}
