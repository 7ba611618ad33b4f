//! Replaces the original's process-wide singletons (`spec.md` §9: "Global
//! singletons") with one explicit, constructor-injected struct. Nothing in
//! this crate reaches for a `static`/`lazy_static` to find a device, a CAM
//! slot, or the channel catalog; everything that needs one is handed a
//! [`RuntimeContext`] or a clone of the `Arc` it needs.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::cam::{CamSlot, ChannelCamRelations};
use crate::device::Device;
use crate::external::{ChannelCatalog, RecordingIndex, SkinMessage, StatusSink};

/// The external collaborators and the device registry, bundled so that
/// constructors take one reference instead of half a dozen. Tests build a
/// fresh context per case instead of relying on process-wide state.
pub struct RuntimeContext {
    /// Looks channels up by number or ID.
    pub channels: Arc<dyn ChannelCatalog>,
    /// Per-(channel, CAM slot) decrypt history.
    pub cam_relations: Arc<dyn ChannelCamRelations>,
    /// Reports channel switches and volume changes.
    pub status: Arc<dyn StatusSink>,
    /// Surfaces user-visible failures.
    pub skin: Arc<dyn SkinMessage>,
    cam_slots: RwLock<Vec<Arc<dyn CamSlot>>>,
    devices: RwLock<Vec<Arc<Device>>>,
}

impl RuntimeContext {
    /// Builds a context with an empty CAM slot list and an empty device
    /// registry; both are populated afterwards via [`RuntimeContext::register_device`]
    /// and [`RuntimeContext::register_cam_slot`] once hardware (or test doubles) exist.
    pub fn new(
        channels: Arc<dyn ChannelCatalog>,
        cam_relations: Arc<dyn ChannelCamRelations>,
        status: Arc<dyn StatusSink>,
        skin: Arc<dyn SkinMessage>,
    ) -> Self {
        Self {
            channels,
            cam_relations,
            status,
            skin,
            cam_slots: RwLock::new(Vec::new()),
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Adds a device to the registry. Devices are never removed individually;
    /// the registry lives as long as the context does.
    pub fn register_device(&self, device: Arc<Device>) {
        self.devices.write().push(device);
    }

    /// Adds a CAM slot to the registry.
    pub fn register_cam_slot(&self, slot: Arc<dyn CamSlot>) {
        self.cam_slots.write().push(slot);
    }

    /// A snapshot of the current device registry.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().clone()
    }

    /// A snapshot of the current CAM slot registry.
    pub fn cam_slots(&self) -> Vec<Arc<dyn CamSlot>> {
        self.cam_slots.read().clone()
    }

    /// The device currently marked primary, if the registry has one.
    pub fn primary_device(&self) -> Option<Arc<Device>> {
        self.devices.read().iter().find(|d| d.is_primary()).cloned()
    }

    /// Looks up a device by its card index.
    pub fn device_by_index(&self, card_index: u32) -> Option<Arc<Device>> {
        self.devices.read().iter().find(|d| d.card_index() == card_index).cloned()
    }
}
