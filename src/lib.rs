#![doc(html_root_url = "https://docs.rs/dvrio/0.1.0")]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # dvrio — DVR device/receiver/player core
//!
//! `dvrio` implements the hard part of a DVB digital video recorder: tuning
//! hardware arbitration, multi-consumer PID fan-out, and a bidirectional
//! trick-play engine for recorded playback. It does not decode video or
//! audio, parse EPG data, or render a UI — it treats the hardware decoder as
//! an opaque sink and exposes a small set of collaborator traits for
//! everything outside its scope (a channel catalog, a CAM-slot registry, a
//! recording index, a status sink, a skin for error surfacing).
//!
//! ## Module overview
//!
//! - [`channel`] / [`track`]: the channel and track data model.
//! - [`ring`]: bounded producer/consumer ring buffers (linear byte ring for
//!   live TS, framed ring for decoded [`frame::Frame`]s).
//! - [`pts_index`]: a small circular PTS→frame-index map for STC sync.
//! - [`ts`]: TS/PES helpers — header parsing, PAT/PMT, PES reassembly.
//! - [`receiver`]: the `Receiver` abstraction attached to a [`device::Device`].
//! - [`device`]: per-tuner PID filter table, fan-out thread, scramble
//!   detection, and channel switching.
//! - [`arbiter`]: the static device registry and impact-ranked `choose`.
//! - [`playback`]: the threaded trick-play engine.
//! - [`transfer`]: the receiver→player bridge for Transfer mode.
//! - [`external`]: collaborator traits the core consumes but does not own.
//! - [`cam`]: the CAM slot collaborator trait.
//! - [`context`]: the explicit `RuntimeContext` replacing process-wide
//!   singletons.

/// CAM slot collaborator trait and channel/CAM relation bookkeeping types.
pub mod cam;
/// Channel data model.
pub mod channel;
/// Ambient process-wide tunables (timeouts, language preferences).
pub mod config;
/// The explicit runtime context tying together all external collaborators.
pub mod context;
/// Per-tuner device: PID table, fan-out thread, channel switching.
pub mod device;
/// Error types and utilities.
pub mod error;
/// Collaborator traits consumed by the core but owned elsewhere.
pub mod external;
/// Frame type produced by the playback reader and consumed by the decoder feeder.
pub mod frame;
/// The threaded trick-play / replay engine.
pub mod playback;
/// PTS→frame-index circular lookup table.
pub mod pts_index;
/// Receiver abstraction: a PID-set subscriber attached to a device.
pub mod receiver;
/// Bounded linear and framed ring buffers.
pub mod ring;
/// Track data model (audio/Dolby/subtitle).
pub mod track;
/// Transfer-mode bridge: receiver on one device, player on another.
pub mod transfer;
/// MPEG Transport Stream / PES helpers: header parsing, PAT/PMT, reassembly.
pub mod ts;
/// Common utilities (CRC).
pub mod utils;

/// Device registry and impact-ranked selection (`Arbiter::choose`).
pub mod arbiter;

pub use error::{DvrError, Result};
