//! Bounded producer/consumer ring buffers (`spec.md` §4.A).
//!
//! Two variants are needed by the core: [`ByteRing`] is a linear byte ring
//! that keeps TS-packet alignment for live hardware input, and [`FrameRing`]
//! stores whole [`crate::frame::Frame`]s for the playback engine. Both are
//! deliberately small — neither does its own I/O scheduling, just bounded
//! storage with timed waits.

mod byte_ring;
mod frame_ring;

pub use byte_ring::ByteRing;
pub use frame_ring::FrameRing;
