//! MPEG Transport Stream / PES helpers (`spec.md` §4.C, §6).
//!
//! This module is deliberately low-level: free functions operating on raw
//! `&[u8]` TS packets and PES headers, plus two small stateful helpers
//! (the PAT/PMT parser and the TS→PES reassembler) that the [`Device`]
//! (`crate::device`) drives per elementary stream. Nothing here decodes
//! audio or video — only enough MPEG structure to find PIDs, PES
//! boundaries, and PTS values.

mod header;
mod pat_pmt;
mod pes;
mod reassembler;

pub use header::{
    ts_get_pts, ts_has_payload, ts_payload_offset, ts_payload_start, ts_pid, ts_scrambled, SYNC_BYTE,
    TS_PACKET_SIZE,
};
pub use pat_pmt::{PatPmtGenerator, PatPmtParser};
pub use pes::{pes_get_pts, pes_length, PES_START_CODE};
pub use reassembler::PesReassembler;
