//! TS→PES reassembly (`spec.md` §4.C).
//!
//! One instance per elementary stream kind (video, audio, subtitle), fed
//! consecutive TS packets for that stream's PID. A new payload-unit-start
//! packet closes out whatever PES was being accumulated; a bounded-length
//! PES (anything but unbounded video) also closes itself the instant enough
//! bytes have arrived, without waiting for the next start code.

use std::collections::VecDeque;

use bytes::Bytes;

use super::header::{ts_payload_offset, ts_payload_start, TS_PACKET_SIZE};
use super::pes::pes_length;

/// Reassembles TS packets of a single elementary stream into whole PES
/// packets.
pub struct PesReassembler {
    current: Vec<u8>,
    queue: VecDeque<Bytes>,
    last: Option<Bytes>,
    repeat_last: bool,
}

impl Default for PesReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PesReassembler {
    /// An empty reassembler with nothing in progress.
    pub fn new() -> Self {
        Self { current: Vec::new(), queue: VecDeque::new(), last: None, repeat_last: false }
    }

    /// Feeds one TS packet belonging to this stream.
    pub fn put_ts(&mut self, packet: &[u8]) {
        if packet.len() < TS_PACKET_SIZE {
            return;
        }
        let offset = ts_payload_offset(packet);
        if offset >= TS_PACKET_SIZE {
            return;
        }
        let payload = &packet[offset..TS_PACKET_SIZE];
        if ts_payload_start(packet) {
            self.finish_current();
            self.current.extend_from_slice(payload);
        } else if !self.current.is_empty() {
            self.current.extend_from_slice(payload);
        } else {
            return; // continuation with nothing in progress: drop it
        }
        if self.current.len() >= 6 {
            let total = pes_length(&self.current);
            if total > 0 && self.current.len() >= total {
                let extra = self.current.split_off(total);
                self.finish_current();
                self.current = extra;
            }
        }
    }

    fn finish_current(&mut self) {
        if !self.current.is_empty() {
            let done = std::mem::take(&mut self.current);
            self.queue.push_back(Bytes::from(done));
        }
    }

    /// Returns the oldest complete PES packet, if any. If
    /// [`PesReassembler::set_repeat_last`] was called since the previous
    /// `get_pes`, re-offers the last packet returned instead of advancing —
    /// used so the decoder can retry after backpressure without losing
    /// data.
    pub fn get_pes(&mut self) -> Option<Bytes> {
        if self.repeat_last {
            self.repeat_last = false;
            return self.last.clone();
        }
        let pes = self.queue.pop_front()?;
        self.last = Some(pes.clone());
        Some(pes)
    }

    /// Marks the last packet returned by `get_pes` to be re-offered on the
    /// next call, instead of advancing the queue.
    pub fn set_repeat_last(&mut self) {
        if self.last.is_some() {
            self.repeat_last = true;
        }
    }

    /// Clears all in-progress and queued data, and the repeat-last marker.
    pub fn reset(&mut self) {
        self.current.clear();
        self.queue.clear();
        self.last = None;
        self.repeat_last = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_packet(pid: u16, payload_start: bool, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0xFFu8; TS_PACKET_SIZE];
        p[0] = 0x47;
        p[1] = (if payload_start { 0x40 } else { 0 }) | (((pid >> 8) & 0x1F) as u8);
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10;
        let n = payload.len().min(TS_PACKET_SIZE - 4);
        p[4..4 + n].copy_from_slice(&payload[..n]);
        p
    }

    fn small_pes(payload_len: usize) -> Vec<u8> {
        let mut pes = vec![0x00, 0x00, 0x01, 0xC0];
        let packet_length = (3 + payload_len) as u16;
        pes.extend_from_slice(&packet_length.to_be_bytes());
        pes.extend_from_slice(&[0x80, 0x00, 0x00]);
        pes.extend(std::iter::repeat(0xAB).take(payload_len));
        pes
    }

    #[test]
    fn bounded_pes_completes_without_waiting_for_next_start() {
        let mut r = PesReassembler::new();
        let pes = small_pes(10);
        r.put_ts(&ts_packet(101, true, &pes));
        let got = r.get_pes().expect("pes ready");
        assert_eq!(got.as_ref(), pes.as_slice());
    }

    #[test]
    fn new_start_code_closes_out_unbounded_video_pes() {
        let mut r = PesReassembler::new();
        // unbounded video PES: packet_length == 0
        let mut video1 = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00];
        video1.extend(std::iter::repeat(1u8).take(50));
        r.put_ts(&ts_packet(100, true, &video1));
        assert!(r.get_pes().is_none(), "still accumulating, no start code seen yet");

        let mut video2 = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x00, 0x00];
        video2.extend(std::iter::repeat(2u8).take(20));
        r.put_ts(&ts_packet(100, true, &video2));
        let first = r.get_pes().expect("first video pes closed by second start code");
        assert_eq!(first.as_ref(), video1.as_slice());
    }

    #[test]
    fn repeat_last_reoffers_without_advancing() {
        let mut r = PesReassembler::new();
        let pes = small_pes(5);
        r.put_ts(&ts_packet(101, true, &pes));
        let first = r.get_pes().unwrap();
        r.set_repeat_last();
        let again = r.get_pes().unwrap();
        assert_eq!(first, again);
        assert!(r.get_pes().is_none());
    }

    #[test]
    fn reset_drops_in_progress_and_queued_data() {
        let mut r = PesReassembler::new();
        r.put_ts(&ts_packet(101, true, &small_pes(5)));
        r.reset();
        assert!(r.get_pes().is_none());
    }
}
