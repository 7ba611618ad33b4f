//! Stateful PAT/PMT parsing and synthesis (`spec.md` §4.C).
//!
//! [`PatPmtParser`] is fed arbitrary TS packets (as they arrive off the
//! wire) and exposes `pmt_pid`/`vpid`/`ppid` once it has seen a PAT and the
//! PMT it points to. [`PatPmtGenerator`] runs the other direction: given a
//! [`Channel`], it synthesizes a minimal single-program PAT and PMT (with a
//! correct MPEG-2 CRC32 trailer) so Transfer mode (`spec.md` §4.H) can feed
//! a decoder that has not seen the real PAT/PMT yet.

use crate::channel::Channel;
use crate::utils::Crc32Mpeg2;

use super::header::{ts_payload_offset, ts_payload_start, ts_pid, TS_PACKET_SIZE};

const PID_PAT: u16 = 0x0000;
const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;

/// Video stream types the parser recognizes when looking for the video PID
/// in a PMT's elementary stream loop.
const VIDEO_STREAM_TYPES: [u8; 4] = [0x01, 0x02, 0x1B, 0x24];

struct SectionCollector {
    buf: Vec<u8>,
    expected_len: Option<usize>,
}

impl SectionCollector {
    fn new() -> Self {
        Self { buf: Vec::new(), expected_len: None }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.expected_len = None;
    }

    /// Feeds one TS packet's payload. Returns the complete section bytes
    /// (table_id .. CRC32 inclusive) once fully reassembled.
    fn feed(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let offset = ts_payload_offset(packet);
        if offset >= TS_PACKET_SIZE {
            return None;
        }
        let payload = &packet[offset..TS_PACKET_SIZE];
        if ts_payload_start(packet) {
            if payload.is_empty() {
                return None;
            }
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                return None;
            }
            self.buf.clear();
            self.expected_len = None;
            self.buf.extend_from_slice(&payload[1 + pointer..]);
        } else if self.expected_len.is_some() {
            self.buf.extend_from_slice(payload);
        } else {
            return None; // mid-section packet with nothing started yet
        }

        if self.expected_len.is_none() && self.buf.len() >= 3 {
            let section_length = (((self.buf[1] & 0x0F) as usize) << 8) | self.buf[2] as usize;
            self.expected_len = Some(3 + section_length);
        }
        if let Some(total) = self.expected_len {
            if self.buf.len() >= total {
                let section = self.buf[..total].to_vec();
                self.buf.clear();
                self.expected_len = None;
                return Some(section);
            }
        }
        None
    }
}

/// Incrementally parses a PAT followed by the PMT it references.
pub struct PatPmtParser {
    pat_collector: SectionCollector,
    pmt_collector: SectionCollector,
    pmt_pid: Option<u16>,
    vpid: Option<u16>,
    ppid: Option<u16>,
}

impl Default for PatPmtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PatPmtParser {
    /// A fresh parser with nothing seen yet.
    pub fn new() -> Self {
        Self {
            pat_collector: SectionCollector::new(),
            pmt_collector: SectionCollector::new(),
            pmt_pid: None,
            vpid: None,
            ppid: None,
        }
    }

    /// Clears all state, as if newly constructed. Called whenever playback
    /// or live viewing switches to a different channel.
    pub fn reset(&mut self) {
        self.pat_collector.reset();
        self.pmt_collector.reset();
        self.pmt_pid = None;
        self.vpid = None;
        self.ppid = None;
    }

    /// Feeds one TS packet. PID 0 packets are treated as PAT; once the PMT
    /// PID is known, packets on that PID are treated as PMT.
    pub fn put_ts(&mut self, packet: &[u8]) {
        if packet.len() < TS_PACKET_SIZE {
            return;
        }
        let pid = ts_pid(packet);
        if pid == PID_PAT && self.pmt_pid.is_none() {
            if let Some(section) = self.pat_collector.feed(packet) {
                if let Some(pmt_pid) = parse_pat_first_pmt_pid(&section) {
                    self.pmt_pid = Some(pmt_pid);
                }
            }
        } else if Some(pid) == self.pmt_pid && (self.vpid.is_none() || self.ppid.is_none()) {
            if let Some(section) = self.pmt_collector.feed(packet) {
                let (vpid, ppid) = parse_pmt(&section);
                self.vpid = vpid;
                self.ppid = ppid;
            }
        }
    }

    /// The PMT's PID, once the PAT has been seen.
    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    /// The program's video PID, once the PMT has been seen.
    pub fn vpid(&self) -> Option<u16> {
        self.vpid
    }

    /// The program's PCR PID, once the PMT has been seen.
    pub fn ppid(&self) -> Option<u16> {
        self.ppid
    }
}

fn parse_pat_first_pmt_pid(section: &[u8]) -> Option<u16> {
    if section.len() < 8 || section[0] != TABLE_ID_PAT {
        return None;
    }
    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let total = (3 + section_length).min(section.len());
    let mut pos = 8;
    while pos + 4 <= total.saturating_sub(4) {
        let program_number = u16::from_be_bytes([section[pos], section[pos + 1]]);
        let pid = (((section[pos + 2] & 0x1F) as u16) << 8) | section[pos + 3] as u16;
        if program_number != 0 {
            return Some(pid);
        }
        pos += 4;
    }
    None
}

fn parse_pmt(section: &[u8]) -> (Option<u16>, Option<u16>) {
    if section.len() < 12 || section[0] != TABLE_ID_PMT {
        return (None, None);
    }
    let section_length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    let total = (3 + section_length).min(section.len());
    let pcr_pid = (((section[8] & 0x1F) as u16) << 8) | section[9] as u16;
    let program_info_length = (((section[10] & 0x0F) as usize) << 8) | section[11] as usize;
    let mut pos = 12 + program_info_length;
    let mut vpid = None;
    while pos + 5 <= total.saturating_sub(4) {
        let stream_type = section[pos];
        let pid = (((section[pos + 1] & 0x1F) as u16) << 8) | section[pos + 2] as u16;
        let es_info_length = (((section[pos + 3] & 0x0F) as usize) << 8) | section[pos + 4] as usize;
        if vpid.is_none() && VIDEO_STREAM_TYPES.contains(&stream_type) {
            vpid = Some(pid);
        }
        pos += 5 + es_info_length;
    }
    (vpid, Some(pcr_pid))
}

/// Synthesizes a minimal single-program PAT and PMT for a [`Channel`], for
/// Transfer mode to push into a decoder that has not yet seen the real
/// tables from the transport stream.
pub struct PatPmtGenerator {
    program_number: u16,
    pmt_pid: u16,
    channel_video_pid: u16,
    channel_audio_pids: Vec<u16>,
}

/// PID the generator uses for the synthesized PMT. Arbitrary but fixed,
/// distinct from any PID a real broadcast is likely to use for PAT/PMT.
const GENERATED_PMT_PID: u16 = 0x0020;

impl PatPmtGenerator {
    /// Builds a generator for `channel`.
    pub fn new(channel: &Channel) -> Self {
        let mut audio_pids: Vec<u16> = channel.audio_pids.iter().map(|p| p.pid).collect();
        audio_pids.extend(channel.dolby_pids.iter().map(|p| p.pid));
        Self {
            program_number: 1,
            pmt_pid: GENERATED_PMT_PID,
            channel_video_pid: channel.video_pid,
            channel_audio_pids: audio_pids,
        }
    }

    /// The synthesized PAT, as one complete 188-byte TS packet.
    pub fn pat(&self) -> [u8; TS_PACKET_SIZE] {
        let mut section = vec![TABLE_ID_PAT, 0, 0, 0, 0, 0xC1, 0, 0];
        section.extend_from_slice(&self.program_number.to_be_bytes());
        section.extend_from_slice(&(0xE000 | self.pmt_pid).to_be_bytes());
        finish_section(&mut section);
        wrap_section_in_ts_packet(PID_PAT, &section)
    }

    /// The synthesized PMT, as one complete 188-byte TS packet. `index` is
    /// reserved for future multi-packet PMTs (large ES loops); this
    /// generator always fits in one packet and returns `None` for `index >
    /// 0`, mirroring a caller loop that stops on the first `None`.
    pub fn pmt(&self, index: usize) -> Option<[u8; TS_PACKET_SIZE]> {
        if index > 0 {
            return None;
        }
        let mut section = vec![TABLE_ID_PMT, 0, 0];
        section.extend_from_slice(&self.program_number.to_be_bytes());
        section.push(0xC1);
        section.push(0);
        section.push(0);
        let pcr_pid = if self.channel_video_pid != 0 { self.channel_video_pid } else { 0x1FFF };
        section.extend_from_slice(&(0xE000 | pcr_pid).to_be_bytes());
        section.extend_from_slice(&[0xF0, 0]); // no program-level descriptors
        if self.channel_video_pid != 0 {
            section.push(0x02); // MPEG-2 video; real stream type is irrelevant, the decoder already knows
            section.extend_from_slice(&(0xE000 | self.channel_video_pid).to_be_bytes());
            section.extend_from_slice(&[0xF0, 0]);
        }
        for &pid in &self.channel_audio_pids {
            section.push(0x04); // MPEG audio
            section.extend_from_slice(&(0xE000 | pid).to_be_bytes());
            section.extend_from_slice(&[0xF0, 0]);
        }
        finish_section(&mut section);
        Some(wrap_section_in_ts_packet(self.pmt_pid, &section))
    }
}

/// Patches in the section_length field (bytes 1–2) and appends the MPEG-2
/// CRC32 trailer, given `section` currently holding `table_id ..
/// last-field-before-CRC`.
fn finish_section(section: &mut Vec<u8>) {
    let section_length = section.len() - 3 + 4; // + CRC32, excluding table_id/length field itself
    section[1] = 0xB0 | (((section_length >> 8) & 0x0F) as u8);
    section[2] = (section_length & 0xFF) as u8;
    let crc = Crc32Mpeg2::new().calculate(section);
    section.extend_from_slice(&crc.to_be_bytes());
}

fn wrap_section_in_ts_packet(pid: u16, section: &[u8]) -> [u8; TS_PACKET_SIZE] {
    let mut p = [0xFFu8; TS_PACKET_SIZE];
    p[0] = super::header::SYNC_BYTE;
    p[1] = 0x40 | (((pid >> 8) & 0x1F) as u8); // payload_unit_start + PID high bits
    p[2] = (pid & 0xFF) as u8;
    p[3] = 0x10; // payload only, continuity counter 0
    p[4] = 0; // pointer field
    let n = section.len().min(TS_PACKET_SIZE - 5);
    p[5..5 + n].copy_from_slice(&section[..n]);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CaId, Channel, ChannelId, LanguagePid};

    fn test_channel() -> Channel {
        Channel {
            id: ChannelId(1),
            number: 1,
            video_pid: 100,
            audio_pids: vec![LanguagePid::new(101, "eng")],
            dolby_pids: vec![],
            subtitle_pids: vec![],
            caids: vec![],
            card_index: None,
        }
    }

    #[test]
    fn generator_output_parses_back_to_same_pids() {
        let ch = test_channel();
        let gen = PatPmtGenerator::new(&ch);
        let pat = gen.pat();
        let pmt = gen.pmt(0).expect("single-packet PMT");
        assert!(gen.pmt(1).is_none());

        let mut parser = PatPmtParser::new();
        parser.put_ts(&pat);
        assert_eq!(parser.pmt_pid(), Some(GENERATED_PMT_PID));
        parser.put_ts(&pmt);
        assert_eq!(parser.vpid(), Some(ch.video_pid));
        assert_eq!(parser.ppid(), Some(ch.video_pid));
    }

    #[test]
    fn reset_clears_all_state() {
        let ch = test_channel();
        let gen = PatPmtGenerator::new(&ch);
        let mut parser = PatPmtParser::new();
        parser.put_ts(&gen.pat());
        parser.put_ts(&gen.pmt(0).unwrap());
        assert!(parser.vpid().is_some());
        parser.reset();
        assert_eq!(parser.pmt_pid(), None);
        assert_eq!(parser.vpid(), None);
        assert_eq!(parser.ppid(), None);
    }

    #[test]
    fn caid_does_not_cause_a_crash_for_fta_channel() {
        let ch = test_channel();
        assert!(ch.caids.is_empty());
        let _ = PatPmtGenerator::new(&ch);
    }
}
