//! MPEG-TS segment muxing, grounded on `SrsTsContextWriter`/`SrsHlsSegment`
//! in `srs_app_hls.hpp`: each segment opens with a PAT/PMT pair (video
//! PID 0x100, audio PID 0x101, matching the simplified mapping the `srt`
//! crate also uses) and every subsequent FLV-shaped packet is wrapped in
//! a PES header and packetized into 188-byte transport packets.

use bytes::{BufMut, Bytes, BytesMut};

use proto_types::{MediaKind, MediaPacket};

pub const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
pub const PAT_PID: u16 = 0x0000;
pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x0100;
pub const AUDIO_PID: u16 = 0x0101;
const VIDEO_STREAM_ID: u8 = 0xE0;
const AUDIO_STREAM_ID: u8 = 0xC0;

/// Accumulates one segment's worth of 188-byte transport packets plus
/// per-PID continuity counters, the way `SrsTsContext` keeps counters
/// continuous across the packets written to one ts file.
pub struct TsSegmentWriter {
    buffer: BytesMut,
    video_cc: u8,
    audio_cc: u8,
    pat_pmt_cc: (u8, u8),
    wrote_headers: bool,
}

impl TsSegmentWriter {
    pub fn new() -> Self {
        TsSegmentWriter {
            buffer: BytesMut::new(),
            video_cc: 0,
            audio_cc: 0,
            pat_pmt_cc: (0, 0),
            wrote_headers: false,
        }
    }

    fn ensure_headers(&mut self) {
        if self.wrote_headers {
            return;
        }
        write_packet(&mut self.buffer, PAT_PID, true, &mut self.pat_pmt_cc.0, &build_pat());
        write_packet(&mut self.buffer, PMT_PID, true, &mut self.pat_pmt_cc.1, &build_pmt());
        self.wrote_headers = true;
    }

    /// Wrap one FLV-shaped packet in a PES header and append its
    /// transport packets to the segment.
    pub fn write_packet(&mut self, packet: &MediaPacket) {
        self.ensure_headers();
        let (pid, stream_id, cc) = match packet.kind {
            MediaKind::Video => (VIDEO_PID, VIDEO_STREAM_ID, &mut self.video_cc),
            MediaKind::Audio => (AUDIO_PID, AUDIO_STREAM_ID, &mut self.audio_cc),
            MediaKind::Script => return,
        };
        let pes = build_pes(stream_id, packet.dts as u64, packet.payload());
        write_payload_unit(&mut self.buffer, pid, cc, &pes);
    }

    /// Finish the segment and return its raw bytes (plaintext; the
    /// caller encrypts if `encrypt` is configured).
    pub fn finish(mut self) -> Bytes {
        self.ensure_headers();
        self.buffer.freeze()
    }
}

impl Default for TsSegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn build_pat() -> Bytes {
    let mut section = BytesMut::new();
    section.put_u8(0x00); // table id
    section.put_u16(0xB00D); // section_syntax_indicator + reserved + section_length(13)
    section.put_u16(0x0001); // transport_stream_id
    section.put_u8(0xC1); // reserved + version + current_next
    section.put_u8(0x00); // section_number
    section.put_u8(0x00); // last_section_number
    section.put_u16(0x0001); // program_number
    section.put_u16(0xE000 | PMT_PID); // reserved + program_map_PID
    let crc = crc32_mpeg2(&section);
    section.put_u32(crc);
    section.freeze()
}

fn build_pmt() -> Bytes {
    let mut section = BytesMut::new();
    section.put_u8(0x02); // table id
    section.put_u16(0xB012); // section_length(18)
    section.put_u16(0x0001); // program_number
    section.put_u8(0xC1);
    section.put_u8(0x00);
    section.put_u8(0x00);
    section.put_u16(0xE000 | VIDEO_PID); // PCR_PID
    section.put_u16(0xF000); // program_info_length = 0

    section.put_u8(0x1B); // H.264 video stream type
    section.put_u16(0xE000 | VIDEO_PID);
    section.put_u16(0xF000);

    section.put_u8(0x0F); // AAC audio stream type
    section.put_u16(0xE000 | AUDIO_PID);
    section.put_u16(0xF000);

    let crc = crc32_mpeg2(&section);
    section.put_u32(crc);
    section.freeze()
}

fn build_pes(stream_id: u8, dts_ms: u64, payload: &Bytes) -> Bytes {
    let pts_90k = dts_ms.wrapping_mul(90);
    let mut out = BytesMut::with_capacity(payload.len() + 19);
    out.put_u8(0x00);
    out.put_u8(0x00);
    out.put_u8(0x01);
    out.put_u8(stream_id);
    out.put_u16(0); // PES_packet_length (0 = unbounded, valid for video)
    out.put_u8(0x80); // marker bits
    out.put_u8(0x80); // PTS only
    out.put_u8(5); // PES_header_data_length
    out.extend_from_slice(&encode_pts(0x2, pts_90k));
    out.extend_from_slice(payload);
    out.freeze()
}

fn encode_pts(marker: u8, pts: u64) -> [u8; 5] {
    let pts = pts & 0x1_FFFF_FFFF;
    [
        (marker << 4) | (((pts >> 30) as u8 & 0x07) << 1) | 0x01,
        (pts >> 22) as u8,
        (((pts >> 15) as u8 & 0x7F) << 1) | 0x01,
        (pts >> 7) as u8,
        (((pts as u8) & 0x7F) << 1) | 0x01,
    ]
}

fn write_packet(out: &mut BytesMut, pid: u16, payload_unit_start: bool, cc: &mut u8, section: &Bytes) {
    let mut payload = BytesMut::with_capacity(section.len() + 1);
    payload.put_u8(0x00); // pointer_field
    payload.extend_from_slice(section);
    write_payload_unit(out, pid, cc, &payload.freeze());
}

/// Split `payload` across as many 188-byte transport packets as needed,
/// stuffing the final packet's adaptation field so segment length stays
/// a whole multiple of 188 bytes.
fn write_payload_unit(out: &mut BytesMut, pid: u16, cc: &mut u8, payload: &Bytes) {
    let mut offset = 0;
    let mut first = true;
    while offset < payload.len() || (offset == 0 && payload.is_empty()) {
        let remaining = payload.len() - offset;
        let max_payload = TS_PACKET_SIZE - 4;
        let chunk_len = remaining.min(max_payload);
        let mut raw = [0xFFu8; TS_PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = (if first { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
        raw[2] = (pid & 0xFF) as u8;

        if chunk_len < max_payload {
            let stuffing_len = max_payload - chunk_len - 1;
            raw[3] = 0x30 | (*cc & 0x0F);
            raw[4] = stuffing_len as u8;
            let payload_start = 5 + stuffing_len;
            raw[payload_start..payload_start + chunk_len].copy_from_slice(&payload[offset..offset + chunk_len]);
        } else {
            raw[3] = 0x10 | (*cc & 0x0F);
            raw[4..4 + chunk_len].copy_from_slice(&payload[offset..offset + chunk_len]);
        }

        out.extend_from_slice(&raw);
        *cc = cc.wrapping_add(1) & 0x0F;
        offset += chunk_len;
        first = false;
        if payload.is_empty() {
            break;
        }
    }
}

fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes as BytesCrate;

    #[test]
    fn segment_is_a_whole_multiple_of_188_bytes() {
        let mut writer = TsSegmentWriter::new();
        writer.write_packet(&MediaPacket::new(MediaKind::Video, 0, BytesCrate::from_static(&[0x17, 0x01, 0, 0, 0])));
        writer.write_packet(&MediaPacket::new(MediaKind::Audio, 20, BytesCrate::from_static(&[0xAF, 0x01])));
        let segment = writer.finish();
        assert_eq!(segment.len() % TS_PACKET_SIZE, 0);
        assert!(segment.len() >= TS_PACKET_SIZE * 4); // pat + pmt + video + audio
    }

    #[test]
    fn every_packet_starts_with_sync_byte() {
        let mut writer = TsSegmentWriter::new();
        writer.write_packet(&MediaPacket::new(MediaKind::Video, 0, BytesCrate::from_static(&[0x17, 0x01])));
        let segment = writer.finish();
        for chunk in segment.chunks(TS_PACKET_SIZE) {
            assert_eq!(chunk[0], SYNC_BYTE);
        }
    }

    #[test]
    fn large_payload_splits_across_multiple_packets() {
        let mut writer = TsSegmentWriter::new();
        let payload = BytesCrate::from(vec![0xABu8; 1000]);
        writer.write_packet(&MediaPacket::new(MediaKind::Video, 0, payload));
        let segment = writer.finish();
        // pat + pmt + at least 6 video packets for a ~1000 byte PES
        assert!(segment.len() / TS_PACKET_SIZE >= 8);
    }
}
