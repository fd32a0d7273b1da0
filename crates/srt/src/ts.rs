//! MPEG-TS 188-byte `0x47`-synced framing: resyncs on an arbitrary byte
//! stream boundary (SRT delivers a message-oriented payload, but nothing
//! here assumes the caller's writes line up with 188-byte boundaries) and
//! yields one `TsPacket` per transport packet, continuity-counter gaps
//! included so a bridge downstream can decide how to react to loss.

use bytes::{Bytes, BytesMut};

use proto_types::{CoreError, CoreResult};

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

#[derive(Debug, Clone)]
pub struct TsPacket {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub continuity_counter: u8,
    pub payload: Bytes,
}

/// Parse exactly one 188-byte transport packet.
pub fn parse_packet(raw: &[u8]) -> CoreResult<TsPacket> {
    if raw.len() != TS_PACKET_SIZE {
        return Err(CoreError::Protocol(format!("ts packet must be {TS_PACKET_SIZE} bytes, got {}", raw.len())));
    }
    if raw[0] != SYNC_BYTE {
        return Err(CoreError::Protocol(format!("ts packet missing sync byte, got 0x{:02x}", raw[0])));
    }

    let payload_unit_start = raw[1] & 0x40 != 0;
    let pid = (((raw[1] & 0x1F) as u16) << 8) | raw[2] as u16;
    let adaptation_field_control = (raw[3] >> 4) & 0x3;
    let continuity_counter = raw[3] & 0x0F;

    let payload_offset = match adaptation_field_control {
        0b01 => 4,
        0b10 => TS_PACKET_SIZE, // adaptation field only, no payload
        0b11 => {
            let adaptation_len = raw[4] as usize;
            (5 + adaptation_len).min(TS_PACKET_SIZE)
        }
        _ => return Err(CoreError::Protocol("ts packet has reserved adaptation_field_control".into())),
    };

    Ok(TsPacket {
        pid,
        payload_unit_start,
        continuity_counter,
        payload: Bytes::copy_from_slice(&raw[payload_offset..]),
    })
}

const PAYLOAD_PER_PACKET: usize = TS_PACKET_SIZE - 4;

/// Split `payload` into sync-prefixed transport packets carrying `pid`,
/// marking the first as `payload_unit_start` and stuffing the final
/// packet's adaptation field so every packet is exactly 188 bytes.
pub fn encode_packets(pid: u16, payload: &[u8], start_continuity_counter: u8) -> Vec<[u8; TS_PACKET_SIZE]> {
    let mut packets = Vec::new();
    let mut offset = 0;
    let mut counter = start_continuity_counter;
    let mut first = true;

    loop {
        let remaining = payload.len() - offset;
        let chunk_len = remaining.min(PAYLOAD_PER_PACKET);
        let mut raw = [0xFFu8; TS_PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = (if first { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
        raw[2] = (pid & 0xFF) as u8;

        if chunk_len < PAYLOAD_PER_PACKET {
            let stuffing_len = PAYLOAD_PER_PACKET - chunk_len - 1;
            raw[3] = 0x30 | (counter & 0x0F);
            raw[4] = stuffing_len as u8;
            let payload_start = 5 + stuffing_len;
            raw[payload_start..payload_start + chunk_len].copy_from_slice(&payload[offset..offset + chunk_len]);
        } else {
            raw[3] = 0x10 | (counter & 0x0F);
            raw[4..4 + chunk_len].copy_from_slice(&payload[offset..offset + chunk_len]);
        }

        packets.push(raw);
        offset += chunk_len;
        counter = counter.wrapping_add(1) & 0x0F;
        first = false;
        if offset >= payload.len() {
            break;
        }
    }
    packets
}

/// Accumulates an arbitrarily-chunked byte stream and extracts complete,
/// sync-aligned transport packets. Resynchronizes by scanning for a
/// `0x47` byte that also lands on sync a full packet ahead, so a single
/// corrupted byte doesn't desynchronize the whole session.
pub struct TsFramer {
    buffer: BytesMut,
}

impl TsFramer {
    pub fn new() -> Self {
        TsFramer { buffer: BytesMut::new() }
    }

    pub fn feed(&mut self, data: &[u8]) -> CoreResult<Vec<TsPacket>> {
        self.buffer.extend_from_slice(data);
        let mut packets = Vec::new();

        loop {
            let Some(start) = self.find_sync() else {
                break;
            };
            if start > 0 {
                let _ = self.buffer.split_to(start);
            }
            if self.buffer.len() < TS_PACKET_SIZE {
                break;
            }
            let packet_bytes = self.buffer.split_to(TS_PACKET_SIZE);
            packets.push(parse_packet(&packet_bytes)?);
        }
        Ok(packets)
    }

    /// Index of a `0x47` byte that's confirmed by a second sync byte one
    /// packet later (or by end-of-buffer, when not enough data has
    /// arrived yet to confirm).
    fn find_sync(&self) -> Option<usize> {
        let buf = &self.buffer[..];
        for i in 0..buf.len() {
            if buf[i] != SYNC_BYTE {
                continue;
            }
            match buf.get(i + TS_PACKET_SIZE) {
                Some(&b) if b == SYNC_BYTE => return Some(i),
                Some(_) => continue,
                None => return Some(i), // not enough data to confirm yet; assume aligned
            }
        }
        None
    }
}

impl Default for TsFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pid: u16, payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8; TS_PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = 0x40 | ((pid >> 8) as u8 & 0x1F);
        raw[2] = (pid & 0xFF) as u8;
        raw[3] = 0x10; // payload only, continuity counter 0
        raw[4..4 + payload.len()].copy_from_slice(payload);
        raw
    }

    #[test]
    fn parses_single_packet() {
        let raw = packet(0x100, b"hello");
        let parsed = parse_packet(&raw).unwrap();
        assert_eq!(parsed.pid, 0x100);
        assert!(parsed.payload_unit_start);
        assert_eq!(&parsed.payload[..5], b"hello");
    }

    #[test]
    fn rejects_missing_sync_byte() {
        let mut raw = packet(1, b"x");
        raw[0] = 0x00;
        assert!(parse_packet(&raw).is_err());
    }

    #[test]
    fn framer_extracts_packets_split_across_feeds() {
        let mut framer = TsFramer::new();
        let a = packet(0x101, b"aaa");
        let b = packet(0x102, b"bbb");
        let mut combined = a.clone();
        combined.extend_from_slice(&b);

        let first_feed = &combined[0..250];
        let second_feed = &combined[250..];

        let packets1 = framer.feed(first_feed).unwrap();
        assert!(packets1.len() <= 1);
        let mut packets2 = framer.feed(second_feed).unwrap();
        let mut all = packets1;
        all.append(&mut packets2);

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].pid, 0x101);
        assert_eq!(all[1].pid, 0x102);
    }

    #[test]
    fn encode_then_parse_round_trips_payload() {
        let payload = vec![7u8; 300];
        let packets = encode_packets(0x100, &payload, 0);
        assert!(packets.len() >= 2);

        let mut reassembled = Vec::new();
        for (i, raw) in packets.iter().enumerate() {
            let parsed = parse_packet(raw).unwrap();
            assert_eq!(parsed.pid, 0x100);
            assert_eq!(parsed.payload_unit_start, i == 0);
            reassembled.extend_from_slice(&parsed.payload);
        }
        assert_eq!(&reassembled[..payload.len()], payload.as_slice());
    }

    #[test]
    fn framer_resyncs_past_garbage_byte() {
        let mut framer = TsFramer::new();
        let mut data = vec![0xAAu8; 3];
        data.extend_from_slice(&packet(5, b"ok"));
        let packets = framer.feed(&data).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].pid, 5);
    }
}
