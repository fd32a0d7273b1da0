//! The internal FLV/RTMP media packet: the common currency between the
//! RTMP ingress, the source hub's GOP cache, and every bridge that
//! produces FLV-shaped output (the RTC-to-RTMP direction, HLS muxing).

use bytes::Bytes;
use std::sync::Arc;

/// Discriminant for a media packet, avoiding virtual dispatch per packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Script,
}

/// A reference-counted media packet. The payload is immutable once
/// wrapped, so cloning a `MediaPacket` shares the backing buffer rather
/// than copying it.
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub kind: MediaKind,
    /// Decode timestamp in milliseconds, publisher clock.
    pub dts: i64,
    payload: Arc<Bytes>,
}

impl MediaPacket {
    pub fn new(kind: MediaKind, dts: i64, payload: Bytes) -> Self {
        MediaPacket {
            kind,
            dts,
            payload: Arc::new(payload),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_sequence_header(&self) -> bool {
        match self.kind {
            MediaKind::Audio => self.payload.len() >= 2 && self.payload[0] >> 4 == 10 && self.payload[1] == 0,
            MediaKind::Video => self.payload.len() >= 2 && (self.payload[0] & 0x0f) == 7 && self.payload[1] == 0,
            MediaKind::Script => false,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.kind == MediaKind::Video && self.payload.first().map(|b| b >> 4 == 1).unwrap_or(false)
    }

    /// Rewrite the dts, returning a new packet that still shares the
    /// payload buffer with the original (used by jitter correction).
    pub fn with_dts(&self, dts: i64) -> Self {
        MediaPacket {
            kind: self.kind,
            dts,
            payload: Arc::clone(&self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_backing_buffer() {
        let p = MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0, 0, 0, 0]));
        let cloned = p.clone();
        assert!(Arc::ptr_eq(&p.payload, &cloned.payload));
    }

    #[test]
    fn detects_avc_sequence_header() {
        let p = MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        assert!(p.is_sequence_header());
    }

    #[test]
    fn detects_keyframe() {
        let key = MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x01]));
        let delta = MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x27, 0x01]));
        assert!(key.is_keyframe());
        assert!(!delta.is_keyframe());
    }

    #[test]
    fn with_dts_preserves_sharing() {
        let p = MediaPacket::new(MediaKind::Audio, 0, Bytes::from_static(&[0xaf, 0x00]));
        let shifted = p.with_dts(40);
        assert_eq!(shifted.dts, 40);
        assert!(Arc::ptr_eq(&p.payload, &shifted.payload));
    }
}
