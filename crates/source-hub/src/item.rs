//! The item type queued on a consumer FIFO: either an RTMP/FLV message
//! or an RTP packet, discriminated by a small enum rather than dispatched
//! through a trait object (SPEC_FULL §9 — avoid virtual dispatch per
//! packet on the hot path).

use proto_types::{MediaPacket, RtpEnvelope};

#[derive(Debug, Clone)]
pub enum MediaItem {
    Flv(MediaPacket),
    Rtp(RtpEnvelope),
}

impl MediaItem {
    pub fn is_flv(&self) -> bool {
        matches!(self, MediaItem::Flv(_))
    }

    pub fn is_rtp(&self) -> bool {
        matches!(self, MediaItem::Rtp(_))
    }

    pub fn as_flv(&self) -> Option<&MediaPacket> {
        match self {
            MediaItem::Flv(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_rtp(&self) -> Option<&RtpEnvelope> {
        match self {
            MediaItem::Rtp(p) => Some(p),
            _ => None,
        }
    }
}
