//! The last-seen audio/video sequence header (AAC `AudioSpecificConfig`,
//! AVC/HEVC decoder config record). A joining consumer needs these
//! replayed *before* the GOP cache so the decoder can initialize (SPEC_FULL
//! §4.2 invariant: sequence headers precede GOP frames on join).

use crate::item::MediaItem;
use proto_types::{MediaKind, MediaPacket};

#[derive(Default)]
pub struct SeqHeaderCache {
    audio: Option<MediaPacket>,
    video: Option<MediaPacket>,
}

impl SeqHeaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a packet if it is a sequence header; no-op otherwise.
    pub fn observe(&mut self, packet: &MediaPacket) {
        if !packet.is_sequence_header() {
            return;
        }
        match packet.kind {
            MediaKind::Audio => self.audio = Some(packet.clone()),
            MediaKind::Video => self.video = Some(packet.clone()),
            MediaKind::Script => {}
        }
    }

    pub fn clear(&mut self) {
        self.audio = None;
        self.video = None;
    }

    /// Items to replay to a joining consumer, video header before audio
    /// to match typical decoder init order.
    pub fn replay_items(&self) -> Vec<MediaItem> {
        let mut out = Vec::with_capacity(2);
        if let Some(v) = &self.video {
            out.push(MediaItem::Flv(v.clone()));
        }
        if let Some(a) = &self.audio {
            out.push(MediaItem::Flv(a.clone()));
        }
        out
    }
}
