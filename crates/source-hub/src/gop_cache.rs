//! Group-of-pictures cache: the frames since the last keyframe, replayed
//! to a consumer that joins mid-stream so it doesn't have to wait for the
//! next keyframe to render anything. Bounded by `gop_cache_frames`
//! (SPEC_FULL §4.2); a value of `0` disables caching entirely.

use std::collections::VecDeque;

use crate::item::MediaItem;

pub struct GopCache {
    capacity: usize,
    frames: VecDeque<MediaItem>,
}

impl GopCache {
    pub fn new(capacity: usize) -> Self {
        GopCache {
            capacity,
            frames: VecDeque::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Feed a newly-dispatched media item. A keyframe starts a new GOP
    /// and clears whatever was cached from the previous one.
    pub fn push(&mut self, item: MediaItem, is_keyframe: bool) {
        if !self.enabled() {
            return;
        }
        if is_keyframe {
            self.frames.clear();
        }
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(item);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proto_types::{MediaKind, MediaPacket};

    fn flv(kind: MediaKind, byte0: u8) -> MediaItem {
        MediaItem::Flv(MediaPacket::new(kind, 0, Bytes::from(vec![byte0])))
    }

    #[test]
    fn disabled_when_capacity_zero() {
        let mut cache = GopCache::new(0);
        cache.push(flv(MediaKind::Video, 0x17), true);
        assert!(cache.is_empty());
        assert!(!cache.enabled());
    }

    #[test]
    fn keyframe_resets_the_cached_gop() {
        let mut cache = GopCache::new(8);
        cache.push(flv(MediaKind::Video, 0x17), true);
        cache.push(flv(MediaKind::Video, 0x27), false);
        cache.push(flv(MediaKind::Video, 0x27), false);
        assert_eq!(cache.len(), 3);
        cache.push(flv(MediaKind::Video, 0x17), true);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bounded_by_capacity() {
        let mut cache = GopCache::new(2);
        cache.push(flv(MediaKind::Video, 0x17), true);
        cache.push(flv(MediaKind::Video, 0x27), false);
        cache.push(flv(MediaKind::Video, 0x27), false);
        assert_eq!(cache.len(), 2);
    }
}
