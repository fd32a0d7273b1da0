//! A single stream's publish/subscribe hub, grounded on the per-stream
//! bookkeeping in `stream_manager.rs`: one `Source` owns the sequence
//! header cache, the GOP cache, jitter correction and every attached
//! `Consumer`. There is at most one active publisher per `Source`; the
//! mutual-exclusion across protocols that enforces that is the admission
//! crate's job, not this one's — `Source` only tracks whether it
//! currently has a publisher attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use proto_types::{MediaPacket, RtpEnvelope, StreamUrl};
use streamcfg::SourceConfig;
use tracing::{debug, trace};

use crate::consumer::Consumer;
use crate::gop_cache::GopCache;
use crate::item::MediaItem;
use crate::jitter::JitterCorrector;
use crate::seq_header_cache::SeqHeaderCache;

struct State {
    gop_cache: GopCache,
    seq_headers: SeqHeaderCache,
    jitter: JitterCorrector,
    consumers: Vec<Weak<Consumer>>,
}

/// The live state for one canonical stream URL.
pub struct Source {
    pub url: StreamUrl,
    has_publisher: AtomicBool,
    state: Mutex<State>,
    config: SourceConfig,
}

impl Source {
    pub fn new(url: StreamUrl, config: SourceConfig) -> Self {
        Source {
            has_publisher: AtomicBool::new(false),
            state: Mutex::new(State {
                gop_cache: GopCache::new(config.gop_cache_frames),
                seq_headers: SeqHeaderCache::new(),
                jitter: JitterCorrector::new(config.jitter_algorithm),
                consumers: Vec::new(),
            }),
            config,
            url,
        }
    }

    pub fn has_publisher(&self) -> bool {
        self.has_publisher.load(Ordering::Acquire)
    }

    /// A publish session is attaching. Clears stale cached state from
    /// any previous publisher so a new GOP/sequence-header cycle starts
    /// clean.
    pub fn on_publish(&self) {
        self.has_publisher.store(true, Ordering::Release);
        let mut state = self.state.lock().unwrap();
        state.gop_cache.clear();
        state.seq_headers.clear();
        state.jitter = JitterCorrector::new(self.config.jitter_algorithm);
        debug!(stream = %self.url, "source publish started");
    }

    pub fn on_unpublish(&self) {
        self.has_publisher.store(false, Ordering::Release);
        debug!(stream = %self.url, "source publish ended");
    }

    /// Ingest one FLV-shaped media packet from the active publisher:
    /// correct its dts, feed the sequence header/GOP caches, and fan it
    /// out to every attached consumer.
    pub fn on_flv(&self, packet: MediaPacket) {
        let mut state = self.state.lock().unwrap();
        let corrected_dts = state.jitter.correct(packet.dts);
        let packet = packet.with_dts(corrected_dts);
        state.seq_headers.observe(&packet);

        let item = MediaItem::Flv(packet.clone());
        state.gop_cache.push(item.clone(), packet.is_keyframe());
        dispatch(&mut state.consumers, item);
    }

    /// Ingest an RTP packet from an RTC publisher; RTP has no sequence
    /// header / GOP concept at this layer (SDP carries codec config), so
    /// it only fans out.
    pub fn on_rtp(&self, packet: RtpEnvelope) {
        let mut state = self.state.lock().unwrap();
        dispatch(&mut state.consumers, MediaItem::Rtp(packet));
    }

    /// Attach a new consumer, replaying sequence headers then the
    /// cached GOP so it can start decoding immediately.
    pub fn create_consumer(&self) -> Arc<Consumer> {
        let consumer = Arc::new(Consumer::new(self.config.queue_length, self.config.overflow_policy));
        let mut state = self.state.lock().unwrap();
        for item in state.seq_headers.replay_items() {
            consumer.push(item);
        }
        for item in state.gop_cache.iter() {
            consumer.push(item.clone());
        }
        state.consumers.push(Arc::downgrade(&consumer));
        trace!(stream = %self.url, queued = consumer.len(), "consumer attached");
        consumer
    }

    /// Drop dead weak refs; returns the number of live consumers.
    pub fn reap_consumers(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.consumers.retain(|c| c.strong_count() > 0);
        state.consumers.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.reap_consumers()
    }
}

fn dispatch(consumers: &mut Vec<Weak<Consumer>>, item: MediaItem) {
    consumers.retain(|weak| {
        if let Some(consumer) = weak.upgrade() {
            consumer.push(item.clone());
            true
        } else {
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proto_types::MediaKind;

    fn url() -> StreamUrl {
        StreamUrl::new("__defaultVhost__", "live", "test")
    }

    #[test]
    fn joining_consumer_gets_sequence_header_then_gop() {
        let src = Source::new(url(), SourceConfig::default());
        src.on_publish();
        src.on_flv(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x00])));
        src.on_flv(MediaPacket::new(MediaKind::Video, 40, Bytes::from_static(&[0x17, 0x01])));
        src.on_flv(MediaPacket::new(MediaKind::Video, 80, Bytes::from_static(&[0x27, 0x01])));

        let consumer = src.create_consumer();
        assert_eq!(consumer.len(), 3);
    }

    #[test]
    fn republish_clears_previous_caches() {
        let src = Source::new(url(), SourceConfig::default());
        src.on_publish();
        src.on_flv(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x00])));
        src.on_flv(MediaPacket::new(MediaKind::Video, 40, Bytes::from_static(&[0x17, 0x01])));
        src.on_unpublish();
        assert!(!src.has_publisher());

        src.on_publish();
        let consumer = src.create_consumer();
        assert_eq!(consumer.len(), 0);
    }

    #[tokio::test]
    async fn live_packets_fan_out_to_attached_consumers() {
        let src = Source::new(url(), SourceConfig::default());
        src.on_publish();
        let consumer = src.create_consumer();
        src.on_flv(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x01])));
        let item = consumer.recv().await.unwrap();
        assert!(item.as_flv().unwrap().is_keyframe());
    }

    #[test]
    fn reap_consumers_drops_dead_weak_refs() {
        let src = Source::new(url(), SourceConfig::default());
        {
            let _consumer = src.create_consumer();
            assert_eq!(src.consumer_count(), 1);
        }
        assert_eq!(src.reap_consumers(), 0);
    }
}
