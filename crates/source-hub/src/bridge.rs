//! Cross-protocol bridges, grounded on `protocol_bridge.rs`: each bridge
//! watches one `Source` and re-publishes its packets into a different
//! `Source` under a (possibly different) wire shape, so a single RTMP
//! publish can be consumed over WebRTC, SRT, or RTSP without the
//! publisher's protocol adapter knowing anything about the others.
//!
//! The actual FLV<->RTP transcoding/packetization lives in the `rtc`
//! crate (it owns RTP header/SDP detail); this module only owns the
//! bridge lifecycle — attach, drain, detach — and the trait boundary a
//! concrete translator plugs into.

use std::sync::Arc;

use async_trait::async_trait;
use proto_types::CoreResult;
use tracing::{debug, warn};

use crate::consumer::DrainOutcome;
use crate::item::MediaItem;
use crate::source::Source;

/// Converts one source's wire shape into another's. Implemented outside
/// this crate (in `rtc`, `rtmp`, `srt`, `rtsp`) for each direction that
/// needs real codec/packetization knowledge; this crate only drives it.
#[async_trait]
pub trait Translate: Send + Sync {
    /// Translate one item from the upstream source into zero or more
    /// items to push into the downstream source. Returning an empty
    /// vec drops the item (e.g. a codec the downstream can't carry).
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>>;
}

/// Drains `upstream`'s packets through a `Translate` impl and feeds the
/// result into `downstream`, running until `upstream`'s consumer closes.
pub struct Bridge {
    downstream: Arc<Source>,
    translator: Arc<dyn Translate>,
}

impl Bridge {
    pub fn new(downstream: Arc<Source>, translator: Arc<dyn Translate>) -> Self {
        Bridge {
            downstream,
            translator,
        }
    }

    /// Run the bridge loop against an already-attached consumer on the
    /// upstream source. Returns once the upstream consumer is closed
    /// (publisher gone, or the manager disposed the source).
    pub async fn run(&self, upstream: Arc<crate::consumer::Consumer>) {
        loop {
            let item = match upstream.recv().await {
                Ok(item) => item,
                Err(DrainOutcome::Closed) => {
                    debug!(stream = %self.downstream.url, "bridge upstream closed");
                    return;
                }
            };
            match self.translator.translate(item).await {
                Ok(items) => {
                    for item in items {
                        match &item {
                            MediaItem::Flv(packet) => self.downstream.on_flv(packet.clone()),
                            MediaItem::Rtp(packet) => self.downstream.on_rtp(packet.clone()),
                        }
                    }
                }
                Err(err) => {
                    warn!(stream = %self.downstream.url, error = %err, "bridge translation failed");
                }
            }
        }
    }
}

/// A translator that passes FLV items through unchanged and drops RTP
/// items; used for the RTMP-to-RTMP republish case and as the base for
/// protocol adapters that only add header rewriting on top.
pub struct PassthroughFlv;

#[async_trait]
impl Translate for PassthroughFlv {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        Ok(match item {
            MediaItem::Flv(_) => vec![item],
            MediaItem::Rtp(_) => vec![],
        })
    }
}

/// Bridges an SRT publish onto an RTMP-shaped downstream. SRT ingress
/// already demuxes MPEG-TS into the same FLV-shaped `MediaPacket`s RTMP
/// produces (see `srt-ingest`'s `ts.rs`), so no transcoding is needed;
/// this is `PassthroughFlv` under the name the bridge registry looks up
/// for that direction.
pub struct SrtToRtmp;

#[async_trait]
impl Translate for SrtToRtmp {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        PassthroughFlv.translate(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proto_types::{MediaKind, MediaPacket, StreamUrl};
    use streamcfg::SourceConfig;

    #[tokio::test]
    async fn bridge_forwards_flv_until_upstream_closes() {
        let upstream_source = Source::new(StreamUrl::new("v", "live", "up"), SourceConfig::default());
        upstream_source.on_publish();
        let upstream_consumer = upstream_source.create_consumer();

        let downstream = Arc::new(Source::new(StreamUrl::new("v", "live", "down"), SourceConfig::default()));
        downstream.on_publish();
        let downstream_consumer = downstream.create_consumer();

        let bridge = Bridge::new(downstream.clone(), Arc::new(PassthroughFlv));
        let handle = tokio::spawn({
            let upstream_consumer = upstream_consumer.clone();
            async move { bridge.run(upstream_consumer).await }
        });

        upstream_source.on_flv(MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x01])));
        let forwarded = downstream_consumer.recv().await.unwrap();
        assert!(forwarded.as_flv().unwrap().is_keyframe());

        upstream_consumer.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("bridge should exit once upstream closes")
            .unwrap();
    }
}
