//! The codec-aware half of the cross-protocol bridges registered on a
//! `source_hub::Source`: `source_hub::bridge` only owns the
//! attach/drain/detach lifecycle, so the actual FLV<->RTP transcoding
//! lives here, grounded on `h264_payload.rs`'s RFC 6184
//! packetizer/depacketizer and the FLV AVCC layout `proto_types::MediaPacket`
//! already assumes (`is_keyframe`/`is_sequence_header`).
//!
//! Audio is out of scope here: bridging an RTMP/SRT AAC stream onto RTP
//! would mean transcoding to Opus (spec.md's stated RTMP<->RTC codec
//! boundary), and this workspace carries no audio codec crate to do
//! that with. Every bridge below only carries video; audio items are
//! dropped with a debug log, not silently miscounted as translated.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use proto_types::{CoreError, CoreResult, MediaKind, MediaPacket};
use source_hub::{MediaItem, Translate};
use tracing::debug;

use crate::h264_payload::{H264PayloadHandler, NalUnit};
use crate::rtp_handler;

/// Maximum RTP payload size the packetizer will fit a NAL unit into
/// before switching to FU-A fragmentation; matches the handler's own
/// default MTU assumption used elsewhere in this crate.
const MAX_RTP_PAYLOAD_SIZE: usize = 1200;

/// The FLV `VIDEODATA` header is 5 bytes: frame-type/codec-id, AVC
/// packet type, and a 3-byte composition time offset this bridge
/// always sets to zero (no B-frame reordering here).
const FLV_VIDEO_HEADER_LEN: usize = 5;

/// H.264 RTP clock rate (RFC 6184 Section 5.2): always 90000 Hz.
const VIDEO_CLOCK_RATE: u32 = 90_000;

fn dts_ms_to_rtp_timestamp(dts: i64) -> u32 {
    (dts.max(0) as u64).wrapping_mul((VIDEO_CLOCK_RATE / 1000) as u64) as u32
}

fn rtp_timestamp_to_dts_ms(timestamp: u32) -> i64 {
    (timestamp / (VIDEO_CLOCK_RATE / 1000)) as i64
}

/// Wrap one depacketized NAL unit back into an FLV `VIDEODATA` payload:
/// the 5-byte AVC header plus a single AVCC length-prefixed NAL.
fn nal_to_flv_payload(nal: &NalUnit) -> Bytes {
    let mut buf = BytesMut::with_capacity(FLV_VIDEO_HEADER_LEN + 4 + nal.size());
    let frame_type = if nal.nal_type.is_keyframe() { 1u8 } else { 2u8 };
    buf.put_u8((frame_type << 4) | 0x07); // codec id 7 = AVC
    buf.put_u8(1); // AVCPacketType::NALU
    buf.put_u8(0); // composition time (3 bytes), always 0 here
    buf.put_u8(0);
    buf.put_u8(0);
    buf.put_u32(nal.size() as u32);
    buf.put_slice(&nal.data);
    buf.freeze()
}

/// Split one FLV AVCC video payload into its length-prefixed NAL units,
/// skipping the 5-byte header. Malformed length prefixes truncate the
/// scan rather than erroring, since a corrupt FLV payload on a live
/// stream shouldn't take the bridge down.
fn avcc_nal_units(payload: &Bytes) -> Vec<Bytes> {
    let mut nal_units = Vec::new();
    if payload.len() <= FLV_VIDEO_HEADER_LEN {
        return nal_units;
    }
    let mut offset = FLV_VIDEO_HEADER_LEN;
    while offset + 4 <= payload.len() {
        let nal_len = u32::from_be_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ]) as usize;
        offset += 4;
        if nal_len == 0 || offset + nal_len > payload.len() {
            break;
        }
        nal_units.push(payload.slice(offset..offset + nal_len));
        offset += nal_len;
    }
    nal_units
}

/// Translates an RTMP publish's FLV video into RTP packets for an RTC
/// subscriber (spec.md's "RTMP<->RTC bridge contract": H.264 AnnexB
/// framing in FLV becomes FU-A/single-NAL RTP per RFC 6184).
pub struct RtmpToRtc {
    handler: Mutex<H264PayloadHandler>,
    ssrc: u32,
    payload_type: u8,
}

impl RtmpToRtc {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        RtmpToRtc {
            handler: Mutex::new(H264PayloadHandler::new(MAX_RTP_PAYLOAD_SIZE)),
            ssrc,
            payload_type,
        }
    }
}

#[async_trait]
impl Translate for RtmpToRtc {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        let MediaItem::Flv(packet) = item else {
            return Ok(vec![]);
        };
        if packet.kind != MediaKind::Video || packet.is_sequence_header() {
            debug!("rtmp-to-rtc bridge dropping non-video or sequence-header packet");
            return Ok(vec![]);
        }

        let timestamp = dts_ms_to_rtp_timestamp(packet.dts);
        let mut handler = self.handler.lock().unwrap();
        let mut items = Vec::new();
        for nal_data in avcc_nal_units(packet.payload()) {
            let nal = match NalUnit::parse_avcc(&nal_data) {
                Ok(nal) => nal,
                Err(err) => {
                    debug!(error = %err, "rtmp-to-rtc bridge skipped unparseable nal unit");
                    continue;
                }
            };
            let rtp_packets = handler
                .packetize_nal_unit(&nal, timestamp, self.ssrc, self.payload_type)
                .map_err(CoreError::from)?;
            items.extend(rtp_packets.into_iter().map(MediaItem::Rtp));
        }
        Ok(items)
    }
}

/// Translates an RTC publisher's RTP back into FLV video for an RTMP
/// subscriber: buffers RTP packets until the marker bit closes out a
/// frame, depacketizes, and re-wraps each recovered NAL as an AVCC FLV
/// video tag.
pub struct RtcToRtmp {
    handler: H264PayloadHandler,
    buffered: Mutex<Vec<proto_types::RtpEnvelope>>,
}

impl RtcToRtmp {
    pub fn new() -> Self {
        RtcToRtmp {
            handler: H264PayloadHandler::new(MAX_RTP_PAYLOAD_SIZE),
            buffered: Mutex::new(Vec::new()),
        }
    }
}

impl Default for RtcToRtmp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translate for RtcToRtmp {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        let MediaItem::Rtp(packet) = item else {
            return Ok(vec![]);
        };
        if rtp_handler::is_audio(packet.payload_type) {
            debug!("rtc-to-rtmp bridge dropping audio rtp packet (opus transcode out of scope)");
            return Ok(vec![]);
        }

        let marker = packet.marker;
        let timestamp = packet.timestamp;
        let packets = {
            let mut buffered = self.buffered.lock().unwrap();
            buffered.push(packet);
            if !marker {
                return Ok(vec![]);
            }
            std::mem::take(&mut *buffered)
        };

        let nal_units = self.handler.depacketize(&packets).map_err(CoreError::from)?;
        let dts = rtp_timestamp_to_dts_ms(timestamp);
        Ok(nal_units
            .iter()
            .map(|nal| MediaItem::Flv(MediaPacket::new(MediaKind::Video, dts, nal_to_flv_payload(nal))))
            .collect())
    }
}

/// Translates an SRT publish's FLV video into RTP for an RTC
/// subscriber. SRT ingress already demuxes MPEG-TS into the same
/// FLV-shaped `MediaPacket`s RTMP produces (see `srt-ingest`'s
/// `ts.rs`), so the encoding side is identical to `RtmpToRtc`; this
/// wraps it under the name the bridge registry actually looks up.
pub struct SrtToRtc(RtmpToRtc);

impl SrtToRtc {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        SrtToRtc(RtmpToRtc::new(ssrc, payload_type))
    }
}

#[async_trait]
impl Translate for SrtToRtc {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        self.0.translate(item).await
    }
}

/// Translates an RTSP publish's RTP into FLV for an RTMP subscriber.
/// RTSP's interleaved RTP carries the same RFC 6184 H.264 payload
/// format an RTC publisher does, so depacketization is identical to
/// `RtcToRtmp`.
pub struct RtspToRtmp(RtcToRtmp);

impl RtspToRtmp {
    pub fn new() -> Self {
        RtspToRtmp(RtcToRtmp::new())
    }
}

impl Default for RtspToRtmp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Translate for RtspToRtmp {
    async fn translate(&self, item: MediaItem) -> CoreResult<Vec<MediaItem>> {
        self.0.translate(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn flv_video_tag(keyframe: bool, nal_payload: &[u8]) -> MediaPacket {
        let mut buf = BytesMut::new();
        buf.put_u8(if keyframe { 0x17 } else { 0x27 });
        buf.put_u8(1);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u32(nal_payload.len() as u32);
        buf.put_slice(nal_payload);
        MediaPacket::new(MediaKind::Video, 40, buf.freeze())
    }

    #[tokio::test]
    async fn rtmp_to_rtc_packetizes_video_nal() {
        let bridge = RtmpToRtc::new(0xAAAA, 96);
        let nal = [0x65, 0x88, 0x84, 0x00, 0x10];
        let packet = flv_video_tag(true, &nal);

        let items = bridge.translate(MediaItem::Flv(packet)).await.unwrap();
        assert_eq!(items.len(), 1);
        let MediaItem::Rtp(rtp) = &items[0] else { panic!("expected rtp item") };
        assert_eq!(rtp.ssrc, 0xAAAA);
        assert!(rtp.marker);
    }

    #[tokio::test]
    async fn rtmp_to_rtc_drops_sequence_header() {
        let bridge = RtmpToRtc::new(0xAAAA, 96);
        let packet = MediaPacket::new(MediaKind::Video, 0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        let items = bridge.translate(MediaItem::Flv(packet)).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn rtc_to_rtmp_round_trips_single_nal_frame() {
        let rtmp_to_rtc = RtmpToRtc::new(0xBBBB, 96);
        let nal = [0x65, 0x88, 0x84, 0x00, 0x10];
        let packet = flv_video_tag(true, &nal);
        let rtp_items = rtmp_to_rtc.translate(MediaItem::Flv(packet)).await.unwrap();

        let rtc_to_rtmp = RtcToRtmp::new();
        let mut flv_items = Vec::new();
        for item in rtp_items {
            flv_items.extend(rtc_to_rtmp.translate(item).await.unwrap());
        }

        assert_eq!(flv_items.len(), 1);
        let MediaItem::Flv(flv) = &flv_items[0] else { panic!("expected flv item") };
        assert!(flv.is_keyframe());
    }

    #[tokio::test]
    async fn rtc_to_rtmp_drops_audio() {
        let bridge = RtcToRtmp::new();
        let packet = proto_types::RtpEnvelope::new(1, 0, 0, 8, true, Bytes::from_static(b"audio"));
        let items = bridge.translate(MediaItem::Rtp(packet)).await.unwrap();
        assert!(items.is_empty());
    }
}
