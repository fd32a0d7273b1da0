//! RTSP listener: answers the narrow set of requests `rtsp_ingest`
//! understands, resolves the stream identity off the first DESCRIBE/SETUP
//! request, and feeds depacketized interleaved RTP into the same
//! canonical `Source` an RTMP publish under that URL would use — an
//! `RtspToRtmp` bridge re-publishes it as FLV so RTMP/HLS subscribers see
//! the stream too.

use std::sync::Arc;

use proto_types::StreamUrl;
use rtc::rtp_handler;
use rtsp_ingest::{Method, RtspEvent};
use source_hub::{Bridge, Source};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// RTSP interleaved channels come in RTP/RTCP pairs per RFC 2326 §10.12;
/// by convention the even channel of a pair carries RTP.
fn is_rtp_channel(channel: u8) -> bool {
    channel % 2 == 0
}

/// Recover a canonical stream identity from a request URI like
/// `rtsp://host/live/foo` (DESCRIBE) or `rtsp://host/live/foo/trackID=0`
/// (SETUP), stripping the scheme/host and any trailing track selector.
fn stream_url_from_uri(uri: &str) -> Option<StreamUrl> {
    let after_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let path = after_scheme.split_once('/').map(|(_, rest)| rest)?;
    let mut segments: Vec<&str> = path.split('/').collect();
    if segments
        .last()
        .is_some_and(|s| s.to_ascii_lowercase().starts_with("trackid="))
    {
        segments.pop();
    }
    StreamUrl::parse(&format!("/{}", segments.join("/")), "")
}

pub async fn serve(state: Arc<AppState>, addr: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| anyhow::anyhow!("failed to bind rtsp listener on {addr}: {err}"))?;
    info!(addr, "rtsp listener started");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "rtsp accept failed");
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            let mut source: Option<Arc<Source>> = None;
            let mut bridge_started = false;

            let result = rtsp_ingest::serve(stream, |event| match event {
                RtspEvent::Request(req) if matches!(req.method, Method::Describe | Method::Setup) => {
                    if source.is_some() {
                        return;
                    }
                    let Some(url) = stream_url_from_uri(&req.uri) else {
                        debug!(uri = %req.uri, "rtsp request uri did not resolve to a stream url");
                        return;
                    };
                    let fetched = state.sources.fetch_or_create(&url);
                    fetched.on_publish();
                    source = Some(fetched);
                }
                RtspEvent::Interleaved(frame) => {
                    let Some(src) = source.as_ref() else {
                        return;
                    };
                    if !is_rtp_channel(frame.channel) {
                        return;
                    }
                    if !bridge_started {
                        bridge_started = true;
                        let bridge_source = src.clone();
                        let upstream = bridge_source.create_consumer();
                        tokio::spawn(async move {
                            let bridge = Bridge::new(bridge_source, Arc::new(rtc::RtspToRtmp::new()));
                            bridge.run(upstream).await;
                        });
                    }
                    match rtp_handler::parse(&frame.payload) {
                        Ok(packet) => src.on_rtp(packet),
                        Err(err) => {
                            debug!(channel = frame.channel, error = %err, "rtsp interleaved frame is not a valid rtp packet")
                        }
                    }
                }
                _ => {}
            })
            .await;

            if let Some(src) = source.take() {
                src.on_unpublish();
            }
            if let Err(err) = result {
                warn!(%peer, error = %err, "rtsp session ended");
            }
        });
    }
}
