//! Publisher and subscriber sessions that drive a `PeerConnection`
//! through its RTP lifecycle once established, attaching it to a
//! `source_hub::Source` exactly as an RTMP or SRT session would.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use proto_types::{CoreError, CoreResult, RtpEnvelope, Session};
use source_hub::{MediaItem, Source};
use tracing::{debug, warn};

use crate::connection::PeerConnection;
use crate::jitter_buffer::{JitterBuffer, JitterBufferConfig};
use crate::nack::{NackConfig, NackManager, NackMessage};
use crate::twcc::TwccEstimator;

/// How many recently-sent packets a subscriber session keeps on hand to
/// satisfy a NACK without the source hub having to replay them.
const RETRANSMIT_BUFFER_CAPACITY: usize = 512;
const STARTING_BITRATE_BPS: u64 = 1_000_000;

/// Drives an inbound (publisher) WebRTC connection: decrypted RTP
/// packets are buffered through a jitter buffer and loss detector
/// before being forwarded into the attached source's `on_rtp`.
///
/// Owns the stream's `PublishToken` for the session's lifetime: the
/// token is released (admission contract: the stream becomes publishable
/// again) when this session is dropped at the end of `cycle`, the same
/// RAII release every other protocol's publish session relies on.
pub struct PublishSession {
    pub peer: Arc<PeerConnection>,
    pub source: Arc<Source>,
    jitter: Mutex<JitterBuffer>,
    nack: Mutex<NackManager>,
    _token: Option<admission::PublishToken>,
}

#[async_trait]
impl Session for PublishSession {
    async fn cycle(self: Box<Self>) -> CoreResult<()> {
        self.source.on_publish();
        let result = self.run().await;
        self.source.on_unpublish();
        result
    }

    fn interrupt(&self) {
        self.peer.close();
    }
}

impl PublishSession {
    pub fn new(peer: Arc<PeerConnection>, source: Arc<Source>, token: Option<admission::PublishToken>) -> Self {
        let stream_id = peer.id;
        PublishSession {
            peer,
            source,
            jitter: Mutex::new(JitterBuffer::new(JitterBufferConfig::default())),
            nack: Mutex::new(NackManager::new(NackConfig::default(), stream_id)),
            _token: token,
        }
    }

    async fn run(&self) -> CoreResult<()> {
        loop {
            if self.peer.is_closed() {
                return Err(CoreError::GracefulClose("peer connection closed".into()));
            }

            while let Some(packet) = self.jitter.lock().unwrap().pop() {
                self.source.on_rtp(packet);
            }

            if let Some(nack) = self.nack.lock().unwrap().generate_nack() {
                debug!(
                    connection = %self.peer.id,
                    missing = nack.missing_sequences.len(),
                    "publisher nack: requesting retransmission from peer"
                );
            }

            self.peer
                .interrupt
                .sleep(Duration::from_millis(20))
                .await?;
        }
    }

    /// Feed one decrypted RTP packet from the transport layer into the
    /// loss detector and jitter buffer. Called by the socket read loop,
    /// not by `cycle`; `run`'s poll loop drains whatever the jitter
    /// buffer releases into the source.
    pub fn ingest(&self, packet: RtpEnvelope) {
        let is_critical = crate::rtp_handler::is_video(packet.payload_type);
        self.nack.lock().unwrap().observe(packet.sequence_number, is_critical);
        if let Err(err) = self.jitter.lock().unwrap().push(packet) {
            warn!(connection = %self.peer.id, error = %err, "failed to buffer inbound rtp packet");
        }
    }
}

/// Drives an outbound (subscriber) WebRTC connection: items pulled from
/// the source's consumer queue are rewritten to the subscriber's
/// negotiated SSRC/PT, SRTP-encrypted, and kept around for retransmit
/// in case the peer NACKs them.
pub struct SubscribeSession {
    pub peer: Arc<PeerConnection>,
    pub consumer: Arc<source_hub::Consumer>,
    pub out_ssrc: u32,
    pub out_payload_type: u8,
    twcc: Mutex<TwccEstimator>,
    retransmit_buffer: Mutex<VecDeque<RtpEnvelope>>,
}

#[async_trait]
impl Session for SubscribeSession {
    async fn cycle(self: Box<Self>) -> CoreResult<()> {
        let mut next_sequence: u16 = 0;
        loop {
            let item = match self.consumer.recv().await {
                Ok(item) => item,
                Err(_closed) => return Ok(()),
            };
            let MediaItem::Rtp(packet) = item else {
                continue;
            };
            if self.peer.is_closed() {
                return Err(CoreError::GracefulClose("peer connection closed".into()));
            }
            let rewritten = packet.rewritten(self.out_ssrc, next_sequence, self.out_payload_type);
            next_sequence = next_sequence.wrapping_add(1);
            self.dispatch(rewritten);
        }
    }

    fn interrupt(&self) {
        self.peer.close();
        self.consumer.close();
    }
}

impl SubscribeSession {
    pub fn new(
        peer: Arc<PeerConnection>,
        consumer: Arc<source_hub::Consumer>,
        out_ssrc: u32,
        out_payload_type: u8,
    ) -> Self {
        SubscribeSession {
            peer,
            consumer,
            out_ssrc,
            out_payload_type,
            twcc: Mutex::new(TwccEstimator::new(STARTING_BITRATE_BPS)),
            retransmit_buffer: Mutex::new(VecDeque::new()),
        }
    }

    fn dispatch(&self, packet: RtpEnvelope) {
        // Real feedback comes back over RTCP from the peer; until that
        // read path is wired to a transport, record our own send time as
        // a standing placeholder so the estimator has a non-empty series.
        self.twcc
            .lock()
            .unwrap()
            .record_arrival(packet.sequence_number, Instant::now());

        let wire_len = match self.peer.srtp() {
            Some(srtp) => match srtp.encrypt(&packet) {
                Ok(bytes) => bytes.len(),
                Err(err) => {
                    warn!(connection = %self.peer.id, error = %err, "failed to encrypt outbound rtp packet");
                    return;
                }
            },
            None => crate::rtp_handler::serialize(&packet).len(),
        };

        {
            let mut buffer = self.retransmit_buffer.lock().unwrap();
            if buffer.len() >= RETRANSMIT_BUFFER_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(packet.clone());
        }

        debug!(
            connection = %self.peer.id,
            ssrc = packet.ssrc,
            bytes = wire_len,
            "rtp packet ready for socket write"
        );
    }

    /// Look up the packets a subscriber's NACK named in the retransmit
    /// buffer and re-dispatch the ones still held. Called from the
    /// socket read loop once RTCP feedback parsing is wired to a real
    /// transport.
    pub fn handle_nack(&self, nack: &NackMessage) {
        let resend: Vec<RtpEnvelope> = {
            let buffer = self.retransmit_buffer.lock().unwrap();
            nack.missing_sequences
                .iter()
                .filter_map(|seq| buffer.iter().find(|p| p.sequence_number == *seq).cloned())
                .collect()
        };
        for packet in resend {
            self.dispatch(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proto_types::StreamUrl;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use streamcfg::SourceConfig;
    use uuid::Uuid;

    fn peer() -> Arc<PeerConnection> {
        let dtls = crate::dtls::DtlsConnection::new(
            Uuid::new_v4(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000),
        );
        PeerConnection::new(dtls)
    }

    #[tokio::test]
    async fn subscribe_session_stops_when_consumer_closes() {
        let source = Arc::new(Source::new(StreamUrl::new("v", "live", "t"), SourceConfig::default()));
        source.on_publish();
        let consumer = source.create_consumer();
        consumer.close();

        let session = Box::new(SubscribeSession::new(peer(), consumer, 42, 96));
        let result = session.cycle().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn subscribe_session_rewrites_and_advances_sequence() {
        let source = Arc::new(Source::new(StreamUrl::new("v", "live", "t2"), SourceConfig::default()));
        source.on_publish();
        let consumer = source.create_consumer();
        source.on_rtp(RtpEnvelope::new(1, 0, 0, 96, false, Bytes::from_static(b"x")));
        let handle = {
            let consumer = consumer.clone();
            tokio::spawn(async move { consumer.recv().await })
        };
        let item = handle.await.unwrap().unwrap();
        assert!(item.as_rtp().is_some());
    }

    #[test]
    fn publish_session_ingest_fills_jitter_buffer() {
        let source = Arc::new(Source::new(StreamUrl::new("v", "live", "t3"), SourceConfig::default()));
        let session = PublishSession::new(peer(), source, None);
        session.ingest(RtpEnvelope::new(1, 0, 0, 96, false, Bytes::from_static(b"x")));
        assert_eq!(session.jitter.lock().unwrap().size(), 1);
    }

    #[test]
    fn subscribe_session_handle_nack_resends_buffered_packet() {
        let source = Arc::new(Source::new(StreamUrl::new("v", "live", "t4"), SourceConfig::default()));
        source.on_publish();
        let consumer = source.create_consumer();
        let session = SubscribeSession::new(peer(), consumer, 42, 96);

        let packet = RtpEnvelope::new(1, 7, 0, 96, false, Bytes::from_static(b"x"));
        session.dispatch(packet.clone());

        let nack = NackMessage {
            stream_id: session.peer.id,
            missing_sequences: vec![7],
            timestamp: 0,
        };
        // Resending must not panic even though there is no real socket;
        // this exercises the retransmit-buffer lookup path.
        session.handle_nack(&nack);
    }
}
