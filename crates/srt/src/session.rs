//! SRT publish/request session: negotiate the streamid, then bridge
//! between the TS-framed byte stream and the shared `Source`.
//!
//! The SRT handshake/congestion-control layer itself (the actual UDP
//! wire protocol) isn't part of this crate — it's the caller's transport,
//! handed to this session as any `AsyncRead + AsyncWrite` byte stream
//! once the streamid has already been read off it. That boundary mirrors
//! the `rtmp` crate's session, which is likewise transport-agnostic past
//! its own handshake.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use admission::{PublishToken, PublishTokenRegistry, StatsRegistry};
use proto_types::{CoreError, CoreResult, MediaKind, MediaPacket, Session, StreamUrl};
use source_hub::{MediaItem, Source, SourceManager};
use streamrt::Interrupt;

use crate::streamid::{Mode, StreamId};
use crate::ts::{encode_packets, TsFramer};

const VIDEO_PID: u16 = 0x100;
const AUDIO_PID: u16 = 0x101;
const READ_CHUNK: usize = 4096;

pub struct SrtSession<S> {
    stream: S,
    stream_id: StreamId,
    manager: Arc<SourceManager>,
    tokens: Arc<PublishTokenRegistry>,
    stats: Arc<StatsRegistry>,
    interrupt: Interrupt,
}

impl<S> SrtSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        stream_id: StreamId,
        manager: Arc<SourceManager>,
        tokens: Arc<PublishTokenRegistry>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        SrtSession {
            stream,
            stream_id,
            manager,
            tokens,
            stats,
            interrupt: Interrupt::new(),
        }
    }

    fn url(&self) -> StreamUrl {
        StreamUrl::new("__defaultVhost__", self.stream_id.app.clone(), self.stream_id.stream.clone())
    }

    async fn run(&mut self) -> CoreResult<()> {
        match self.stream_id.mode {
            Mode::Publish => self.run_publish().await,
            Mode::Request => self.run_request().await,
        }
    }

    async fn run_publish(&mut self) -> CoreResult<()> {
        let url = self.url();
        let _token: PublishToken = self.tokens.acquire(&url, format!("srt:{}", url.canonical_key()))?;
        let source = self.manager.fetch_or_create(&url);
        source.on_publish();
        info!(stream = %url, "srt publish started");

        let mut framer = TsFramer::new();
        let mut buf = [0u8; READ_CHUNK];
        let result = loop {
            let n = match self.interrupt.guard(self.stream.read(&mut buf)).await? {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(err) => break Err(CoreError::Resource(err.to_string())),
            };
            let packets = framer.feed(&buf[..n])?;
            for packet in packets {
                let kind = match packet.pid {
                    VIDEO_PID => MediaKind::Video,
                    AUDIO_PID => MediaKind::Audio,
                    other => {
                        debug!(pid = other, "ignoring ts packet on unmapped pid");
                        continue;
                    }
                };
                self.stats.on_publish_bytes(&url, packet.payload.len() as u64);
                source.on_flv(MediaPacket::new(kind, 0, packet.payload));
            }
        };

        source.on_unpublish();
        self.manager.schedule_disposal_check(url);
        result
    }

    async fn run_request(&mut self) -> CoreResult<()> {
        let url = self.url();
        let source = self.manager.fetch_or_create(&url);
        let consumer = source.create_consumer();
        self.stats.on_client_connect(&url);
        info!(stream = %url, "srt request started");

        let mut counter = 0u8;
        loop {
            let item = match self.interrupt.guard(consumer.recv()).await? {
                Ok(item) => item,
                Err(_closed) => return Ok(()),
            };
            let MediaItem::Flv(packet) = item else { continue };
            let pid = if packet.kind == MediaKind::Audio { AUDIO_PID } else { VIDEO_PID };
            let payload: Bytes = packet.payload().clone();
            let ts_packets = encode_packets(pid, &payload, counter);
            counter = counter.wrapping_add(ts_packets.len() as u8) & 0x0F;
            for raw in &ts_packets {
                self.stream.write_all(raw).await.map_err(|err| CoreError::Resource(err.to_string()))?;
            }
            self.stream.flush().await.map_err(|err| CoreError::Resource(err.to_string()))?;
        }
    }
}

#[async_trait]
impl<S> Session for SrtSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn cycle(mut self: Box<Self>) -> CoreResult<()> {
        let result = self.run().await;
        if result.as_ref().err().map(CoreError::is_benign).unwrap_or(true) {
            Ok(())
        } else {
            result
        }
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use streamcfg::SourceConfig;
    use tokio::io::duplex;

    fn fixtures() -> (Arc<SourceManager>, Arc<PublishTokenRegistry>, Arc<StatsRegistry>) {
        (
            SourceManager::new(SourceConfig::default()),
            PublishTokenRegistry::new(),
            Arc::new(StatsRegistry::new()),
        )
    }

    fn stream_id(mode: Mode) -> StreamId {
        StreamId {
            app: "live".to_string(),
            stream: "foo".to_string(),
            mode,
            params: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn publish_session_forwards_video_pid_into_source() {
        let (manager, tokens, stats) = fixtures();
        let (server, mut client) = duplex(1 << 16);
        let session = Box::new(SrtSession::new(server, stream_id(Mode::Publish), Arc::clone(&manager), tokens, stats));

        let url = StreamUrl::new("__defaultVhost__", "live", "foo");
        let consumer_probe = manager.fetch_or_create(&url).create_consumer();

        let cycle = tokio::spawn(session.cycle());

        let ts_packets = encode_packets(VIDEO_PID, b"frame-data", 0);
        for raw in &ts_packets {
            client.write_all(raw).await.unwrap();
        }
        drop(client);

        let item = tokio::time::timeout(std::time::Duration::from_secs(1), consumer_probe.recv())
            .await
            .expect("should receive forwarded packet")
            .unwrap();
        assert_eq!(item.as_flv().unwrap().payload().as_ref(), b"frame-data");

        let _ = cycle.await;
    }

    #[tokio::test]
    async fn request_session_stops_on_interrupt() {
        let (manager, tokens, stats) = fixtures();
        let (server, _client) = duplex(1 << 16);

        let session = SrtSession::new(server, stream_id(Mode::Request), manager, tokens, stats);
        let interrupt = session.interrupt.clone();
        let boxed: Box<dyn Session> = Box::new(session);
        let cycle = tokio::spawn(boxed.cycle());

        tokio::task::yield_now().await;
        interrupt.interrupt();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), cycle)
            .await
            .expect("session should stop promptly after interrupt")
            .unwrap();
        assert!(result.is_ok());
    }
}
