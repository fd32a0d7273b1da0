//! The RTMP publish/play session loop: handshake, then chunk assembly,
//! AMF0 command dispatch, publish-token arbitration and forwarding to
//! (or from) the attached `Source`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use admission::{PublishToken, PublishTokenRegistry, StatsRegistry};
use proto_types::{CoreError, CoreResult, MediaKind, MediaPacket, Session, StreamUrl};
use source_hub::{MediaItem, Source, SourceManager};
use streamrt::Interrupt;

use crate::amf0::{parse_command, Amf0Value};
use crate::chunk::{self, ChunkAssembler, MESSAGE_TYPE_AMF0_COMMAND, MESSAGE_TYPE_AUDIO, MESSAGE_TYPE_VIDEO, SET_CHUNK_SIZE_MESSAGE_TYPE};
use crate::handshake;

const COMMAND_CSID: u32 = 3;
const MEDIA_CSID: u32 = 4;
const DEFAULT_STREAM_ID: u32 = 1;

enum Role {
    None,
    Publishing {
        source: Arc<Source>,
        _token: PublishToken,
    },
    Subscribing {
        forward: JoinHandle<()>,
    },
}

pub struct RtmpSession<S> {
    stream: Option<S>,
    manager: Arc<SourceManager>,
    tokens: Arc<PublishTokenRegistry>,
    stats: Arc<StatsRegistry>,
    interrupt: Interrupt,
    app: String,
    role: Role,
}

impl<S> RtmpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, manager: Arc<SourceManager>, tokens: Arc<PublishTokenRegistry>, stats: Arc<StatsRegistry>) -> Self {
        RtmpSession {
            stream: Some(stream),
            manager,
            tokens,
            stats,
            interrupt: Interrupt::new(),
            app: String::new(),
            role: Role::None,
        }
    }

    async fn run(&mut self) -> CoreResult<()> {
        let mut stream = self.stream.take().expect("stream consumed twice");
        handshake::server_handshake(&mut stream).await?;
        let (mut reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(AsyncMutex::new(writer));

        let mut assembler = ChunkAssembler::new();
        loop {
            self.interrupt.guard(std::future::ready(())).await?;
            let message = loop {
                if let Some(m) = assembler.read_chunk(&mut reader).await? {
                    break m;
                }
            };

            match message.type_id {
                SET_CHUNK_SIZE_MESSAGE_TYPE => {
                    if message.payload.len() >= 4 {
                        let size = u32::from_be_bytes(message.payload[0..4].try_into().unwrap());
                        assembler.set_read_chunk_size(size as usize);
                    }
                }
                MESSAGE_TYPE_AMF0_COMMAND => {
                    let command = parse_command(&message.payload)?;
                    self.dispatch_command(&command, &writer).await?;
                }
                MESSAGE_TYPE_AUDIO => self.ingest(MediaKind::Audio, message.timestamp, message.payload),
                MESSAGE_TYPE_VIDEO => self.ingest(MediaKind::Video, message.timestamp, message.payload),
                other => debug!(message_type = other, "ignoring unhandled RTMP message type"),
            }
        }
    }

    fn ingest(&self, kind: MediaKind, timestamp: u32, payload: Bytes) {
        if let Role::Publishing { source, .. } = &self.role {
            self.stats.on_publish_bytes(&source.url, payload.len() as u64);
            source.on_flv(MediaPacket::new(kind, timestamp as i64, payload));
        }
    }

    async fn dispatch_command<W>(&mut self, command: &crate::amf0::Command, writer: &Arc<AsyncMutex<W>>) -> CoreResult<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        match command.name.as_str() {
            "connect" => {
                if let Some(app) = command.command_object.as_ref().and_then(|o| o.as_object()).and_then(|o| o.get("app")).and_then(|v| v.as_str()) {
                    self.app = app.to_string();
                }
                reply_connect_success(writer, command.transaction_id).await
            }
            "createStream" => reply_create_stream(writer, command.transaction_id).await,
            "FCPublish" => Ok(()),
            "publish" => self.handle_publish(command, writer).await,
            "play" => self.handle_play(command, writer).await,
            "deleteStream" | "closeStream" => {
                self.role = Role::None;
                Ok(())
            }
            other => {
                debug!(command = other, "ignoring unrecognised RTMP command");
                Ok(())
            }
        }
    }

    async fn handle_publish<W>(&mut self, command: &crate::amf0::Command, writer: &Arc<AsyncMutex<W>>) -> CoreResult<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stream_name = command
            .args
            .first()
            .and_then(Amf0Value::as_str)
            .ok_or_else(|| CoreError::Protocol("publish missing stream name".into()))?;
        let url = StreamUrl::new("__defaultVhost__", self.app.clone(), stream_name);

        let token = self.tokens.acquire(&url, format!("rtmp:{}", url.canonical_key()))?;
        let source = self.manager.fetch_or_create(&url);
        source.on_publish();
        info!(stream = %url, "rtmp publish started");
        self.role = Role::Publishing { source, _token: token };

        reply_on_status(writer, "status", "NetStream.Publish.Start", "Publish started.").await
    }

    async fn handle_play<W>(&mut self, command: &crate::amf0::Command, writer: &Arc<AsyncMutex<W>>) -> CoreResult<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stream_name = command
            .args
            .first()
            .and_then(Amf0Value::as_str)
            .ok_or_else(|| CoreError::Protocol("play missing stream name".into()))?;
        let url = StreamUrl::new("__defaultVhost__", self.app.clone(), stream_name);

        let source = self.manager.fetch_or_create(&url);
        let consumer = source.create_consumer();
        self.stats.on_client_connect(&url);
        info!(stream = %url, "rtmp play started");

        let writer_task = Arc::clone(writer);
        let forward = tokio::spawn(async move {
            loop {
                let item = match consumer.recv().await {
                    Ok(item) => item,
                    Err(_closed) => return,
                };
                let MediaItem::Flv(packet) = item else { continue };
                let message_type = if packet.kind == MediaKind::Audio { MESSAGE_TYPE_AUDIO } else { MESSAGE_TYPE_VIDEO };
                let mut w = writer_task.lock().await;
                let _ = chunk::write_message(
                    &mut *w,
                    MEDIA_CSID,
                    message_type,
                    DEFAULT_STREAM_ID,
                    packet.dts as u32,
                    packet.payload(),
                    chunk::DEFAULT_CHUNK_SIZE,
                )
                .await;
            }
        });
        self.role = Role::Subscribing { forward };

        reply_on_status(&writer, "status", "NetStream.Play.Start", "Play started.").await
    }
}

async fn reply_connect_success<W>(writer: &Arc<AsyncMutex<W>>, transaction_id: f64) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut properties = BTreeMap::new();
    properties.insert("fmsVer".to_string(), Amf0Value::String("FMS/3,5,5,2004".to_string()));
    properties.insert("capabilities".to_string(), Amf0Value::Number(31.0));

    let mut information = BTreeMap::new();
    information.insert("level".to_string(), Amf0Value::String("status".to_string()));
    information.insert("code".to_string(), Amf0Value::String("NetConnection.Connect.Success".to_string()));
    information.insert("description".to_string(), Amf0Value::String("Connection succeeded.".to_string()));

    let values = vec![
        Amf0Value::String("_result".to_string()),
        Amf0Value::Number(transaction_id),
        Amf0Value::Object(properties),
        Amf0Value::Object(information),
    ];
    send_command(writer, &values).await
}

async fn reply_create_stream<W>(writer: &Arc<AsyncMutex<W>>, transaction_id: f64) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let values = vec![
        Amf0Value::String("_result".to_string()),
        Amf0Value::Number(transaction_id),
        Amf0Value::Null,
        Amf0Value::Number(DEFAULT_STREAM_ID as f64),
    ];
    send_command(writer, &values).await
}

async fn reply_on_status<W>(writer: &Arc<AsyncMutex<W>>, level: &str, code: &str, description: &str) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut info = BTreeMap::new();
    info.insert("level".to_string(), Amf0Value::String(level.to_string()));
    info.insert("code".to_string(), Amf0Value::String(code.to_string()));
    info.insert("description".to_string(), Amf0Value::String(description.to_string()));

    let values = vec![
        Amf0Value::String("onStatus".to_string()),
        Amf0Value::Number(0.0),
        Amf0Value::Null,
        Amf0Value::Object(info),
    ];
    send_command(writer, &values).await
}

async fn send_command<W>(writer: &Arc<AsyncMutex<W>>, values: &[Amf0Value]) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = crate::amf0::encode_values(values);
    let mut w = writer.lock().await;
    chunk::write_message(&mut *w, COMMAND_CSID, MESSAGE_TYPE_AMF0_COMMAND, 0, 0, &payload, chunk::DEFAULT_CHUNK_SIZE).await
}

#[async_trait]
impl<S> Session for RtmpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn cycle(mut self: Box<Self>) -> CoreResult<()> {
        let result = self.run().await;
        if let Role::Publishing { source, .. } = &self.role {
            source.on_unpublish();
            self.manager.schedule_disposal_check(source.url.clone());
        }
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
    use streamcfg::SourceConfig;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn fixtures() -> (Arc<SourceManager>, Arc<PublishTokenRegistry>, Arc<StatsRegistry>) {
        (
            SourceManager::new(SourceConfig::default()),
            PublishTokenRegistry::new(),
            Arc::new(StatsRegistry::new()),
        )
    }

    async fn drive_handshake(client: &mut (impl AsyncRead + AsyncWrite + Unpin)) {
        client.write_all(&[3u8]).await.unwrap();
        client.write_all(&[0u8; 1536]).await.unwrap();
        client.flush().await.unwrap();
        let mut s0 = [0u8; 1];
        client.read_exact(&mut s0).await.unwrap();
        let mut s1 = [0u8; 1536];
        client.read_exact(&mut s1).await.unwrap();
        let mut s2 = [0u8; 1536];
        client.read_exact(&mut s2).await.unwrap();
        client.write_all(&s1).await.unwrap();
        client.flush().await.unwrap();
    }

    fn command_message(csid: u32, stream_id: u32, values: &[Amf0Value]) -> Vec<u8> {
        let payload = crate::amf0::encode_values(values);
        let mut message = vec![csid as u8];
        message.extend_from_slice(&0u32.to_be_bytes()[1..]);
        message.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
        message.push(MESSAGE_TYPE_AMF0_COMMAND);
        message.extend_from_slice(&stream_id.to_le_bytes());
        message.extend_from_slice(&payload);
        message
    }

    #[tokio::test]
    async fn publish_attaches_source_and_ingests_video() {
        let (manager, tokens, stats) = fixtures();
        let (server, mut client) = duplex(1 << 20);
        let session = Box::new(RtmpSession::new(server, Arc::clone(&manager), tokens, stats));

        let driver = tokio::spawn(async move {
            drive_handshake(&mut client).await;

            let mut connect_object = BTreeMap::new();
            connect_object.insert("app".to_string(), Amf0Value::String("live".to_string()));
            client
                .write_all(&command_message(
                    3,
                    0,
                    &[Amf0Value::String("connect".to_string()), Amf0Value::Number(1.0), Amf0Value::Object(connect_object)],
                ))
                .await
                .unwrap();

            client
                .write_all(&command_message(3, 0, &[Amf0Value::String("createStream".to_string()), Amf0Value::Number(2.0), Amf0Value::Null]))
                .await
                .unwrap();

            client
                .write_all(&command_message(
                    3,
                    1,
                    &[
                        Amf0Value::String("publish".to_string()),
                        Amf0Value::Number(3.0),
                        Amf0Value::Null,
                        Amf0Value::String("mystream".to_string()),
                        Amf0Value::String("live".to_string()),
                    ],
                ))
                .await
                .unwrap();

            let mut video = vec![4u8];
            video.extend_from_slice(&0u32.to_be_bytes()[1..]);
            video.extend_from_slice(&2u32.to_be_bytes()[1..]);
            video.push(MESSAGE_TYPE_VIDEO);
            video.extend_from_slice(&1u32.to_le_bytes());
            video.extend_from_slice(&[0x17, 0x01]);
            client.write_all(&video).await.unwrap();
            client.flush().await.unwrap();

            // Drain whatever replies the server sent so its write side
            // doesn't back up while the test waits on the source state.
            let mut buf = [0u8; 1024];
            let _ = tokio::time::timeout(std::time::Duration::from_millis(200), client.read(&mut buf)).await;
            client
        });

        let cycle = tokio::spawn(session.cycle());

        let url = StreamUrl::new("__defaultVhost__", "live", "mystream");
        let mut attached = false;
        for _ in 0..50 {
            if let Some(source) = manager.fetch(&url) {
                if source.has_publisher() {
                    attached = true;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(attached, "publish should attach a source with an active publisher");

        cycle.abort();
        let _ = driver.await;
    }
}
