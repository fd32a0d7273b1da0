//! RTMP chunk stream assembly: basic header (1/2/3 bytes), message
//! header types 0-3 with their header-compression rules, and extended
//! timestamps. Reassembles chunks spread across an arbitrary chunk size
//! back into complete messages.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use proto_types::{CoreError, CoreResult};

pub const DEFAULT_CHUNK_SIZE: usize = 60_000;
pub const PEER_MIN_CHUNK_SIZE: usize = 128;
pub const SET_CHUNK_SIZE_MESSAGE_TYPE: u8 = 1;
pub const MESSAGE_TYPE_AUDIO: u8 = 8;
pub const MESSAGE_TYPE_VIDEO: u8 = 9;
pub const MESSAGE_TYPE_AMF0_DATA: u8 = 18;
pub const MESSAGE_TYPE_AMF0_COMMAND: u8 = 20;

#[derive(Debug, Clone)]
pub struct RtmpMessage {
    pub type_id: u8,
    pub timestamp: u32,
    pub stream_id: u32,
    pub payload: Bytes,
}

#[derive(Clone)]
struct ChunkStreamState {
    timestamp: u32,
    timestamp_delta: u32,
    message_length: usize,
    message_type_id: u8,
    message_stream_id: u32,
    buffer: BytesMut,
}

impl Default for ChunkStreamState {
    fn default() -> Self {
        ChunkStreamState {
            timestamp: 0,
            timestamp_delta: 0,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
            buffer: BytesMut::new(),
        }
    }
}

/// Per-connection chunk reassembly state. `read_peer_chunk_size` starts
/// at the RTMP-mandated minimum until a Set Chunk Size control message
/// raises it.
pub struct ChunkAssembler {
    states: HashMap<u32, ChunkStreamState>,
    read_chunk_size: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        ChunkAssembler {
            states: HashMap::new(),
            read_chunk_size: PEER_MIN_CHUNK_SIZE,
        }
    }

    pub fn set_read_chunk_size(&mut self, size: usize) {
        self.read_chunk_size = size.max(PEER_MIN_CHUNK_SIZE);
    }

    /// Read one chunk's worth of data and, if it completes the current
    /// message for that chunk stream id, return the assembled message.
    pub async fn read_chunk<R>(&mut self, reader: &mut R) -> CoreResult<Option<RtmpMessage>>
    where
        R: AsyncRead + Unpin,
    {
        let (fmt, csid) = read_basic_header(reader).await?;
        let state = self.states.entry(csid).or_default();

        match fmt {
            0 => {
                state.timestamp = read_u24(reader).await?;
                state.timestamp_delta = 0;
                state.message_length = read_u24(reader).await? as usize;
                state.message_type_id = reader.read_u8().await.map_err(net_err)?;
                state.message_stream_id = reader.read_u32_le().await.map_err(net_err)?;
                if state.timestamp == 0x00FF_FFFF {
                    state.timestamp = reader.read_u32().await.map_err(net_err)?;
                }
                state.buffer.clear();
            }
            1 => {
                state.timestamp_delta = read_u24(reader).await?;
                state.message_length = read_u24(reader).await? as usize;
                state.message_type_id = reader.read_u8().await.map_err(net_err)?;
                if state.timestamp_delta == 0x00FF_FFFF {
                    state.timestamp_delta = reader.read_u32().await.map_err(net_err)?;
                }
                state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                state.buffer.clear();
            }
            2 => {
                state.timestamp_delta = read_u24(reader).await?;
                if state.timestamp_delta == 0x00FF_FFFF {
                    state.timestamp_delta = reader.read_u32().await.map_err(net_err)?;
                }
                state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                state.buffer.clear();
            }
            3 => {
                // Continuation: reuses every field from the last header
                // on this chunk stream id. If this is the first chunk of
                // a new message (buffer empty), the timestamp still
                // advances by the last delta per the RTMP spec.
                if state.buffer.is_empty() {
                    state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                }
            }
            _ => unreachable!("basic header fmt is two bits"),
        }

        let remaining = state.message_length.saturating_sub(state.buffer.len());
        let take = remaining.min(self.read_chunk_size);
        if take > 0 {
            let mut chunk_data = vec![0u8; take];
            reader.read_exact(&mut chunk_data).await.map_err(net_err)?;
            state.buffer.extend_from_slice(&chunk_data);
        }

        if state.buffer.len() >= state.message_length {
            let message = RtmpMessage {
                type_id: state.message_type_id,
                timestamp: state.timestamp,
                stream_id: state.message_stream_id,
                payload: state.buffer.split().freeze(),
            };
            Ok(Some(message))
        } else {
            Ok(None)
        }
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one message as a type-0 chunk followed by type-3 continuations,
/// splitting the payload at `chunk_size` as the wire format requires.
pub async fn write_message<W>(
    writer: &mut W,
    csid: u32,
    message_type_id: u8,
    stream_id: u32,
    timestamp: u32,
    payload: &[u8],
    chunk_size: usize,
) -> CoreResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut header = BytesMut::new();
    write_basic_header(&mut header, 0, csid);
    header.extend_from_slice(&timestamp.to_be_bytes()[1..]);
    header.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
    header.extend_from_slice(&[message_type_id]);
    header.extend_from_slice(&stream_id.to_le_bytes());
    writer.write_all(&header).await.map_err(net_err)?;

    let mut offset = 0;
    let mut first = true;
    while offset < payload.len() || (payload.is_empty() && first) {
        let end = (offset + chunk_size).min(payload.len());
        if !first {
            let mut continuation = BytesMut::new();
            write_basic_header(&mut continuation, 3, csid);
            writer.write_all(&continuation).await.map_err(net_err)?;
        }
        writer.write_all(&payload[offset..end]).await.map_err(net_err)?;
        offset = end;
        first = false;
        if payload.is_empty() {
            break;
        }
    }
    writer.flush().await.map_err(net_err)?;
    Ok(())
}

fn write_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    if csid < 64 {
        buf.extend_from_slice(&[(fmt << 6) | csid as u8]);
    } else if csid < 320 {
        buf.extend_from_slice(&[fmt << 6, (csid - 64) as u8]);
    } else {
        let rel = csid - 64;
        buf.extend_from_slice(&[(fmt << 6) | 0x01, (rel & 0xFF) as u8, (rel >> 8) as u8]);
    }
}

async fn read_basic_header<R>(reader: &mut R) -> CoreResult<(u8, u32)>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await.map_err(net_err)?;
    let fmt = first >> 6;
    let low = first & 0x3F;
    let csid = match low {
        0 => 64 + reader.read_u8().await.map_err(net_err)? as u32,
        1 => {
            let b1 = reader.read_u8().await.map_err(net_err)? as u32;
            let b2 = reader.read_u8().await.map_err(net_err)? as u32;
            64 + b1 + b2 * 256
        }
        n => n as u32,
    };
    Ok((fmt, csid))
}

async fn read_u24<R>(reader: &mut R) -> CoreResult<u32>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 3];
    reader.read_exact(&mut buf).await.map_err(net_err)?;
    Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
}

fn net_err(err: std::io::Error) -> CoreError {
    CoreError::Resource(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn type0_header(csid: u8, ts: u32, len: u32, type_id: u8, stream_id: u32) -> Vec<u8> {
        let mut buf = vec![csid];
        buf.extend_from_slice(&ts.to_be_bytes()[1..]);
        buf.extend_from_slice(&len.to_be_bytes()[1..]);
        buf.push(type_id);
        buf.extend_from_slice(&stream_id.to_le_bytes());
        buf
    }

    #[tokio::test]
    async fn assembles_a_single_chunk_message() {
        let payload = vec![1u8, 2, 3, 4];
        let mut bytes = type0_header(3, 0, payload.len() as u32, 8, 1);
        bytes.extend_from_slice(&payload);
        let mut cursor = Cursor::new(bytes);

        let mut assembler = ChunkAssembler::new();
        let message = assembler.read_chunk(&mut cursor).await.unwrap().unwrap();
        assert_eq!(message.type_id, 8);
        assert_eq!(message.payload.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn splits_message_across_multiple_chunks() {
        let mut assembler = ChunkAssembler::new();
        assembler.set_read_chunk_size(2);

        let payload = vec![9u8, 8, 7, 6];
        let mut bytes = type0_header(3, 0, payload.len() as u32, 9, 1);
        bytes.extend_from_slice(&payload);
        let mut cursor = Cursor::new(bytes);

        let first = assembler.read_chunk(&mut cursor).await.unwrap();
        assert!(first.is_none());
        let second = assembler.read_chunk(&mut cursor).await;
        assert!(second.is_err() || second.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_message_round_trips_through_the_assembler() {
        let (mut a, mut b) = tokio::io::duplex(1 << 16);
        let payload = vec![5u8; 10];
        let payload_clone = payload.clone();
        let writer = tokio::spawn(async move {
            write_message(&mut a, 4, MESSAGE_TYPE_VIDEO, 1, 0, &payload_clone, 128)
                .await
                .unwrap();
        });

        let mut assembler = ChunkAssembler::new();
        let message = assembler.read_chunk(&mut b).await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!(message.type_id, MESSAGE_TYPE_VIDEO);
        assert_eq!(message.payload.as_ref(), payload.as_slice());
    }
}
