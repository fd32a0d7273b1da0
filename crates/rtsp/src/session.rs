//! Reads an RTSP connection's byte stream and demultiplexes it into
//! [`RtspRequest`]s and [`InterleavedFrame`]s, replying to the handful of
//! methods this server understands. No media is sourced or consumed here;
//! that's left to callers that want to bridge the interleaved channels
//! into the shared source hub.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use proto_types::{CoreError, CoreResult};

use crate::interleaved::{self, InterleavedFrame};
use crate::request::{build_response, headers_end, parse_headers, Method, RtspRequest};

const READ_CHUNK: usize = 4096;
const MAX_PENDING_BYTES: usize = 1 << 20;

/// One item produced while draining an RTSP connection's byte stream.
pub enum RtspEvent {
    Request(RtspRequest),
    Interleaved(InterleavedFrame),
}

/// Buffers raw bytes off an `AsyncRead` and yields complete requests and
/// interleaved frames in wire order, regardless of how the underlying
/// reads happen to chunk them.
pub struct RtspReader<S> {
    stream: S,
    buffer: BytesMut,
}

impl<S> RtspReader<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: S) -> Self {
        RtspReader { stream, buffer: BytesMut::new() }
    }

    pub async fn next_event(&mut self) -> CoreResult<Option<RtspEvent>> {
        loop {
            if let Some(event) = self.try_parse_buffered()? {
                return Ok(Some(event));
            }
            if self.buffer.len() > MAX_PENDING_BYTES {
                return Err(CoreError::Protocol("RTSP connection exceeded max buffered bytes without a complete message".into()));
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(|err| CoreError::Resource(err.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn try_parse_buffered(&mut self) -> CoreResult<Option<RtspEvent>> {
        if let Some((frame, consumed)) = interleaved::try_take(&self.buffer)? {
            let _ = self.buffer.split_to(consumed);
            return Ok(Some(RtspEvent::Interleaved(frame)));
        }
        let Some(end) = headers_end(&self.buffer) else {
            return Ok(None);
        };
        let header_bytes = self.buffer.split_to(end);
        let mut req = parse_headers(&header_bytes)?;
        let body_len = req.content_length();
        if self.buffer.len() < body_len {
            // Not enough body buffered yet; put the headers back and wait.
            // Requests with bodies are rare in this method set (SETUP/PLAY
            // don't carry one), so this path favors simplicity over zero-copy.
            let mut restored = header_bytes;
            restored.unsplit(std::mem::take(&mut self.buffer));
            self.buffer = restored;
            return Ok(None);
        }
        req.body = self.buffer.split_to(body_len).freeze();
        Ok(Some(RtspEvent::Request(req)))
    }
}

/// Build the response this server sends for a given request, without any
/// media-plane side effects (the caller decides how SETUP/PLAY map onto
/// its own transport state).
pub fn respond_to(request: &RtspRequest) -> Vec<u8> {
    match request.method {
        Method::Options => build_response(
            request.cseq,
            200,
            "OK",
            &[("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN")],
        ),
        Method::Describe => build_response(request.cseq, 404, "Not Found", &[]),
        Method::Setup => build_response(request.cseq, 200, "OK", &[("Transport", request.header("transport").unwrap_or(""))]),
        Method::Play => build_response(request.cseq, 200, "OK", &[]),
        Method::Teardown => build_response(request.cseq, 200, "OK", &[]),
    }
}

/// Drive a connection to completion: read requests and interleaved
/// frames, answer requests immediately, and hand every event to
/// `on_event` before acting on it (so a caller that wants to track
/// SETUP/PLAY state, or forward interleaved frames elsewhere, sees both
/// request and frame traffic through one hook).
pub async fn serve<S>(stream: S, mut on_event: impl FnMut(&RtspEvent)) -> CoreResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = RtspReader::new(read_half);
    loop {
        match reader.next_event().await? {
            None => return Ok(()),
            Some(event) => {
                on_event(&event);
                match event {
                    RtspEvent::Interleaved(_) => {}
                    RtspEvent::Request(req) => {
                        let method = req.method;
                        let response = respond_to(&req);
                        write_half.write_all(&response).await.map_err(|err| CoreError::Resource(err.to_string()))?;
                        if method == Method::Teardown {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn reads_a_request_followed_by_an_interleaved_frame() {
        let (mut client, server) = duplex(1 << 16);
        let mut reader = RtspReader::new(server);

        let mut data = b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\nCSeq: 1\r\n\r\n".to_vec();
        data.extend_from_slice(&interleaved::encode(0, b"rtcp").unwrap());
        client.write_all(&data).await.unwrap();

        let first = reader.next_event().await.unwrap().unwrap();
        match first {
            RtspEvent::Request(req) => assert_eq!(req.method, Method::Options),
            _ => panic!("expected a request first"),
        }

        let second = reader.next_event().await.unwrap().unwrap();
        match second {
            RtspEvent::Interleaved(frame) => assert_eq!(&frame.payload[..], b"rtcp"),
            _ => panic!("expected an interleaved frame second"),
        }
    }

    #[tokio::test]
    async fn returns_none_on_clean_close() {
        let (client, server) = duplex(1 << 16);
        drop(client);
        let mut reader = RtspReader::new(server);
        assert!(reader.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn serve_answers_options_and_stops_on_teardown() {
        let (mut client, server) = duplex(1 << 16);
        let serving = tokio::spawn(serve(server, |_event| {
            debug!("unexpected event in this test");
        }));

        client
            .write_all(b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\nCSeq: 1\r\n\r\n")
            .await
            .unwrap();
        client
            .write_all(b"TEARDOWN rtsp://host/live/foo RTSP/1.0\r\nCSeq: 2\r\n\r\n")
            .await
            .unwrap();

        let mut response = [0u8; 256];
        let n = client.read(&mut response).await.unwrap();
        let text = String::from_utf8_lossy(&response[..n]);
        assert!(text.contains("200 OK"));

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), serving).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
