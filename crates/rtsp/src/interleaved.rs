//! Interleaved binary data per RFC 2326 §10.12: an RTSP connection using
//! TCP transport can carry RTP/RTCP frames inline, each prefixed with a
//! `$` byte, a one-byte channel id, and a two-byte big-endian length.
//! These frames can appear in between textual requests/responses on the
//! same connection and must be skipped transparently while scanning for
//! the next request's header block.

use bytes::Bytes;

use proto_types::{CoreError, CoreResult};

const FRAME_MAGIC: u8 = b'$';
const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Clone)]
pub struct InterleavedFrame {
    pub channel: u8,
    pub payload: Bytes,
}

/// If `buf` starts with an interleaved frame, return it along with the
/// number of bytes it occupies. Returns `Ok(None)` when `buf` doesn't
/// start with `$` (the caller should parse an RTSP request instead), and
/// an incomplete-frame condition is signalled by returning `Ok(None)`
/// only once enough bytes are known to exist; callers that haven't read
/// the full length yet should just keep reading.
pub fn try_take(buf: &[u8]) -> CoreResult<Option<(InterleavedFrame, usize)>> {
    if buf.is_empty() || buf[0] != FRAME_MAGIC {
        return Ok(None);
    }
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let channel = buf[1];
    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let total = FRAME_HEADER_LEN + length;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((
        InterleavedFrame {
            channel,
            payload: Bytes::copy_from_slice(&buf[FRAME_HEADER_LEN..total]),
        },
        total,
    )))
}

/// Encode a frame for the wire, as a session writing RTCP reports back
/// over the interleaved channel would.
pub fn encode(channel: u8, payload: &[u8]) -> CoreResult<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(CoreError::Protocol("interleaved frame payload exceeds 65535 bytes".into()));
    }
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.push(FRAME_MAGIC);
    out.push(channel);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Strip every complete leading interleaved frame off `buf`, returning
/// them in order along with the offset of the first byte that isn't part
/// of one (either the start of an RTSP request, or an incomplete frame
/// still waiting on more bytes).
pub fn drain_leading_frames(buf: &[u8]) -> CoreResult<(Vec<InterleavedFrame>, usize)> {
    let mut offset = 0;
    let mut frames = Vec::new();
    while let Some((frame, consumed)) = try_take(&buf[offset..])? {
        offset += consumed;
        frames.push(frame);
    }
    Ok((frames, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_frame() {
        let raw = encode(0, b"rtcp-report").unwrap();
        let (frame, consumed) = try_take(&raw).unwrap().unwrap();
        assert_eq!(frame.channel, 0);
        assert_eq!(&frame.payload[..], b"rtcp-report");
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn returns_none_for_non_dollar_prefixed_buffer() {
        let raw = b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\n";
        assert!(try_take(raw).unwrap().is_none());
    }

    #[test]
    fn returns_none_when_frame_is_not_fully_buffered_yet() {
        let raw = encode(1, b"partial-payload").unwrap();
        assert!(try_take(&raw[..raw.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn drains_multiple_frames_and_stops_at_request_text() {
        let mut data = encode(0, b"one").unwrap();
        data.extend_from_slice(&encode(1, b"two").unwrap());
        data.extend_from_slice(b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\n");

        let (frames, offset) = drain_leading_frames(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].payload[..], b"one");
        assert_eq!(&frames[1].payload[..], b"two");
        assert_eq!(&data[offset..], b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\n");
    }

    #[test]
    fn rejects_oversized_payload_on_encode() {
        let huge = vec![0u8; u16::MAX as usize + 1];
        assert!(encode(0, &huge).is_err());
    }
}
