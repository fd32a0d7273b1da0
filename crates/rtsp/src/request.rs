//! RTSP request-line and header parsing (RFC 2326 §6), scoped to the
//! method set this server actually dispatches: `OPTIONS`, `DESCRIBE`,
//! `SETUP`, `PLAY`, `TEARDOWN`.

use std::collections::BTreeMap;

use bytes::Bytes;

use proto_types::{CoreError, CoreResult};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
}

impl Method {
    fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "DESCRIBE" => Ok(Method::Describe),
            "SETUP" => Ok(Method::Setup),
            "PLAY" => Ok(Method::Play),
            "TEARDOWN" => Ok(Method::Teardown),
            other => Err(CoreError::Protocol(format!("unsupported RTSP method {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Teardown => "TEARDOWN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    pub cseq: u32,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RtspRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> usize {
        self.header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0)
    }
}

/// Returns the byte offset just past the blank line terminating the
/// headers, or `None` if `buf` doesn't contain a complete header block
/// yet (the caller should keep reading).
pub fn headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|idx| idx + HEADER_TERMINATOR.len())
}

/// Parse the request line and headers out of `buf` (which must already
/// contain a complete header block per `headers_end`); `body` is supplied
/// separately once `content_length()` bytes have been read past it.
pub fn parse_headers(buf: &[u8]) -> CoreResult<RtspRequest> {
    let text = std::str::from_utf8(buf).map_err(|_| CoreError::Protocol("RTSP headers are not valid utf-8".into()))?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| CoreError::Protocol("empty RTSP request".into()))?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| CoreError::Protocol("missing RTSP method".into()))?;
    let uri = parts.next().ok_or_else(|| CoreError::Protocol("missing RTSP uri".into()))?.to_string();
    let version = parts.next().ok_or_else(|| CoreError::Protocol("missing RTSP version".into()))?;
    if !version.starts_with("RTSP/") {
        return Err(CoreError::Protocol(format!("not an RTSP request line: {request_line}")));
    }

    let mut headers = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| CoreError::Protocol(format!("malformed header: {line}")))?;
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let cseq = headers
        .get("cseq")
        .ok_or_else(|| CoreError::Protocol("RTSP request missing CSeq".into()))?
        .parse::<u32>()
        .map_err(|_| CoreError::Protocol("RTSP CSeq is not a number".into()))?;

    Ok(RtspRequest {
        method: Method::parse(method)?,
        uri,
        cseq,
        headers,
        body: Bytes::new(),
    })
}

/// Build a minimal RTSP response: status line, `CSeq` echoed back, and
/// any extra headers the caller supplies.
pub fn build_response(cseq: u32, status_code: u16, reason: &str, extra_headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = format!("RTSP/1.0 {status_code} {reason}\r\nCSeq: {cseq}\r\n");
    for (k, v) in extra_headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_request() {
        let raw = b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let end = headers_end(raw).unwrap();
        let req = parse_headers(&raw[..end]).unwrap();
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.cseq, 1);
        assert_eq!(req.uri, "rtsp://host/live/foo");
    }

    #[test]
    fn parses_setup_with_transport_header() {
        let raw = b"SETUP rtsp://host/live/foo/trackID=0 RTSP/1.0\r\nCSeq: 3\r\nTransport: RTP/AVP/TCP;unicast;interleaved=0-1\r\n\r\n";
        let end = headers_end(raw).unwrap();
        let req = parse_headers(&raw[..end]).unwrap();
        assert_eq!(req.method, Method::Setup);
        assert_eq!(req.header("transport"), Some("RTP/AVP/TCP;unicast;interleaved=0-1"));
    }

    #[test]
    fn headers_end_returns_none_for_partial_buffer() {
        let raw = b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\nCSeq: 1\r\n";
        assert!(headers_end(raw).is_none());
    }

    #[test]
    fn rejects_missing_cseq() {
        let raw = b"OPTIONS rtsp://host/live/foo RTSP/1.0\r\n\r\n";
        let end = headers_end(raw).unwrap();
        assert!(parse_headers(&raw[..end]).is_err());
    }

    #[test]
    fn builds_ok_response_with_headers() {
        let response = build_response(2, 200, "OK", &[("Public", "OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN")]);
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(text.contains("CSeq: 2\r\n"));
    }
}
