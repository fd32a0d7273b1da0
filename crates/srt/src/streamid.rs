//! SRT `streamid` parsing: `#!::r=app/stream,m=request|publish[,k=v]*`.
//!
//! Grounded on `srs_app_srt_conn.cpp`'s handling of a missing or
//! malformed streamid: rather than rejecting the connection, it falls
//! back to a configured default streamid and logs a warning. That
//! behavior (not named in the distilled spec) is carried here since it's
//! what keeps legacy SRT callers — ones that never learned to set a
//! streamid — working against this server.

use std::collections::BTreeMap;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Request,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamId {
    pub app: String,
    pub stream: String,
    pub mode: Mode,
    pub params: BTreeMap<String, String>,
}

const PREFIX: &str = "#!::";

/// Parse a raw SRT streamid. Falls back to `default_streamid` (itself
/// parsed the same way) when `raw` is empty or doesn't carry the `r=`/`m=`
/// keys this server requires, logging a warning either way.
pub fn parse(raw: &str, default_streamid: &str) -> Option<StreamId> {
    if let Some(id) = parse_strict(raw) {
        return Some(id);
    }
    if !raw.is_empty() {
        warn!(streamid = raw, "srt streamid malformed, falling back to default");
    }
    let id = parse_strict(default_streamid);
    if id.is_none() {
        warn!(default_streamid, "configured default srt streamid is also malformed");
    }
    id
}

fn parse_strict(raw: &str) -> Option<StreamId> {
    let body = raw.strip_prefix(PREFIX)?;
    let mut params = BTreeMap::new();
    for pair in body.split(',') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next().unwrap_or("").to_string();
        params.insert(key.to_string(), value);
    }

    let route = params.remove("r")?;
    let (app, stream) = route.rsplit_once('/')?;
    let mode = match params.remove("m").as_deref() {
        Some("request") => Mode::Request,
        Some("publish") => Mode::Publish,
        _ => return None,
    };

    Some(StreamId {
        app: app.to_string(),
        stream: stream.to_string(),
        mode,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_publish_streamid_with_extra_params() {
        let id = parse("#!::r=live/foo,m=publish,token=abc", "").unwrap();
        assert_eq!(id.app, "live");
        assert_eq!(id.stream, "foo");
        assert_eq!(id.mode, Mode::Publish);
        assert_eq!(id.params.get("token").map(String::as_str), Some("abc"));
    }

    #[test]
    fn parses_request_streamid() {
        let id = parse("#!::r=live/foo,m=request", "").unwrap();
        assert_eq!(id.mode, Mode::Request);
    }

    #[test]
    fn falls_back_to_default_when_raw_is_empty() {
        let id = parse("", "#!::r=live/fallback,m=request").unwrap();
        assert_eq!(id.stream, "fallback");
    }

    #[test]
    fn falls_back_to_default_when_raw_is_malformed() {
        let id = parse("not-a-streamid", "#!::r=live/fallback,m=publish").unwrap();
        assert_eq!(id.stream, "fallback");
        assert_eq!(id.mode, Mode::Publish);
    }

    #[test]
    fn rejects_when_both_raw_and_default_are_malformed() {
        assert!(parse("garbage", "also garbage").is_none());
    }
}
