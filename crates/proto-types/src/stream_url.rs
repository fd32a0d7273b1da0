//! Canonical stream URL: `vhost/app/stream`.
//!
//! This is the mutex key for publish admission and the hash key for
//! source lookup across every protocol. Extensions (`.flv`, `.m3u8`, ...)
//! are stripped before keying.

use std::fmt;

const DEFAULT_VHOST: &str = "__defaultVhost__";

/// A canonical stream identity, independent of the wire protocol that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamUrl {
    pub vhost: String,
    pub app: String,
    pub stream: String,
}

impl StreamUrl {
    pub fn new(vhost: impl Into<String>, app: impl Into<String>, stream: impl Into<String>) -> Self {
        StreamUrl {
            vhost: vhost.into(),
            app: app.into(),
            stream: strip_extension(&stream.into()),
        }
    }

    /// Parse a request path plus optional `vhost=`/`domain=` query params
    /// into a canonical `StreamUrl`, applying the legacy rewrite rules in
    /// the order documented in SPEC_FULL.md (textual substitution first,
    /// then structural rearrangement).
    pub fn parse(path: &str, query: &str) -> Option<StreamUrl> {
        let rewritten_path = apply_legacy_rewrite(path);
        let (path_part, inline_query) = match rewritten_path.split_once('?') {
            Some((p, q)) => (p, q.to_string()),
            None => (rewritten_path.as_str(), String::new()),
        };

        let combined_query = if inline_query.is_empty() {
            query.to_string()
        } else if query.is_empty() {
            inline_query
        } else {
            format!("{}&{}", inline_query, query)
        };

        let segments: Vec<&str> = path_part.trim_matches('/').split('/').collect();
        if segments.len() < 2 {
            return None;
        }
        let app = segments[..segments.len() - 1].join("/");
        let stream = strip_extension(segments[segments.len() - 1]);

        let vhost = query_value(&combined_query, "vhost")
            .or_else(|| query_value(&combined_query, "domain"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VHOST.to_string());

        Some(StreamUrl { vhost, app, stream })
    }

    /// The string used as the hash/mutex key: `vhost/app/stream`.
    pub fn canonical_key(&self) -> String {
        format!("{}/{}/{}", self.vhost, self.app, self.stream)
    }

    pub fn is_default_vhost(&self) -> bool {
        self.vhost == DEFAULT_VHOST
    }
}

impl fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key())
    }
}

fn strip_extension(stream: &str) -> String {
    match stream.rfind('.') {
        Some(idx) if idx > 0 => stream[..idx].to_string(),
        _ => stream.to_string(),
    }
}

/// Pass 1: replace the literal `...vhost...` marker with `?vhost=`.
/// Pass 2: if the result still encodes the vhost as a query fragment that
/// sits before the trailing stream segment (`app?vhost=X/stream`),
/// rearrange it to the standard form `app/stream?vhost=X`.
///
/// The order matters: pass 2 only recognises `?vhost=` fragments, so it
/// must run after pass 1 turns the marker form into that shape.
fn apply_legacy_rewrite(path: &str) -> String {
    let substituted = path.replace("...vhost...", "?vhost=");

    let Some(query_pos) = substituted.find("?vhost=") else {
        return substituted;
    };
    // Only a legacy rearrangement if there's a path segment after the
    // query fragment (i.e. the query isn't already trailing).
    let after_query = &substituted[query_pos..];
    let Some(slash_in_query) = after_query[1..].find('/') else {
        return substituted;
    };
    let slash_pos = query_pos + 1 + slash_in_query;

    let prefix = &substituted[..query_pos];
    let query_fragment = &substituted[query_pos..slash_pos];
    let suffix = &substituted[slash_pos..];
    format!("{}{}{}", prefix, suffix, query_fragment)
}

fn query_value(query: &str, key: &str) -> Option<String> {
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        if k == key {
            return Some(parts.next().unwrap_or("").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_form() {
        let url = StreamUrl::parse("live/foo", "vhost=example.com").unwrap();
        assert_eq!(url.vhost, "example.com");
        assert_eq!(url.app, "live");
        assert_eq!(url.stream, "foo");
    }

    #[test]
    fn strips_extension() {
        let url = StreamUrl::parse("live/foo.flv", "").unwrap();
        assert_eq!(url.stream, "foo");
        let url = StreamUrl::parse("live/foo.m3u8", "").unwrap();
        assert_eq!(url.stream, "foo");
    }

    #[test]
    fn defaults_vhost_when_absent() {
        let url = StreamUrl::parse("live/foo", "").unwrap();
        assert!(url.is_default_vhost());
    }

    #[test]
    fn rewrites_marker_form() {
        // rtmp://ip/app...vhost...VHOST/stream
        let url = StreamUrl::parse("live...vhost...example.com/foo", "").unwrap();
        assert_eq!(url.vhost, "example.com");
        assert_eq!(url.app, "live");
        assert_eq!(url.stream, "foo");
    }

    #[test]
    fn rewrites_legacy_query_before_stream() {
        // legacy: app?vhost=xxx/stream -> standard: app/stream?vhost=xxx
        let rewritten = apply_legacy_rewrite("live?vhost=example.com/foo");
        assert_eq!(rewritten, "live/foo?vhost=example.com");
    }

    #[test]
    fn canonical_key_matches_hash_form() {
        let url = StreamUrl::new("example.com", "live", "foo");
        assert_eq!(url.canonical_key(), "example.com/live/foo");
    }
}
