//! m3u8 playlist generation and atomic rewrite, grounded on
//! `SrsHlsMuxer::refresh_m3u8`/`do_refresh_m3u8`: the playlist is
//! rebuilt from the in-memory segment window on every reap and written
//! to a temp file in the same directory, then renamed over the final
//! path so readers never observe a half-written playlist.

use std::io;
use std::path::Path;

use crate::crypto::SegmentKey;

#[derive(Debug, Clone)]
pub struct PlaylistSegment {
    pub uri: String,
    pub duration: f64,
    pub discontinuity: bool,
    /// Present when this segment is encrypted and uses a different key
    /// (new key) or IV (same key, new segment) than the previous one.
    pub key: Option<SegmentKey>,
    pub key_uri: Option<String>,
}

/// A sliding window of segments, grounded on `SrsFragmentWindow`: holds
/// at most enough segments to cover `window`, dropping the oldest once
/// the cumulative duration exceeds it.
pub struct SegmentWindow {
    window_duration: f64,
    segments: Vec<PlaylistSegment>,
    sequence_no: u64,
}

impl SegmentWindow {
    pub fn new(window_seconds: f64) -> Self {
        SegmentWindow {
            window_duration: window_seconds,
            segments: Vec::new(),
            sequence_no: 0,
        }
    }

    pub fn push(&mut self, segment: PlaylistSegment) {
        self.segments.push(segment);
        let mut total: f64 = self.segments.iter().map(|s| s.duration).sum();
        while total > self.window_duration && self.segments.len() > 1 {
            let removed = self.segments.remove(0);
            total -= removed.duration;
            self.sequence_no += 1;
        }
    }

    pub fn media_sequence(&self) -> u64 {
        self.sequence_no
    }

    pub fn segments(&self) -> &[PlaylistSegment] {
        &self.segments
    }

    pub fn target_duration(&self) -> u64 {
        self.segments.iter().map(|s| s.duration.ceil() as u64).max().unwrap_or(1)
    }
}

/// Render the playlist text for the current window.
pub fn render(window: &SegmentWindow) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", window.target_duration()));
    out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", window.media_sequence()));

    let mut last_key: Option<(String, String)> = None;
    for segment in window.segments() {
        if segment.discontinuity {
            out.push_str("#EXT-X-DISCONTINUITY\n");
        }
        if let (Some(key), Some(key_uri)) = (&segment.key, &segment.key_uri) {
            let identity = (key_uri.clone(), key.iv_hex());
            if last_key.as_ref() != Some(&identity) {
                out.push_str(&format!("#EXT-X-KEY:METHOD=AES-128,URI=\"{}\",IV={}\n", key_uri, key.iv_hex()));
                last_key = Some(identity);
            }
        }
        out.push_str(&format!("#EXTINF:{:.3},\n{}\n", segment.duration, segment.uri));
    }
    out
}

/// Write `contents` to `final_path` atomically: write to a sibling temp
/// file, then rename it into place.
pub async fn write_atomic(final_path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = final_path.with_extension(format!(
        "{}.tmp",
        final_path.extension().and_then(|e| e.to_str()).unwrap_or("m3u8")
    ));
    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, final_path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_drops_oldest_segment_past_window_duration() {
        let mut window = SegmentWindow::new(10.0);
        window.push(seg("0.ts", 5.0));
        window.push(seg("1.ts", 5.0));
        window.push(seg("2.ts", 5.0));
        assert_eq!(window.segments().len(), 2);
        assert_eq!(window.segments()[0].uri, "1.ts");
        assert_eq!(window.media_sequence(), 1);
    }

    #[test]
    fn render_includes_targetduration_and_sequence() {
        let mut window = SegmentWindow::new(30.0);
        window.push(seg("0.ts", 4.5));
        let text = render(&window);
        assert!(text.contains("#EXT-X-TARGETDURATION:5"));
        assert!(text.contains("#EXT-X-MEDIA-SEQUENCE:0"));
        assert!(text.contains("#EXTINF:4.500,\n0.ts"));
    }

    #[test]
    fn render_emits_key_tag_once_per_key_change() {
        let mut window = SegmentWindow::new(30.0);
        let key = SegmentKey::generate();
        let mut s0 = seg("0.ts", 5.0);
        s0.key = Some(key);
        s0.key_uri = Some("0.key".into());
        let mut s1 = seg("1.ts", 5.0);
        s1.key = Some(key.with_new_iv());
        s1.key_uri = Some("0.key".into());
        window.push(s0);
        window.push(s1);
        let text = render(&window);
        assert_eq!(text.matches("#EXT-X-KEY").count(), 2, "iv changes every segment so the tag must repeat even with the same key uri");
    }

    #[tokio::test]
    async fn write_atomic_leaves_final_path_with_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.m3u8");
        write_atomic(&path, b"#EXTM3U\n").await.unwrap();
        let read_back = tokio::fs::read(&path).await.unwrap();
        assert_eq!(read_back, b"#EXTM3U\n");
    }

    fn seg(uri: &str, duration: f64) -> PlaylistSegment {
        PlaylistSegment {
            uri: uri.to_string(),
            duration,
            discontinuity: false,
            key: None,
            key_uri: None,
        }
    }
}
