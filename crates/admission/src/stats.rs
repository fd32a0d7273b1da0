//! Statistics registry, grounded on the discrete windowed rate sampler
//! in `srs_kernel_kbps.cpp` (`srs_pps_update`): each window keeps only
//! the byte count and timestamp of its last rollover, not a running
//! exponential average, so a kbps reading is always an exact delta over
//! the elapsed window rather than a smoothed approximation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use proto_types::StreamUrl;
use serde::Serialize;

const WINDOWS: [(&str, Duration); 5] = [
    ("10s", Duration::from_secs(10)),
    ("30s", Duration::from_secs(30)),
    ("1m", Duration::from_secs(60)),
    ("5m", Duration::from_secs(300)),
    ("60m", Duration::from_secs(3600)),
];

struct WindowSample {
    window: Duration,
    anchored_at: Instant,
    anchored_bytes: u64,
    kbps: f64,
}

impl WindowSample {
    fn new(window: Duration, now: Instant) -> Self {
        WindowSample {
            window,
            anchored_at: now,
            anchored_bytes: 0,
            kbps: 0.0,
        }
    }

    fn observe(&mut self, now: Instant, total_bytes: u64) {
        let elapsed = now.duration_since(self.anchored_at);
        if elapsed < self.window {
            return;
        }
        let delta_bytes = total_bytes.saturating_sub(self.anchored_bytes);
        self.kbps = (delta_bytes as f64 * 8.0 / 1000.0) / elapsed.as_secs_f64();
        self.anchored_at = now;
        self.anchored_bytes = total_bytes;
    }
}

struct RateCounter {
    total_bytes: u64,
    windows: Vec<WindowSample>,
}

impl RateCounter {
    fn new(now: Instant) -> Self {
        RateCounter {
            total_bytes: 0,
            windows: WINDOWS.iter().map(|(_, w)| WindowSample::new(*w, now)).collect(),
        }
    }

    fn add_bytes(&mut self, n: u64, now: Instant) {
        self.total_bytes += n;
        for w in &mut self.windows {
            w.observe(now, self.total_bytes);
        }
    }

    fn kbps(&self, label: &str) -> Option<f64> {
        WINDOWS
            .iter()
            .position(|(l, _)| *l == label)
            .map(|idx| self.windows[idx].kbps)
    }
}

#[derive(Default, Clone, Serialize)]
pub struct CodecInfo {
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

struct StreamEntry {
    in_bytes: RateCounter,
    out_bytes: RateCounter,
    errors: u64,
    codec: CodecInfo,
    clients: u32,
}

pub struct StatsRegistry {
    streams: Mutex<HashMap<String, StreamEntry>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        StatsRegistry {
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn entry<'a>(streams: &'a mut HashMap<String, StreamEntry>, url: &StreamUrl, now: Instant) -> &'a mut StreamEntry {
        streams.entry(url.canonical_key()).or_insert_with(|| StreamEntry {
            in_bytes: RateCounter::new(now),
            out_bytes: RateCounter::new(now),
            errors: 0,
            codec: CodecInfo::default(),
            clients: 0,
        })
    }

    pub fn on_publish_bytes(&self, url: &StreamUrl, n: u64) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        Self::entry(&mut streams, url, now).in_bytes.add_bytes(n, now);
    }

    pub fn on_deliver_bytes(&self, url: &StreamUrl, n: u64) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        Self::entry(&mut streams, url, now).out_bytes.add_bytes(n, now);
    }

    pub fn on_error(&self, url: &StreamUrl) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        Self::entry(&mut streams, url, now).errors += 1;
    }

    pub fn on_video_info(&self, url: &StreamUrl, codec: &str, width: u32, height: u32) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        let entry = Self::entry(&mut streams, url, now);
        entry.codec.video_codec = Some(codec.to_string());
        entry.codec.width = Some(width);
        entry.codec.height = Some(height);
    }

    pub fn on_audio_info(&self, url: &StreamUrl, codec: &str) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        Self::entry(&mut streams, url, now).codec.audio_codec = Some(codec.to_string());
    }

    pub fn on_client_connect(&self, url: &StreamUrl) {
        let now = Instant::now();
        let mut streams = self.streams.lock().unwrap();
        Self::entry(&mut streams, url, now).clients += 1;
    }

    pub fn on_client_disconnect(&self, url: &StreamUrl) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(entry) = streams.get_mut(&url.canonical_key()) {
            entry.clients = entry.clients.saturating_sub(1);
        }
    }

    /// JSON dump for the HTTP admin API: one row per stream, rows where
    /// every counter is zero are suppressed (resolved SPEC ambiguity:
    /// the "all named counters non-zero" predicate, not "any").
    pub fn dump(&self) -> serde_json::Value {
        let streams = self.streams.lock().unwrap();
        let rows: Vec<serde_json::Value> = streams
            .iter()
            .filter_map(|(key, entry)| {
                let kbps_in = entry.in_bytes.kbps("30s").unwrap_or(0.0);
                let kbps_out = entry.out_bytes.kbps("30s").unwrap_or(0.0);
                let all_zero = kbps_in == 0.0 && kbps_out == 0.0 && entry.clients == 0 && entry.errors == 0;
                if all_zero {
                    return None;
                }
                Some(serde_json::json!({
                    "stream": key,
                    "kbps_in_30s": kbps_in,
                    "kbps_out_30s": kbps_out,
                    "clients": entry.clients,
                    "errors": entry.errors,
                    "video_codec": entry.codec.video_codec,
                    "audio_codec": entry.codec.audio_codec,
                }))
            })
            .collect();
        serde_json::json!({ "streams": rows })
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> StreamUrl {
        StreamUrl::new("v", "live", "stats")
    }

    #[test]
    fn zero_activity_stream_is_suppressed_from_dump() {
        let registry = StatsRegistry::new();
        registry.on_video_info(&url(), "h264", 1280, 720);
        let dump = registry.dump();
        assert_eq!(dump["streams"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn active_client_keeps_stream_in_dump() {
        let registry = StatsRegistry::new();
        registry.on_client_connect(&url());
        let dump = registry.dump();
        assert_eq!(dump["streams"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn window_reports_zero_before_first_rollover() {
        let mut counter = RateCounter::new(Instant::now());
        counter.add_bytes(1000, Instant::now());
        assert_eq!(counter.kbps("30s"), Some(0.0));
    }
}
